//! Move-only, type-erased callables for scheduling units of work.
//!
//! A [`TaskClosure`] stores any [`Callable`] of a given signature behind a
//! shared, immutable [`OperationTable`]. Callables no larger than a pointer
//! live inline in the closure; larger ones are boxed. Tables are materialized
//! once per concrete callable type by the process-wide [`registry`] and are
//! compared by identity, never by contents.

pub mod callable;
pub mod closure;
pub mod error;
pub mod registry;
pub mod storage;
pub mod table;

pub use callable::Callable;
pub use closure::TaskClosure;
pub use error::ClosureError;
pub use storage::{Slot, INLINE_CAPACITY};
pub use table::OperationTable;
