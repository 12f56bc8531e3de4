//! Locality-aware dispatch of work items.
//!
//! An [`Applier`] sits between code that produces work and the two places
//! work can go: the local [`ThreadManager`] or, for targets on another
//! locality, the [`ParcelTransport`]. Workers bind their locality's applier
//! to the thread and reach it through the free functions re-exported here.

pub mod action;
pub mod applier;
pub mod context;
pub mod error;
pub mod locks;
pub mod naming;
pub mod parcel;
pub mod register;
pub mod threads;
pub mod traits;
pub mod work;

pub use action::{Action, ActionRegistry, ErasedAction};
pub use applier::{Applier, ApplierBuilder};
pub use context::{current_applier, current_applier_or_none, current_locality_id, ContextGuard};
pub use error::ApplierError;
pub use locks::{
    held_locks, register_lock, unregister_lock, verify_no_locks, IgnoreLocks, LockRegistration,
    TrackedGuard, TrackedMutex,
};
pub use naming::{ComponentType, GlobalAddress, LocalAddress, LocalityId};
pub use parcel::Parcel;
pub use register::{
    register_thread, register_thread_data, register_thread_nullary, register_thread_plain,
    register_work, register_work_data, register_work_nullary, register_work_plain, submit,
    submit_fire_and_forget,
};
pub use threads::{
    StackSize, ThreadDescription, ThreadFunction, ThreadHints, ThreadId, ThreadInitData,
    ThreadPriority, ThreadResult, ThreadState, ThreadStateEx,
};
pub use traits::{DeliveryFuture, LocalityResolver, ParcelTransport, ThreadManager};
pub use work::{DeliveryTicket, Work, WorkDescriptor, WorkHandle};
