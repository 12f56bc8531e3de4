use tandem_closure::ClosureError;
use thiserror::Error;

use crate::naming::GlobalAddress;

/// Errors raised while dispatching work.
///
/// Collaborators (thread manager, resolver, parcel transport) report through
/// the same type so the applier can hand their errors back unchanged.
#[derive(Debug, Error)]
pub enum ApplierError {
    /// No applier is bound to the calling thread. Carries the entry point.
    #[error("runtime unavailable: no applier is bound to this thread (in `{0}`)")]
    RuntimeUnavailable(&'static str),

    #[error("addressing unreachable: {0}")]
    AddressingUnreachable(String),

    #[error("invalid target address: {0}")]
    InvalidTargetAddress(GlobalAddress),

    /// A unit of work returned while still holding registered locks.
    /// Raised as a panic by the thread wrappers, never returned to callers.
    #[error("lock leak detected: {count} lock(s) still held after `{task}` returned")]
    LockLeakDetected { task: String, count: usize },

    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Remote target, but the work has no serialized form.
    #[error("work item `{0}` has no serialized form and cannot leave this locality")]
    NotSerializable(String),

    #[error("thread manager rejected work: {0}")]
    Scheduler(String),

    #[error("unknown action `{0}`")]
    UnknownAction(String),

    #[error(transparent)]
    Closure(#[from] ClosureError),

    #[error("parcel serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("parcel deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
}
