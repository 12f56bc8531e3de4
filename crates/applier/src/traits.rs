use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ApplierError;
use crate::naming::{ComponentType, GlobalAddress, LocalAddress, LocalityId};
use crate::parcel::Parcel;
use crate::threads::{ThreadId, ThreadInitData, ThreadState};

/// Resolves once the transport knows whether a parcel arrived.
pub type DeliveryFuture = Pin<Box<dyn Future<Output = Result<(), ApplierError>> + Send>>;

/// The local scheduler.
///
/// Both entry points may block briefly while enqueueing, but never wait for
/// the registered work to run.
pub trait ThreadManager: Send + Sync {
    /// Create a thread and return its id.
    fn register_thread(
        &self,
        data: ThreadInitData,
        initial_state: ThreadState,
        run_now: bool,
    ) -> Result<ThreadId, ApplierError>;

    /// Queue work that is turned into a thread whenever the scheduler sees fit.
    fn register_work(
        &self,
        data: ThreadInitData,
        initial_state: ThreadState,
    ) -> Result<(), ApplierError>;
}

/// Maps global addresses to localities.
pub trait LocalityResolver: Send + Sync {
    fn local_locality(&self) -> LocalityId;

    fn resolve(&self, address: &GlobalAddress) -> Result<(LocalityId, LocalAddress), ApplierError>;

    /// All localities hosting components of type `filter`, local one included.
    fn enumerate(&self, filter: ComponentType) -> Result<BTreeSet<LocalityId>, ApplierError>;
}

/// Ships parcels to other localities.
pub trait ParcelTransport: Send + Sync {
    /// Hand `parcel` off for delivery. Errors here mean the parcel was not
    /// accepted at all; the returned future reports what happened after.
    fn send(&self, parcel: Parcel, destination: LocalityId) -> Result<DeliveryFuture, ApplierError>;

    fn localities(&self, filter: ComponentType) -> Result<BTreeSet<LocalityId>, ApplierError>;

    /// Like [`ParcelTransport::localities`], without the sending locality.
    fn remote_localities(&self, filter: ComponentType) -> Result<BTreeSet<LocalityId>, ApplierError>;
}

/// Blanket implementation so `Arc<dyn ThreadManager>` can be used directly.
impl<T: ThreadManager + ?Sized> ThreadManager for Arc<T> {
    fn register_thread(
        &self,
        data: ThreadInitData,
        initial_state: ThreadState,
        run_now: bool,
    ) -> Result<ThreadId, ApplierError> {
        (**self).register_thread(data, initial_state, run_now)
    }

    fn register_work(
        &self,
        data: ThreadInitData,
        initial_state: ThreadState,
    ) -> Result<(), ApplierError> {
        (**self).register_work(data, initial_state)
    }
}
