//! Locality-aware dispatch.
//!
//! The [`Applier`] decides where a unit of work runs. Work without a target,
//! or whose target lives on this locality, goes to the [`ThreadManager`];
//! anything else is encoded into a [`Parcel`] and handed to the
//! [`ParcelTransport`]. The applier owns only that first hop: once a
//! collaborator has accepted the work, running or delivering it is theirs.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tandem_closure::ClosureError;
use tracing::{debug, warn};

use crate::action::ActionRegistry;
use crate::error::ApplierError;
use crate::naming::{ComponentType, GlobalAddress, LocalAddress, LocalityId};
use crate::parcel::Parcel;
use crate::threads::{ThreadHints, ThreadId, ThreadInitData, ThreadState};
use crate::traits::{LocalityResolver, ParcelTransport, ThreadManager};
use crate::work::{lock_checked, DeliveryTicket, Work, WorkDescriptor, WorkHandle};

enum Route {
    Local(LocalAddress),
    Remote(LocalityId, GlobalAddress),
}

pub struct Applier {
    thread_manager: Arc<dyn ThreadManager>,
    resolver: Arc<dyn LocalityResolver>,
    transport: Arc<dyn ParcelTransport>,
    actions: Arc<ActionRegistry>,
    locality: LocalityId,
    verify_locks: bool,
    runtime_support: OnceLock<GlobalAddress>,
    memory: OnceLock<GlobalAddress>,
}

// ── ApplierBuilder ──────────────────────────────────────────────────

/// Fluent builder for an [`Applier`].
///
/// # Example
/// ```ignore
/// let applier = ApplierBuilder::new(pool, resolver, transport)
///     .actions(registry)
///     .verify_locks(true)
///     .build();
/// ```
pub struct ApplierBuilder {
    thread_manager: Arc<dyn ThreadManager>,
    resolver: Arc<dyn LocalityResolver>,
    transport: Arc<dyn ParcelTransport>,
    actions: Arc<ActionRegistry>,
    verify_locks: bool,
}

impl ApplierBuilder {
    pub fn new(
        thread_manager: Arc<dyn ThreadManager>,
        resolver: Arc<dyn LocalityResolver>,
        transport: Arc<dyn ParcelTransport>,
    ) -> Self {
        Self {
            thread_manager,
            resolver,
            transport,
            actions: Arc::new(ActionRegistry::new()),
            verify_locks: true,
        }
    }

    /// Actions this locality can receive (default: none).
    pub fn actions(mut self, actions: Arc<ActionRegistry>) -> Self {
        self.actions = actions;
        self
    }

    /// Check for leaked locks after each unit of work (default: on).
    pub fn verify_locks(mut self, verify: bool) -> Self {
        self.verify_locks = verify;
        self
    }

    /// Build the applier. The local locality id is read from the resolver once.
    pub fn build(self) -> Arc<Applier> {
        let locality = self.resolver.local_locality();
        debug!(locality = %locality, verify_locks = self.verify_locks, "applier built");
        Arc::new(Applier {
            thread_manager: self.thread_manager,
            resolver: self.resolver,
            transport: self.transport,
            actions: self.actions,
            locality,
            verify_locks: self.verify_locks,
            runtime_support: OnceLock::new(),
            memory: OnceLock::new(),
        })
    }
}

impl Applier {
    /// Record the local runtime-support and memory components. Only the first
    /// call has an effect; later calls return `false`.
    pub fn initialize(&self, runtime_support: LocalAddress, memory: LocalAddress) -> bool {
        let msb = self.locality_address().msb;
        let first = self
            .runtime_support
            .set(GlobalAddress::new(msb, runtime_support.0))
            .is_ok();
        let _ = self.memory.set(GlobalAddress::new(msb, memory.0));
        if !first {
            warn!(locality = %self.locality, "applier initialized twice; keeping first components");
        }
        first
    }

    pub fn runtime_support_id(&self) -> Option<GlobalAddress> {
        self.runtime_support.get().copied()
    }

    pub fn memory_id(&self) -> Option<GlobalAddress> {
        self.memory.get().copied()
    }

    pub fn locality_id(&self) -> LocalityId {
        self.locality
    }

    /// The raw global address of this locality.
    pub fn locality_address(&self) -> GlobalAddress {
        GlobalAddress::for_locality(self.locality)
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn verifies_locks(&self) -> bool {
        self.verify_locks
    }

    pub fn thread_manager(&self) -> &Arc<dyn ThreadManager> {
        &self.thread_manager
    }

    pub fn resolver(&self) -> &Arc<dyn LocalityResolver> {
        &self.resolver
    }

    pub fn transport(&self) -> &Arc<dyn ParcelTransport> {
        &self.transport
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Route `descriptor` and return a handle to track it.
    ///
    /// This is the injected-context form of [`crate::submit`]: the caller
    /// already holds the applier, so no thread binding is needed. Code that
    /// reaches the runtime through the worker's binding must use the free
    /// function, which fails with [`ApplierError::RuntimeUnavailable`] when
    /// nothing is bound.
    pub fn submit(&self, descriptor: WorkDescriptor) -> Result<WorkHandle, ApplierError> {
        self.submit_via(descriptor, "submit")
    }

    pub(crate) fn submit_via(
        &self,
        descriptor: WorkDescriptor,
        via: &'static str,
    ) -> Result<WorkHandle, ApplierError> {
        let WorkDescriptor {
            work,
            hints,
            target,
        } = descriptor;
        if work.is_empty() {
            return Err(ClosureError::Empty.into());
        }

        match self.route(target.as_ref())? {
            Route::Local(lva) => {
                let (work, hints) = self.check_plain(work, hints, via);
                self.spawn_local(work, hints, lva, via).map(WorkHandle::Local)
            }
            Route::Remote(locality, destination) => {
                let parcel = self.encode(work, &hints, destination)?;
                let parcel_id = parcel.id;
                let delivery = self.transport.send(parcel, locality)?;
                debug!(locality = %locality, parcel = %parcel_id, "parcel handed to transport");
                Ok(WorkHandle::Remote(DeliveryTicket::new(
                    parcel_id, locality, delivery,
                )))
            }
        }
    }

    /// Route `descriptor` without tracking it. Like [`Applier::submit`],
    /// this needs no bound context; see [`crate::submit_fire_and_forget`].
    pub fn submit_fire_and_forget(&self, descriptor: WorkDescriptor) -> Result<(), ApplierError> {
        self.post_via(descriptor, "submit_fire_and_forget")
    }

    pub(crate) fn post_via(
        &self,
        descriptor: WorkDescriptor,
        via: &'static str,
    ) -> Result<(), ApplierError> {
        let WorkDescriptor {
            work,
            hints,
            target,
        } = descriptor;
        if work.is_empty() {
            return Err(ClosureError::Empty.into());
        }

        match self.route(target.as_ref())? {
            Route::Local(lva) => {
                let (work, hints) = self.check_plain(work, hints, via);
                self.post_local(work, hints, lva, via)
            }
            Route::Remote(locality, destination) => {
                let parcel = self.encode(work, &hints, destination)?;
                let parcel_id = parcel.id;
                // Delivery outcome is the transport's to report.
                drop(self.transport.send(parcel, locality)?);
                debug!(locality = %locality, parcel = %parcel_id, "parcel posted");
                Ok(())
            }
        }
    }

    /// Create a local thread for `work`.
    pub(crate) fn spawn_local(
        &self,
        work: Work,
        hints: ThreadHints,
        lva: LocalAddress,
        via: &'static str,
    ) -> Result<ThreadId, ApplierError> {
        let (initial_state, run_now) = (hints.initial_state, hints.run_now);
        let data = self.init_data(work, hints, lva, via);
        self.register_thread_data(data, initial_state, run_now)
    }

    /// Queue `work` locally without creating its thread up front.
    pub(crate) fn post_local(
        &self,
        work: Work,
        hints: ThreadHints,
        lva: LocalAddress,
        via: &'static str,
    ) -> Result<(), ApplierError> {
        let initial_state = hints.initial_state;
        let data = self.init_data(work, hints, lva, via);
        self.register_work_data(data, initial_state)
    }

    /// Forward ready-made init data to the thread manager as is.
    pub fn register_thread_data(
        &self,
        data: ThreadInitData,
        initial_state: ThreadState,
        run_now: bool,
    ) -> Result<ThreadId, ApplierError> {
        debug!(locality = %self.locality, tag = %data.description, "registering thread");
        self.thread_manager
            .register_thread(data, initial_state, run_now)
    }

    pub fn register_work_data(
        &self,
        data: ThreadInitData,
        initial_state: ThreadState,
    ) -> Result<(), ApplierError> {
        debug!(locality = %self.locality, tag = %data.description, "registering work");
        self.thread_manager.register_work(data, initial_state)
    }

    /// Run a parcel received from another locality.
    pub fn schedule_parcel(&self, parcel: Parcel) -> Result<ThreadId, ApplierError> {
        let lva = match self.route(Some(&parcel.destination))? {
            Route::Local(lva) => lva,
            Route::Remote(..) => return Err(ApplierError::InvalidTargetAddress(parcel.destination)),
        };
        let closure = self.actions.decode(&parcel)?;
        let hints = ThreadHints {
            description: if parcel.description.is_empty() {
                parcel.action.clone().into()
            } else {
                parcel.description.clone().into()
            },
            priority: parcel.priority,
            ..ThreadHints::default()
        };
        debug!(locality = %self.locality, source = %parcel.source, action = %parcel.action, "scheduling parcel");
        self.spawn_local(Work::Nullary(closure), hints, lva, "schedule_parcel")
    }

    // ── Addressing ──────────────────────────────────────────────────

    /// The locality `address` belongs to, from its bits alone.
    pub fn resolve_locality(&self, address: &GlobalAddress) -> Result<LocalityId, ApplierError> {
        address.locality()
    }

    pub fn enumerate_localities(
        &self,
        filter: ComponentType,
    ) -> Result<BTreeSet<LocalityId>, ApplierError> {
        self.resolver.enumerate(filter)
    }

    /// Localities other than this one, from the transport's view.
    pub fn enumerate_remote_localities(
        &self,
        filter: ComponentType,
    ) -> Result<BTreeSet<LocalityId>, ApplierError> {
        self.transport.remote_localities(filter)
    }

    fn route(&self, target: Option<&GlobalAddress>) -> Result<Route, ApplierError> {
        let Some(target) = target else {
            return Ok(Route::Local(LocalAddress::NULL));
        };
        let locality = target.locality()?;
        if locality == self.locality {
            let (_, lva) = self.resolver.resolve(target)?;
            Ok(Route::Local(lva))
        } else {
            Ok(Route::Remote(locality, *target))
        }
    }

    /// Wrap submitted plain functions with the lock check. The description
    /// is fixed first so it names the caller's function, not the wrapper.
    fn check_plain(&self, work: Work, hints: ThreadHints, via: &'static str) -> (Work, ThreadHints) {
        match work {
            Work::Plain(function) if self.verify_locks => {
                let description = hints.description.or_synthesize(function.held_type_name(), via);
                let function = lock_checked(function, description.to_string());
                (Work::Plain(function), ThreadHints { description, ..hints })
            }
            other => (other, hints),
        }
    }

    fn init_data(
        &self,
        work: Work,
        hints: ThreadHints,
        lva: LocalAddress,
        via: &'static str,
    ) -> ThreadInitData {
        let description = hints.description.or_synthesize(work.held_type_name(), via);
        let function = work.into_thread_function(&description, self.verify_locks);
        ThreadInitData {
            function,
            description,
            lva,
            priority: hints.priority,
            os_thread: hints.os_thread,
            stack_size: hints.stack_size,
        }
    }

    fn encode(
        &self,
        work: Work,
        hints: &ThreadHints,
        destination: GlobalAddress,
    ) -> Result<Parcel, ApplierError> {
        let action = match work {
            Work::Action(action) => action,
            other => {
                let name = hints
                    .description
                    .clone()
                    .or_synthesize(other.held_type_name(), "submit")
                    .to_string();
                return Err(ApplierError::NotSerializable(name));
            }
        };
        let mut parcel = Parcel::new(action.name(), destination, self.locality, action.encode()?)
            .with_priority(hints.priority);
        if !hints.description.is_unset() {
            parcel = parcel.with_description(hints.description.to_string());
        }
        Ok(parcel)
    }
}

impl fmt::Debug for Applier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Applier")
            .field("locality", &self.locality)
            .field("verify_locks", &self.verify_locks)
            .field("runtime_support", &self.runtime_support.get())
            .field("memory", &self.memory.get())
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}
