use std::sync::Arc;
use std::time::Duration;

use tandem_applier::{
    ActionRegistry, Applier, ApplierBuilder, ApplierError, LocalAddress, LocalityId,
    WorkDescriptor, WorkHandle,
};
use tracing::info;

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::loopback::LoopbackFabric;
use crate::pool::{PoolSnapshot, PoolThreadManager};
use crate::resolver::StaticResolver;

/// Local address of this locality's runtime-support component.
pub const RUNTIME_SUPPORT_LVA: LocalAddress = LocalAddress(1);
/// Local address of this locality's memory component.
pub const MEMORY_LVA: LocalAddress = LocalAddress(2);

/// One locality: worker pool, resolver, fabric endpoint, and the applier
/// tying them together. When dropped it leaves the fabric and unbinds its
/// workers, so the applier and the pool are released.
pub struct Locality {
    config: RuntimeConfig,
    pool: Arc<PoolThreadManager>,
    resolver: Arc<StaticResolver>,
    fabric: Arc<LoopbackFabric>,
    applier: Arc<Applier>,
}

impl Locality {
    pub fn start(
        config: RuntimeConfig,
        fabric: &Arc<LoopbackFabric>,
        actions: Arc<ActionRegistry>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let pool = Arc::new(PoolThreadManager::new(&config.threads)?);
        let resolver = Arc::new(StaticResolver::from_config(&config));
        let transport = Arc::new(fabric.endpoint(config.locality_id()));
        let applier = ApplierBuilder::new(pool.clone(), resolver.clone(), transport)
            .actions(actions)
            .verify_locks(config.applier.verify_locks)
            .build();
        applier.initialize(RUNTIME_SUPPORT_LVA, MEMORY_LVA);

        pool.attach(&applier);
        fabric.attach(&applier, config.local_components());

        info!(
            locality = %applier.locality_id(),
            workers = pool.workers(),
            peers = config.peers.len(),
            verify_locks = config.applier.verify_locks,
            "locality started"
        );

        Ok(Self {
            config,
            pool,
            resolver,
            fabric: Arc::clone(fabric),
            applier,
        })
    }

    pub fn id(&self) -> LocalityId {
        self.applier.locality_id()
    }

    pub fn applier(&self) -> &Arc<Applier> {
        &self.applier
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn resolver(&self) -> &StaticResolver {
        &self.resolver
    }

    /// Submit through this locality's applier; no thread binding is needed.
    /// See [`Applier::submit`].
    pub fn submit(&self, descriptor: WorkDescriptor) -> Result<WorkHandle, ApplierError> {
        self.applier.submit(descriptor)
    }

    pub fn submit_fire_and_forget(&self, descriptor: WorkDescriptor) -> Result<(), ApplierError> {
        self.applier.submit_fire_and_forget(descriptor)
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    /// Block until this locality's pool has no work in flight.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.pool.wait_idle(timeout)
    }
}

impl Drop for Locality {
    fn drop(&mut self) {
        let id = self.id();
        self.fabric.detach(id);
        let unbound = self.pool.shutdown();
        info!(
            locality = %id,
            completed = self.pool.snapshot().completed,
            unbound,
            "locality stopped"
        );
    }
}
