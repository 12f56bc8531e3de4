//! In-process parcel transport.
//!
//! A [`LoopbackFabric`] connects the localities of one process. Sending
//! encodes the parcel to bytes and queues it on an unbounded channel; a
//! router task decodes each parcel and hands it to the destination's
//! applier, then completes the sender's delivery future.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tandem_applier::{
    Applier, ApplierError, ComponentType, DeliveryFuture, LocalityId, Parcel, ParcelTransport,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::RuntimeError;

struct Route {
    applier: Weak<Applier>,
    components: Vec<ComponentType>,
}

struct Envelope {
    bytes: Vec<u8>,
    destination: LocalityId,
    done: oneshot::Sender<Result<(), ApplierError>>,
}

pub struct LoopbackFabric {
    routes: RwLock<HashMap<LocalityId, Route>>,
    outbox: mpsc::UnboundedSender<Envelope>,
    delivered: AtomicUsize,
}

impl LoopbackFabric {
    /// Create a fabric whose router runs on the current tokio runtime.
    pub fn start() -> Result<Arc<Self>, RuntimeError> {
        Ok(Self::start_on(&Handle::try_current()?))
    }

    pub fn start_on(handle: &Handle) -> Arc<Self> {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let fabric = Arc::new(Self {
            routes: RwLock::new(HashMap::new()),
            outbox,
            delivered: AtomicUsize::new(0),
        });
        handle.spawn(route_parcels(Arc::downgrade(&fabric), inbox));
        fabric
    }

    /// A transport endpoint that sends from `local`.
    pub fn endpoint(self: &Arc<Self>, local: LocalityId) -> LoopbackTransport {
        LoopbackTransport {
            local,
            fabric: Arc::clone(self),
        }
    }

    /// Make `applier`'s locality reachable. Replaces an earlier attachment.
    pub fn attach(&self, applier: &Arc<Applier>, components: Vec<ComponentType>) {
        let id = applier.locality_id();
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Route {
                    applier: Arc::downgrade(applier),
                    components,
                },
            );
        debug!(locality = %id, "locality attached to loopback fabric");
    }

    pub fn detach(&self, id: LocalityId) -> bool {
        let removed = self
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!(locality = %id, "locality detached from loopback fabric");
        }
        removed
    }

    pub fn is_attached(&self, id: LocalityId) -> bool {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Parcels handed to a destination applier so far.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    fn localities(&self, filter: ComponentType) -> BTreeSet<LocalityId> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, route)| {
                filter == ComponentType::ANY || route.components.iter().any(|c| filter.matches(*c))
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn deliver(&self, destination: LocalityId, bytes: &[u8]) -> Result<(), ApplierError> {
        let parcel = Parcel::from_bytes(bytes)?;
        let applier = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&destination)
            .and_then(|route| route.applier.upgrade())
            .ok_or_else(|| {
                ApplierError::TransportFailure(format!("{destination} left the fabric"))
            })?;
        trace!(parcel = %parcel.id, locality = %destination, "delivering parcel");
        applier.schedule_parcel(parcel)?;
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn route_parcels(fabric: Weak<LoopbackFabric>, mut inbox: mpsc::UnboundedReceiver<Envelope>) {
    while let Some(envelope) = inbox.recv().await {
        let outcome = match fabric.upgrade() {
            Some(fabric) => fabric.deliver(envelope.destination, &envelope.bytes),
            None => Err(ApplierError::TransportFailure("loopback fabric shut down".into())),
        };
        if let Err(e) = &outcome {
            warn!(locality = %envelope.destination, error = %e, "parcel not delivered");
        }
        // The sender may have dropped its ticket.
        let _ = envelope.done.send(outcome);
    }
    debug!("loopback router stopped");
}

/// One locality's view of a [`LoopbackFabric`].
pub struct LoopbackTransport {
    local: LocalityId,
    fabric: Arc<LoopbackFabric>,
}

impl LoopbackTransport {
    pub fn fabric(&self) -> &Arc<LoopbackFabric> {
        &self.fabric
    }
}

impl ParcelTransport for LoopbackTransport {
    fn send(&self, parcel: Parcel, destination: LocalityId) -> Result<DeliveryFuture, ApplierError> {
        if !self.fabric.is_attached(destination) {
            return Err(ApplierError::TransportFailure(format!(
                "{destination} is not attached to the loopback fabric"
            )));
        }
        let bytes = parcel.to_bytes()?;
        let (done, outcome) = oneshot::channel();
        trace!(parcel = %parcel.id, from = %self.local, to = %destination, bytes = bytes.len(), "parcel queued");

        self.fabric
            .outbox
            .send(Envelope {
                bytes,
                destination,
                done,
            })
            .map_err(|_| ApplierError::TransportFailure("loopback router stopped".into()))?;

        Ok(Box::pin(async move {
            outcome.await.unwrap_or_else(|_| {
                Err(ApplierError::TransportFailure("delivery outcome lost".into()))
            })
        }))
    }

    fn localities(&self, filter: ComponentType) -> Result<BTreeSet<LocalityId>, ApplierError> {
        Ok(self.fabric.localities(filter))
    }

    fn remote_localities(&self, filter: ComponentType) -> Result<BTreeSet<LocalityId>, ApplierError> {
        let mut all = self.fabric.localities(filter);
        all.remove(&self.local);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use tandem_applier::{ApplierBuilder, GlobalAddress};

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::pool::PoolThreadManager;
    use crate::resolver::StaticResolver;

    fn applier(fabric: &Arc<LoopbackFabric>, id: u32) -> Arc<Applier> {
        let config = RuntimeConfig::for_locality(id).with_worker_threads(1);
        let pool = Arc::new(PoolThreadManager::new(&config.threads).unwrap());
        let resolver = Arc::new(StaticResolver::from_config(&config));
        let transport = Arc::new(fabric.endpoint(config.locality_id()));
        ApplierBuilder::new(pool, resolver, transport).build()
    }

    fn parcel(to: u32) -> Parcel {
        Parcel::new(
            "loopback.test",
            GlobalAddress::for_locality(LocalityId::new(to)),
            LocalityId::new(0),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn attach_and_detach() {
        let fabric = LoopbackFabric::start().unwrap();
        let first = applier(&fabric, 1);
        fabric.attach(&first, vec![ComponentType(7)]);

        assert!(fabric.is_attached(LocalityId::new(1)));
        assert!(fabric.detach(LocalityId::new(1)));
        assert!(!fabric.detach(LocalityId::new(1)));
        assert!(!fabric.is_attached(LocalityId::new(1)));
    }

    #[tokio::test]
    async fn remote_localities_exclude_the_sender() {
        let fabric = LoopbackFabric::start().unwrap();
        let (one, two) = (applier(&fabric, 1), applier(&fabric, 2));
        fabric.attach(&one, vec![ComponentType(7)]);
        fabric.attach(&two, vec![ComponentType(8)]);

        let endpoint = fabric.endpoint(LocalityId::new(1));
        let all = endpoint.localities(ComponentType::ANY).unwrap();
        assert_eq!(all.len(), 2);
        let remote = endpoint.remote_localities(ComponentType::ANY).unwrap();
        assert_eq!(remote.into_iter().collect::<Vec<_>>(), vec![LocalityId::new(2)]);
        assert!(endpoint
            .remote_localities(ComponentType(7))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn send_to_unattached_locality_fails_synchronously() {
        let fabric = LoopbackFabric::start().unwrap();
        let endpoint = fabric.endpoint(LocalityId::new(1));
        let err = endpoint.send(parcel(5), LocalityId::new(5)).err().unwrap();
        assert!(matches!(err, ApplierError::TransportFailure(_)));
        assert_eq!(fabric.delivered(), 0);
    }

    #[tokio::test]
    async fn unknown_action_fails_the_delivery_future() {
        let fabric = LoopbackFabric::start().unwrap();
        let target = applier(&fabric, 3);
        fabric.attach(&target, Vec::new());

        let delivery = fabric
            .endpoint(LocalityId::new(1))
            .send(parcel(3), LocalityId::new(3))
            .unwrap();
        let err = delivery.await.unwrap_err();
        assert!(matches!(err, ApplierError::UnknownAction(_)));
        assert_eq!(fabric.delivered(), 0);
    }
}
