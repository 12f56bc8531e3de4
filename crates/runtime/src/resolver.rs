use std::collections::{BTreeMap, BTreeSet};

use tandem_applier::{
    ApplierError, ComponentType, GlobalAddress, LocalAddress, LocalityId, LocalityResolver,
};

use crate::config::RuntimeConfig;

/// Resolver backed by the peer table from configuration.
///
/// Addresses resolve to `(locality, lsb)`; only this locality and the
/// configured peers are known.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    local: LocalityId,
    localities: BTreeMap<LocalityId, Vec<ComponentType>>,
}

impl StaticResolver {
    pub fn new(local: LocalityId, components: Vec<ComponentType>) -> Self {
        Self {
            local,
            localities: BTreeMap::from([(local, components)]),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        let mut resolver = Self::new(config.locality_id(), config.local_components());
        for peer in &config.peers {
            resolver.add_peer(
                LocalityId::new(peer.id),
                peer.components.iter().copied().map(ComponentType).collect(),
            );
        }
        resolver
    }

    pub fn add_peer(&mut self, id: LocalityId, components: Vec<ComponentType>) {
        self.localities.insert(id, components);
    }

    pub fn knows(&self, id: LocalityId) -> bool {
        self.localities.contains_key(&id)
    }
}

impl LocalityResolver for StaticResolver {
    fn local_locality(&self) -> LocalityId {
        self.local
    }

    fn resolve(&self, address: &GlobalAddress) -> Result<(LocalityId, LocalAddress), ApplierError> {
        let locality = address.locality()?;
        if !self.knows(locality) {
            return Err(ApplierError::AddressingUnreachable(format!(
                "no route to {locality} for {address}"
            )));
        }
        Ok((locality, LocalAddress(address.lsb)))
    }

    fn enumerate(&self, filter: ComponentType) -> Result<BTreeSet<LocalityId>, ApplierError> {
        Ok(self
            .localities
            .iter()
            .filter(|(_, hosted)| {
                filter == ComponentType::ANY || hosted.iter().any(|c| filter.matches(*c))
            })
            .map(|(id, _)| *id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StaticResolver {
        let config = RuntimeConfig::for_locality(1)
            .with_peer(2, &[10])
            .with_peer(3, &[10, 20]);
        StaticResolver::from_config(&config)
    }

    #[test]
    fn resolves_known_localities() {
        let r = resolver();
        let addr = GlobalAddress::on_locality(LocalityId::new(3), 0x55);
        assert_eq!(r.resolve(&addr).unwrap(), (LocalityId::new(3), LocalAddress(0x55)));
    }

    #[test]
    fn unknown_locality_is_unreachable() {
        let r = resolver();
        let addr = GlobalAddress::on_locality(LocalityId::new(9), 1);
        assert!(matches!(r.resolve(&addr), Err(ApplierError::AddressingUnreachable(_))));
    }

    #[test]
    fn enumerate_filters_by_component() {
        let r = resolver();
        let ids = |filter: ComponentType| -> Vec<u32> {
            r.enumerate(filter).unwrap().into_iter().map(LocalityId::get).collect()
        };
        assert_eq!(ids(ComponentType::ANY), vec![1, 2, 3]);
        assert_eq!(ids(ComponentType(10)), vec![2, 3]);
        assert_eq!(ids(ComponentType(20)), vec![3]);
        assert!(ids(ComponentType(30)).is_empty());
    }
}
