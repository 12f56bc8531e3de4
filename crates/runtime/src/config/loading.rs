use std::path::Path;

use tandem_applier::{ComponentType, LocalityId};

use crate::error::RuntimeError;

use super::types::{ApplierConfig, LocalityConfig, PeerConfig, RuntimeConfig, ThreadsConfig};

impl RuntimeConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// A single locality with id 0 and no peers.
    pub fn local() -> Self {
        Self::for_locality(0)
    }

    pub fn for_locality(id: u32) -> Self {
        Self {
            locality: LocalityConfig {
                id,
                components: Vec::new(),
            },
            threads: ThreadsConfig::default(),
            applier: ApplierConfig::default(),
            peers: Vec::new(),
        }
    }

    /// Add a peer hosting `components`.
    pub fn with_peer(mut self, id: u32, components: &[u32]) -> Self {
        self.peers.push(PeerConfig {
            id,
            components: components.to_vec(),
        });
        self
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.threads.worker_threads = worker_threads;
        self
    }

    pub fn locality_id(&self) -> LocalityId {
        LocalityId::new(self.locality.id)
    }

    pub fn local_components(&self) -> Vec<ComponentType> {
        self.locality.components.iter().copied().map(ComponentType).collect()
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `TANDEM_LOCALITY_ID` -> `locality.id`
    /// - `TANDEM_WORKER_THREADS` -> `threads.worker_threads`
    /// - `TANDEM_VERIFY_LOCKS` -> `applier.verify_locks`
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Unparseable values are ignored.
    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TANDEM_LOCALITY_ID") {
            if let Ok(id) = v.parse::<u32>() {
                self.locality.id = id;
            }
        }
        if let Some(v) = lookup("TANDEM_WORKER_THREADS") {
            if let Ok(n) = v.parse::<usize>() {
                self.threads.worker_threads = n;
            }
        }
        if let Some(v) = lookup("TANDEM_VERIFY_LOCKS") {
            match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.applier.verify_locks = true,
                "0" | "false" | "no" | "off" => self.applier.verify_locks = false,
                _ => {}
            }
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::local()
    }
}
