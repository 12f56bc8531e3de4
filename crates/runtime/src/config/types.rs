use serde::{Deserialize, Serialize};

// ── Top-level config ────────────────────────────────────────────────

/// Configuration for one locality of the runtime.
///
/// Parsed from `tandem.toml` with support for environment variable overrides.
/// Names this locality, sizes its worker pool, and lists the peers it can
/// send parcels to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub locality: LocalityConfig,

    /// Worker pool settings.
    #[serde(default)]
    pub threads: ThreadsConfig,

    #[serde(default)]
    pub applier: ApplierConfig,

    /// Other localities reachable from this one.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

// ── Section configs ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalityConfig {
    /// Locality id; `u32::MAX` is reserved.
    #[serde(default)]
    pub id: u32,

    /// Component types hosted here, for enumeration filters.
    #[serde(default)]
    pub components: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsConfig {
    /// Number of pool workers (0 = available parallelism).
    #[serde(default)]
    pub worker_threads: usize,

    /// Worker threads are named `<prefix>-<index>`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_thread_name_prefix() -> String {
    "tandem-worker".into()
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl ThreadsConfig {
    /// Resolve the actual worker count (auto-detect if 0).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplierConfig {
    /// Fail fatally when a unit of work returns holding a lock.
    #[serde(default = "default_verify_locks")]
    pub verify_locks: bool,
}

fn default_verify_locks() -> bool {
    true
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            verify_locks: default_verify_locks(),
        }
    }
}

/// A remote locality and the component types it hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: u32,

    #[serde(default)]
    pub components: Vec<u32>,
}
