//! Runtime configuration: TOML file, then `TANDEM_*` environment overrides,
//! then validation.

mod loading;
mod types;
mod validation;

#[cfg(test)]
mod tests;

pub use types::{ApplierConfig, LocalityConfig, PeerConfig, RuntimeConfig, ThreadsConfig};
pub use validation::MAX_WORKER_THREADS;
