use std::collections::HashSet;

use super::types::RuntimeConfig;
use crate::error::RuntimeError;

/// Upper bound on `threads.worker_threads`.
pub const MAX_WORKER_THREADS: usize = 1024;

impl RuntimeConfig {
    /// Validate the config: reserved ids, duplicate peers, pool size.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        self.validate_locality_id()?;
        self.validate_threads()?;
        self.validate_peers()?;
        Ok(())
    }

    fn validate_locality_id(&self) -> Result<(), RuntimeError> {
        if self.locality.id == u32::MAX {
            return Err(RuntimeError::Config(format!(
                "locality id {} is reserved",
                u32::MAX
            )));
        }
        Ok(())
    }

    fn validate_threads(&self) -> Result<(), RuntimeError> {
        if self.threads.worker_threads > MAX_WORKER_THREADS {
            return Err(RuntimeError::Config(format!(
                "worker_threads = {} exceeds the maximum of {MAX_WORKER_THREADS}",
                self.threads.worker_threads
            )));
        }
        if self.threads.thread_name_prefix.trim().is_empty() {
            return Err(RuntimeError::Config(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Peer ids must be unique, valid, and differ from the local id.
    fn validate_peers(&self) -> Result<(), RuntimeError> {
        let mut seen = HashSet::new();
        for peer in &self.peers {
            if peer.id == u32::MAX {
                return Err(RuntimeError::Config(format!(
                    "peer id {} is reserved",
                    u32::MAX
                )));
            }
            if peer.id == self.locality.id {
                return Err(RuntimeError::Config(format!(
                    "peer {} has the same id as this locality",
                    peer.id
                )));
            }
            if !seen.insert(peer.id) {
                return Err(RuntimeError::Config(format!(
                    "peer {} is listed more than once",
                    peer.id
                )));
            }
        }
        Ok(())
    }
}
