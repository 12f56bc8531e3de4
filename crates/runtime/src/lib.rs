//! Reference collaborators for the applier and the pieces to assemble
//! in-process localities from them.

pub mod config;
pub mod error;
pub mod locality;
pub mod loopback;
pub mod pool;
pub mod resolver;

pub use config::RuntimeConfig;
pub use error::RuntimeError;
pub use locality::Locality;
pub use loopback::{LoopbackFabric, LoopbackTransport};
pub use pool::{PoolSnapshot, PoolThreadManager};
pub use resolver::StaticResolver;
