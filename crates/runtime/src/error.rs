use tandem_applier::ApplierError;
use thiserror::Error;

/// Errors raised while assembling or running a locality.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("no tokio runtime to drive the loopback fabric: {0}")]
    AsyncRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error(transparent)]
    Applier(#[from] ApplierError),
}
