use thiserror::Error;

pub use vanguard_config::ConfigError;

/// Raised by a Selector when no Upstream in its pool can take the request.
#[derive(Debug, Error)]
#[error("no available upstream for host '{host}'")]
pub struct NoAvailableUpstream {
    pub host: String,
}
