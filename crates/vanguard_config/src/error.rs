use thiserror::Error;

/// Errors raised while loading or validating a gateway configuration.
///
/// These are the construction-time failures the selection core can surface
/// before a single request is served: a malformed upstream URL, an upstream
/// pool with nothing in it, or a weighted policy whose weights all add up
/// to zero. A duplicate `[backends.<host>]` table is rejected earlier, by
/// the TOML parser itself, before this type ever gets constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("backend '{host}' has an invalid upstream url '{url}': {reason}")]
    InvalidUrl {
        host: String,
        url: String,
        reason: String,
    },

    #[error("backend '{0}' has no upstream servers configured")]
    EmptyUpstreamPool(String),

    #[error("backend '{host}' uses weighted_round_robin but its weights sum to zero")]
    ZeroTotalWeight { host: String },

    #[error("jwt_secret must not be empty")]
    MissingJwtSecret,

    #[error("auth_host must not be empty")]
    MissingAuthHost,
}
