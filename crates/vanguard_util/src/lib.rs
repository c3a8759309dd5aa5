use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the process-wide tracing subscriber. Honors `RUST_LOG`;
/// falls back to a default that turns on debug logging for every
/// `vanguard_*` crate while keeping everything else at info.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "info,vanguard=debug,vanguard_core=debug,vanguard_proxy=debug,vanguard_http=debug,vanguard_auth=debug,vanguard_config=debug",
        )
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_ids(false),
        )
        .init();
}
