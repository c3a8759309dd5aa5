use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use vanguard_config::{BackendConfig, ConfigError, GatewayConfig};

use crate::selector::Selector;
use crate::upstream::Upstream;

/// Maps a virtual-host string (the `Host` header value clients send) to the
/// Selector bound to it. Built once from a `GatewayConfig`, then read-only
/// for the life of the process: no locking guards lookup.
pub struct Registry {
    backends: HashMap<String, Selector>,
    cancel: CancellationToken,
}

impl Registry {
    /// Builds every backend's Upstream pool and Selector. All-or-nothing:
    /// the first `ConfigError` aborts construction and drops whatever was
    /// already built, so a caller never observes a partially wired
    /// Registry. Every spawned prober/counter task is tied to `cancel` (or
    /// a child of it), so dropping the returned token tears the whole
    /// pool down.
    pub fn build(cfg: &GatewayConfig) -> Result<Self, ConfigError> {
        let cancel = CancellationToken::new();
        let mut backends = HashMap::with_capacity(cfg.backends().len());

        for (host, backend) in cfg.backends() {
            let selector = build_selector(host, backend, &cancel)?;
            info!(
                target: "vanguard_proxy::registry",
                host = %host,
                policy = backend.normalized_load_balance(),
                pool_size = selector.pool_len(),
                "registered backend"
            );
            backends.insert(host.clone(), selector);
        }

        Ok(Self { backends, cancel })
    }

    /// O(1) lookup by `Host` header value. A miss means "no backend for
    /// this host" — reported to the HTTP layer, not an error here.
    pub fn lookup(&self, host: &str) -> Option<&Selector> {
        self.backends.get(host)
    }

    pub fn is_known_host(&self, host: &str) -> bool {
        self.backends.contains_key(host)
    }

    /// Cancels every prober and connection-counter task owned by this
    /// Registry's Upstreams. Idempotent; safe to call during shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

fn build_selector(
    host: &str,
    backend: &BackendConfig,
    cancel: &CancellationToken,
) -> Result<Selector, ConfigError> {
    let urls = backend.upstream().as_vec();
    let mut upstreams: Vec<Arc<Upstream>> = Vec::with_capacity(urls.len());
    for url in &urls {
        let upstream = Upstream::new(url, backend.client(), backend.health_check(), cancel)?;
        upstreams.push(upstream);
    }

    Ok(match backend.normalized_load_balance() {
        "random" => Selector::random(upstreams, None),
        "least_connections" => Selector::least_connections(upstreams),
        "weighted_round_robin" => {
            let weights = padded_weights(backend.weight(), upstreams.len());
            if weights.iter().all(|w| *w == 0) {
                return Err(ConfigError::ZeroTotalWeight {
                    host: host.to_string(),
                });
            }
            Selector::weighted_round_robin(upstreams, weights)
        }
        // "round_robin", and the fallback for any unrecognized tag per
        // BackendConfig::normalized_load_balance.
        _ => Selector::round_robin(upstreams),
    })
}

/// Pads a short (or missing) weight list with `1`s so every upstream in
/// the pool gets a weight, matching the spec's "missing or short => pad
/// with weight 1" rule.
fn padded_weights(configured: &[u32], len: usize) -> Vec<u32> {
    let mut weights: Vec<u32> = configured.iter().copied().take(len).collect();
    weights.resize(len, 1);
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use vanguard_config::GatewayConfig;

    fn cfg_with_backend(toml: &str) -> GatewayConfig {
        let built = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        built.try_deserialize().unwrap()
    }

    #[tokio::test]
    async fn builds_one_selector_per_backend() {
        let cfg = cfg_with_backend(
            r#"
            jwt_secret = "s"
            auth_host = "auth.local"

            [backends.app]
            upstream = ["http://a.internal", "http://b.internal"]
            load_balance = "round_robin"
            [backends.app.health_check]
            enabled = false
            "#,
        );
        let registry = Registry::build(&cfg).unwrap();
        assert!(registry.lookup("app").is_some());
        assert!(registry.lookup("missing").is_none());
        registry.shutdown();
    }

    #[tokio::test]
    async fn unknown_policy_falls_back_to_round_robin() {
        let cfg = cfg_with_backend(
            r#"
            jwt_secret = "s"
            auth_host = "auth.local"

            [backends.app]
            upstream = "http://a.internal"
            load_balance = "bogus_policy"
            [backends.app.health_check]
            enabled = false
            "#,
        );
        let registry = Registry::build(&cfg).unwrap();
        let selector = registry.lookup("app").unwrap();
        assert!(matches!(selector, Selector::RoundRobin { .. }));
        registry.shutdown();
    }

    #[tokio::test]
    async fn zero_total_weight_is_rejected() {
        let cfg = cfg_with_backend(
            r#"
            jwt_secret = "s"
            auth_host = "auth.local"

            [backends.app]
            upstream = ["http://a.internal", "http://b.internal"]
            load_balance = "weighted_round_robin"
            weight = [0, 0]
            [backends.app.health_check]
            enabled = false
            "#,
        );
        assert!(matches!(
            Registry::build(&cfg),
            Err(ConfigError::ZeroTotalWeight { .. })
        ));
    }

    #[tokio::test]
    async fn short_weight_list_is_padded_with_one() {
        let cfg = cfg_with_backend(
            r#"
            jwt_secret = "s"
            auth_host = "auth.local"

            [backends.app]
            upstream = ["http://a.internal", "http://b.internal", "http://c.internal"]
            load_balance = "weighted_round_robin"
            weight = [5]
            [backends.app.health_check]
            enabled = false
            "#,
        );
        let registry = Registry::build(&cfg).unwrap();
        let selector = registry.lookup("app").unwrap();
        assert_eq!(selector.pool_len(), 3);
        registry.shutdown();
    }
}
