use serde::Deserialize;

use crate::error::ConfigError;
use crate::upstream::{ClientConfig, HealthCheckConfig, UpstreamServers};

// =======================================================
// BACKEND CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub load_balance: String,
    pub weight: Vec<u32>,
    pub upstream: UpstreamServers,
    pub health_check: HealthCheckConfig,
    pub client: ClientConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            load_balance: "round_robin".into(),
            weight: Vec::new(),
            upstream: UpstreamServers::One(String::new()),
            health_check: HealthCheckConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn load_balance(&self) -> &str {
        &self.load_balance
    }

    pub fn weight(&self) -> &[u32] {
        &self.weight
    }

    pub fn upstream(&self) -> &UpstreamServers {
        &self.upstream
    }

    pub fn health_check(&self) -> &HealthCheckConfig {
        &self.health_check
    }

    pub fn client(&self) -> &ClientConfig {
        &self.client
    }

    /// Normalizes `load_balance` to one of the five known policy names,
    /// falling back to `round_robin` for anything unrecognized.
    pub fn normalized_load_balance(&self) -> &str {
        match self.load_balance.as_str() {
            "round_robin" | "random" | "least_connections" | "weighted_round_robin" => {
                self.load_balance.as_str()
            }
            _ => "round_robin",
        }
    }

    pub(crate) fn validate(&self, host: &str) -> Result<(), ConfigError> {
        if self.upstream.is_empty() {
            return Err(ConfigError::EmptyUpstreamPool(host.to_string()));
        }

        for url in self.upstream.as_vec() {
            let parsed = url::Url::parse(&url)
                .or_else(|_| url::Url::parse(&format!("http://{url}")))
                .map_err(|e| ConfigError::InvalidUrl {
                    host: host.to_string(),
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
            if parsed.host_str().is_none() {
                return Err(ConfigError::InvalidUrl {
                    host: host.to_string(),
                    url,
                    reason: "missing host".into(),
                });
            }
        }

        if self.normalized_load_balance() == "weighted_round_robin" && !self.weight.is_empty() {
            // Mirror Registry::build_selector's padding (missing or short ⇒
            // weight 1) before judging the total: a short list like
            // `weight=[0]` over three servers pads to `[0, 1, 1]` and is not
            // a zero-total backend.
            let servers = self.upstream.as_vec().len();
            let mut padded: Vec<u32> = self.weight.iter().copied().take(servers).collect();
            padded.resize(servers, 1);
            if padded.iter().all(|w| *w == 0) {
                return Err(ConfigError::ZeroTotalWeight {
                    host: host.to_string(),
                });
            }
        }

        Ok(())
    }
}
