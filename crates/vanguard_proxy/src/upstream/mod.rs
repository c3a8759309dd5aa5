mod health;
mod pool;

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;
use vanguard_config::{ClientConfig, ConfigError, HealthCheckConfig};

use crate::status::StatusPattern;

pub(crate) use pool::PooledStream;

/// Outbound-client knobs for one Upstream, defaulted per construction
/// rules: a zero-valued field in the source config is replaced with an
/// implementation default rather than kept as zero.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_conns_per_host: usize,
    pub max_idle_conn_duration: Duration,
    pub keep_alive: bool,
    /// Stream the response body to the client instead of buffering it
    /// whole. Passed through as given, same as `keep_alive`.
    pub response_body_stream: bool,
}

impl From<&ClientConfig> for ClientOptions {
    fn from(cfg: &ClientConfig) -> Self {
        Self {
            dial_timeout: non_zero_or(cfg.dial_timeout_ms, 1_000),
            read_timeout: non_zero_or(cfg.read_timeout_ms, 60_000),
            write_timeout: non_zero_or(cfg.write_timeout_ms, 60_000),
            max_conns_per_host: if cfg.max_conns_per_host == 0 {
                32
            } else {
                cfg.max_conns_per_host
            },
            max_idle_conn_duration: non_zero_or(cfg.max_idle_conn_duration_ms, 90_000),
            keep_alive: cfg.keep_alive,
            response_body_stream: cfg.response_body_stream,
        }
    }
}

fn non_zero_or(ms: u64, default_ms: u64) -> Duration {
    Duration::from_millis(if ms == 0 { default_ms } else { ms })
}

/// Probe parameters for one Upstream, defaults filled per construction.
#[derive(Debug, Clone)]
pub struct HealthProbeConfig {
    pub enabled: bool,
    pub host: String,
    pub method: String,
    pub path: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub allow_status_codes: Vec<StatusPattern>,
}

impl HealthProbeConfig {
    fn from_cfg(cfg: &HealthCheckConfig, origin_host: &str) -> Self {
        let method = if cfg.method.trim().is_empty() {
            "GET".to_string()
        } else {
            cfg.method.clone()
        };
        let path = if cfg.path.trim().is_empty() {
            "/".to_string()
        } else {
            cfg.path.clone()
        };
        let interval = if cfg.interval_secs == 0 {
            Duration::from_secs(10)
        } else {
            Duration::from_secs(cfg.interval_secs)
        };
        let timeout = if cfg.timeout_secs == 0 {
            Duration::from_secs(5)
        } else {
            Duration::from_secs(cfg.timeout_secs)
        };
        let allow_status_codes = cfg
            .allow_status_codes
            .iter()
            .filter_map(|s| StatusPattern::parse(s))
            .collect();

        Self {
            enabled: cfg.enabled,
            host: cfg.host.clone().unwrap_or_else(|| origin_host.to_string()),
            method,
            path,
            interval,
            timeout,
            allow_status_codes,
        }
    }
}

struct UpstreamState {
    healthy: bool,
    conn_count: u64,
}

/// One backend endpoint. Owns its outbound connection pool, its live
/// connection counter, and (if enabled) a background prober task tied to
/// a cancellation token supplied by the owning Registry.
pub struct Upstream {
    pub(crate) url: Url,
    pub client_options: ClientOptions,
    pub health_config: HealthProbeConfig,
    state: RwLock<UpstreamState>,
    active_conns: AtomicU64,
    pool: std::sync::Mutex<Vec<PooledStream>>,
    cancel: CancellationToken,
}

impl Upstream {
    /// Validates `url`, fills in client/health defaults, and (iff probing
    /// is enabled) spawns the prober and connection-counter tasks
    /// immediately, tied to `parent_cancel`.
    pub fn new(
        url_str: &str,
        client_cfg: &ClientConfig,
        health_cfg: &HealthCheckConfig,
        parent_cancel: &CancellationToken,
    ) -> Result<std::sync::Arc<Self>, ConfigError> {
        let url = Url::parse(url_str)
            .or_else(|_| Url::parse(&format!("http://{url_str}")))
            .map_err(|e| ConfigError::InvalidUrl {
                host: url_str.to_string(),
                url: url_str.to_string(),
                reason: e.to_string(),
            })?;
        let origin_host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidUrl {
                host: url_str.to_string(),
                url: url_str.to_string(),
                reason: "missing host".into(),
            })?
            .to_string();

        let client_options = ClientOptions::from(client_cfg);
        let health_config = HealthProbeConfig::from_cfg(health_cfg, &origin_host);
        let enabled = health_config.enabled;

        let upstream = std::sync::Arc::new(Self {
            url,
            client_options,
            health_config,
            state: RwLock::new(UpstreamState {
                healthy: true,
                conn_count: 0,
            }),
            active_conns: AtomicU64::new(0),
            pool: std::sync::Mutex::new(Vec::new()),
            cancel: parent_cancel.child_token(),
        });

        if enabled {
            info!(
                target: "vanguard_proxy::upstream",
                url = %upstream.url,
                "starting health prober"
            );
            tokio::spawn(health::run_prober(upstream.clone()));
        } else {
            debug!(
                target: "vanguard_proxy::upstream",
                url = %upstream.url,
                "health probing disabled, treating as always healthy"
            );
        }
        tokio::spawn(Self::run_conn_counter(upstream.clone()));

        Ok(upstream)
    }

    pub fn origin(&self) -> &Url {
        &self.url
    }

    /// Returns `healthy` under a read-lock.
    pub fn is_available(&self) -> bool {
        self.state.read().expect("upstream lock poisoned").healthy
    }

    /// Returns `conn_count` under a read-lock.
    pub fn load(&self) -> u64 {
        self.state.read().expect("upstream lock poisoned").conn_count
    }

    /// Test-only seam. Production code must never call this: it bypasses
    /// the prober and writes `healthy` directly.
    pub fn set_available(&self, value: bool) {
        self.state.write().expect("upstream lock poisoned").healthy = value;
    }

    /// Test-only seam. Production code must never call this.
    pub fn set_load(&self, value: u64) {
        self.state.write().expect("upstream lock poisoned").conn_count = value;
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn set_healthy(&self, value: bool) {
        let mut guard = self.state.write().expect("upstream lock poisoned");
        if guard.healthy != value {
            debug!(
                target: "vanguard_proxy::upstream",
                url = %self.url,
                healthy = value,
                "upstream health transition"
            );
        }
        guard.healthy = value;
    }

    /// Called by the connection pool at checkout time.
    pub(crate) fn note_conn_opened(&self) {
        self.active_conns.fetch_add(1, Ordering::Relaxed);
    }

    /// Called by the connection pool at checkin time, or when a checked-out
    /// connection is dropped without being returned.
    pub(crate) fn note_conn_closed(&self) {
        self.active_conns.fetch_sub(1, Ordering::Relaxed);
    }

    /// Copies the live connection count into the locked field. Modeled as
    /// an external observer sampling the outbound client subsystem every
    /// ~100ms and overwriting `conn_count`, matching the spec's
    /// "overwrite, not increment" note: no back-pressure, no overflow.
    async fn run_conn_counter(self: std::sync::Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let n = self.active_conns.load(Ordering::Relaxed);
                    let mut guard = self.state.write().expect("upstream lock poisoned");
                    guard.conn_count = n;
                }
            }
        }
    }
}
