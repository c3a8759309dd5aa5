use serde::Deserialize;

// =======================================================
// UPSTREAM SERVERS (one or many, same shape the rest of the
// ecosystem uses for a `server =` key that may be a scalar or a list)
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UpstreamServers {
    One(String),
    Many(Vec<String>),
}

impl UpstreamServers {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            UpstreamServers::One(s) => vec![s.clone()],
            UpstreamServers::Many(list) => list.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            UpstreamServers::One(s) => s.trim().is_empty(),
            UpstreamServers::Many(list) => list.is_empty(),
        }
    }
}

impl std::fmt::Display for UpstreamServers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamServers::One(s) => write!(f, "{s}"),
            UpstreamServers::Many(list) => write!(f, "{list:?}"),
        }
    }
}

// =======================================================
// HEALTH CHECK CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub host: Option<String>,
    pub method: String,
    pub path: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// Status-code patterns considered a healthy probe response, e.g.
    /// `"200"` (exact) or `"2xx"` (wildcard family).
    pub allow_status_codes: Vec<String>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: None,
            method: "GET".into(),
            path: "/".into(),
            interval_secs: 10,
            timeout_secs: 5,
            allow_status_codes: vec!["2xx".into()],
        }
    }
}

impl HealthCheckConfig {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }

    pub fn allow_status_codes(&self) -> &[String] {
        &self.allow_status_codes
    }
}

// =======================================================
// CLIENT CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub dial_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub max_conns_per_host: usize,
    pub max_idle_conn_duration_ms: u64,
    pub keep_alive: bool,
    /// Stream the response body to the client as it arrives instead of
    /// buffering it whole before writing. Carried through as given, not
    /// defaulted like the timeout/pool fields above.
    pub response_body_stream: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dial_timeout_ms: 1_000,
            read_timeout_ms: 60_000,
            write_timeout_ms: 60_000,
            max_conns_per_host: 32,
            max_idle_conn_duration_ms: 90_000,
            keep_alive: true,
            response_body_stream: false,
        }
    }
}

impl ClientConfig {
    pub fn dial_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn read_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.write_timeout_ms)
    }

    pub fn idle_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.max_idle_conn_duration_ms)
    }

    pub fn response_body_stream(&self) -> bool {
        self.response_body_stream
    }
}
