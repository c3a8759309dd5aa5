use std::collections::HashMap;

use serde::Deserialize;

use crate::backend::BackendConfig;
use crate::cookie::CookieConfig;
use crate::credential::CredentialConfig;
use crate::error::ConfigError;
use crate::validation::{ConfigReport, validate};

// =======================================================
// GATEWAY CONFIG — top-level config
// =======================================================
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub addr: String,
    pub auth_host: String,
    pub ssl: bool,
    pub jwt_secret: String,

    #[serde(default)]
    pub cookie: CookieConfig,

    #[serde(default)]
    pub credential: CredentialConfig,

    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".into(),
            auth_host: "auth.localhost".into(),
            ssl: false,
            jwt_secret: String::new(),
            cookie: CookieConfig::default(),
            credential: CredentialConfig::default(),
            backends: HashMap::new(),
        }
    }
}

impl GatewayConfig {
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn auth_host(&self) -> &str {
        &self.auth_host
    }

    pub fn ssl(&self) -> bool {
        self.ssl
    }

    /// The scheme used when building cross-host redirect URLs.
    pub fn scheme(&self) -> &'static str {
        if self.ssl { "https" } else { "http" }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    pub fn cookie(&self) -> &CookieConfig {
        &self.cookie
    }

    pub fn credential(&self) -> &CredentialConfig {
        &self.credential
    }

    pub fn backends(&self) -> &HashMap<String, BackendConfig> {
        &self.backends
    }

    pub fn backend(&self, host: &str) -> Option<&BackendConfig> {
        self.backends.get(host)
    }

    /// Validates every backend's upstream pool and weights, returning the
    /// first construction failure found. The Registry is built only from
    /// a config that has already passed this check.
    pub fn checked_backends(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingJwtSecret);
        }
        if self.auth_host.trim().is_empty() {
            return Err(ConfigError::MissingAuthHost);
        }
        for (host, backend) in &self.backends {
            backend.validate(host)?;
        }
        Ok(())
    }

    /// Validate the configuration and return a report of warnings and errors.
    pub fn validate(&self) -> ConfigReport {
        validate(self)
    }

    pub fn from_file(file_name: &str) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::new(file_name, config::FileFormat::Toml).required(false))
            .build()?;

        let cfg: GatewayConfig = built.try_deserialize()?;
        Ok(cfg)
    }

    pub fn from_file_or_default(file_name: &str) -> Self {
        match Self::from_file(file_name) {
            Ok(cfg) => {
                let report = cfg.validate();
                if report.has_errors() {
                    eprintln!("invalid config in '{file_name}':");
                    eprintln!("{}", report.format());
                    eprintln!("using default config (in-memory)...");
                    GatewayConfig::default()
                } else {
                    if !report.warnings().is_empty() {
                        eprintln!("config warnings in '{file_name}':");
                        eprintln!("{}", report.format());
                    }
                    cfg
                }
            }
            Err(e) => {
                eprintln!("error reading config '{file_name}': {e}");
                eprintln!("using default config (in-memory)...");
                GatewayConfig::default()
            }
        }
    }

    pub fn print(&self) {
        println!("================ VANGUARD CONFIG ================");
        println!("\n[gateway]");
        println!("  addr        = {}", self.addr);
        println!("  auth_host   = {}", self.auth_host);
        println!("  ssl         = {}", self.ssl);
        println!("\n[cookie]");
        println!("  name        = {}", self.cookie.name());
        println!("  max_age_secs = {}", self.cookie.max_age_secs());
        println!("  secure      = {}", self.cookie.secure());
        println!("\n[backends]");
        for (host, backend) in &self.backends {
            println!("  backend {host}:");
            println!("    load_balance = {}", backend.load_balance());
            println!("    upstream     = {}", backend.upstream());
            println!("    health_check.enabled = {}", backend.health_check().enabled());
        }
        println!("==================================================");
    }
}
