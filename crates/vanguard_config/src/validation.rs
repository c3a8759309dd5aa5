use crate::GatewayConfig;

/// Validation output for a loaded gateway configuration.
#[derive(Debug, Default)]
pub struct ConfigReport {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ConfigReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn format(&self) -> String {
        let mut out = String::new();
        if !self.errors.is_empty() {
            out.push_str("Errors:\n");
            for err in &self.errors {
                out.push_str("  - ");
                out.push_str(err);
                out.push('\n');
            }
        }
        if !self.warnings.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Warnings:\n");
            for warn in &self.warnings {
                out.push_str("  - ");
                out.push_str(warn);
                out.push('\n');
            }
        }
        out
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// Validate a gateway configuration and return a report of issues.
///
/// This is advisory only: construction failures that the core itself
/// refuses to build from (duplicate hosts, empty pools, bad URLs, zero
/// weights) surface as `ConfigError` from `GatewayConfig::backends_checked`,
/// not through this report. This pass catches softer issues worth a
/// warning: an empty credential pair, an auth_host that also names a
/// backend, a cookie whose `max_age_secs` is non-positive.
pub fn validate(cfg: &GatewayConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    if cfg.jwt_secret.trim().is_empty() {
        report.error("jwt_secret must not be empty");
    }

    if cfg.auth_host.trim().is_empty() {
        report.error("auth_host must not be empty");
    }

    if cfg.backends.contains_key(&cfg.auth_host) {
        report.warn(format!(
            "auth_host '{}' also names a backend; the backend is unreachable, the auth gate owns that host",
            cfg.auth_host
        ));
    }

    if cfg.credential.username().is_empty() {
        report.warn("credential.username is empty; the login form can never succeed");
    }

    if cfg.cookie.max_age_secs() <= 0 {
        report.warn("cookie.max_age_secs is not positive; the session cookie expires immediately");
    }

    if cfg.backends.is_empty() {
        report.warn("no backends configured; every authenticated request will 404");
    }

    for (host, backend) in &cfg.backends {
        if let Err(e) = backend.validate(host) {
            report.error(e.to_string());
        }
    }

    report
}
