use serde::Deserialize;

// =======================================================
// COOKIE CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub name: String,
    pub max_age_secs: i64,
    pub secure: bool,
    pub http_only: bool,
    pub path: String,
    pub domain: Option<String>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "vanguard_token".into(),
            max_age_secs: 24 * 60 * 60,
            secure: false,
            http_only: true,
            path: "/".into(),
            domain: None,
        }
    }
}

impl CookieConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_age_secs(&self) -> i64 {
        self.max_age_secs
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn http_only(&self) -> bool {
        self.http_only
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}
