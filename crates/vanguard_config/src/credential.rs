use serde::Deserialize;

// =======================================================
// CREDENTIAL CONFIG (single static username/password pair)
// =======================================================
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CredentialConfig {
    pub username: String,
    pub password: String,
}

impl CredentialConfig {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn matches(&self, username: &str, password: &str) -> bool {
        !self.username.is_empty() && self.username == username && self.password == password
    }
}
