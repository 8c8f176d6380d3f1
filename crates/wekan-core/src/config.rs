//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth::Credentials;
use crate::error::{Result, WekanError};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Connection and shell settings, as stored in `config.toml`.
///
/// Every field is optional in the file; missing fields take their defaults.
///
/// # Example
/// ```
/// use wekan_core::config::WekanConfig;
///
/// let config: WekanConfig = toml::from_str("username = \"alice\"").unwrap();
/// assert_eq!(config.username, "alice");
/// assert_eq!(config.base_url, "http://localhost:3000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WekanConfig {
    /// Server root, without the `/api` suffix.
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Number of shell history lines kept on disk.
    pub history_size: usize,
}

impl Default for WekanConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: String::new(),
            password: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl WekanConfig {
    /// Trims the base URL's trailing slashes and checks required fields.
    pub fn normalized(mut self) -> Result<Self> {
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(WekanError::config(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(WekanError::config("timeout_ms must be greater than zero"));
        }
        Ok(self)
    }

    pub fn credentials(&self) -> Result<Credentials> {
        if self.username.is_empty() {
            return Err(WekanError::config(
                "no username configured; set `username` or WEKAN_USERNAME",
            ));
        }
        Ok(Credentials::new(&self.username, &self.password))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// A copy safe to print.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if !copy.password.is_empty() {
            copy.password = "********".to_string();
        }
        copy
    }
}
