//! Configuration loading.
//!
//! The first existing file of `--config <path>`, `./.wekan.toml` and
//! `<config dir>/wekan/config.toml` is read; `WEKAN_*` environment variables
//! override its values.

use std::path::{Path, PathBuf};

use wekan_core::config::WekanConfig;
use wekan_core::error::{Result, WekanError};

use crate::paths::WekanPaths;
use crate::storage::ConfigStorage;

pub const ENV_BASE_URL: &str = "WEKAN_BASE_URL";
pub const ENV_USERNAME: &str = "WEKAN_USERNAME";
pub const ENV_PASSWORD: &str = "WEKAN_PASSWORD";
pub const ENV_TIMEOUT: &str = "WEKAN_TIMEOUT";

/// Resolves and loads the effective configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigService {
    explicit: Option<PathBuf>,
}

impl ConfigService {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }

    /// The file the configuration is read from, if any exists.
    ///
    /// An explicit path that does not exist is an error rather than a
    /// silent fallback.
    pub fn locate(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.explicit {
            if !path.exists() {
                return Err(WekanError::config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Ok(Some(path.clone()));
        }

        let local = WekanPaths::local_config_file();
        if local.exists() {
            return Ok(Some(local));
        }
        Ok(WekanPaths::config_file().ok().filter(|path| path.exists()))
    }

    /// Where `config init` writes: the explicit path or the user config file.
    pub fn target(&self) -> Result<PathBuf> {
        match &self.explicit {
            Some(path) => Ok(path.clone()),
            None => WekanPaths::config_file().map_err(|e| WekanError::config(e.to_string())),
        }
    }

    /// File values, then environment overrides, normalized.
    pub fn load(&self) -> Result<WekanConfig> {
        let from_file = match self.locate()? {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::read(&path)?
            }
            None => WekanConfig::default(),
        };
        apply_env(from_file, |key| std::env::var(key).ok())?.normalized()
    }

    fn read(path: &Path) -> Result<WekanConfig> {
        let loaded: Option<WekanConfig> = ConfigStorage::new(path.to_path_buf()).load()?;
        Ok(loaded.unwrap_or_default())
    }

    /// Writes `config` to the init target. Refuses to overwrite unless `force`.
    pub fn init(&self, config: &WekanConfig, force: bool) -> Result<PathBuf> {
        let path = self.target()?;
        if path.exists() && !force {
            return Err(WekanError::config(format!(
                "{} already exists; pass --force to overwrite",
                path.display()
            )));
        }
        ConfigStorage::new(path.clone()).save(config)?;
        tracing::info!(path = %path.display(), "config written");
        Ok(path)
    }
}

/// Overrides config values from the environment, looked up through `lookup`.
pub fn apply_env<F>(mut config: WekanConfig, lookup: F) -> Result<WekanConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(base_url) = lookup(ENV_BASE_URL) {
        config.base_url = base_url;
    }
    if let Some(username) = lookup(ENV_USERNAME) {
        config.username = username;
    }
    if let Some(password) = lookup(ENV_PASSWORD) {
        config.password = password;
    }
    if let Some(timeout) = lookup(ENV_TIMEOUT) {
        config.timeout_ms = timeout.trim().parse().map_err(|_| {
            WekanError::config(format!("{ENV_TIMEOUT} must be milliseconds, got '{timeout}'"))
        })?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_file_values() {
        let config = WekanConfig {
            username: "file-user".to_string(),
            ..WekanConfig::default()
        };

        let merged = apply_env(
            config,
            env(&[(ENV_USERNAME, "env-user"), (ENV_TIMEOUT, "500")]),
        )
        .unwrap();

        assert_eq!(merged.username, "env-user");
        assert_eq!(merged.timeout_ms, 500);
        assert_eq!(merged.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_bad_timeout_is_config_error() {
        let err = apply_env(WekanConfig::default(), env(&[(ENV_TIMEOUT, "soon")])).unwrap_err();
        assert!(matches!(err, WekanError::Config(_)));
    }

    #[test]
    fn test_explicit_file_is_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wekan.toml");
        fs::write(
            &path,
            "base_url = \"https://boards.example.com/\"\nusername = \"bob\"\n",
        )
        .unwrap();

        let config = ConfigService::read(&path).unwrap().normalized().unwrap();

        assert_eq!(config.base_url, "https://boards.example.com");
        assert_eq!(config.username, "bob");
        assert_eq!(config.history_size, 1000);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let service = ConfigService::new(Some(temp_dir.path().join("absent.toml")));

        assert!(matches!(service.locate(), Err(WekanError::Config(_))));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let service = ConfigService::new(Some(path.clone()));
        let config = WekanConfig {
            username: "carol".to_string(),
            ..WekanConfig::default()
        };

        assert_eq!(service.init(&config, false).unwrap(), path);
        assert!(service.init(&config, false).is_err());
        assert!(service.init(&config, true).is_ok());
        assert_eq!(ConfigService::read(&path).unwrap().username, "carol");
    }
}
