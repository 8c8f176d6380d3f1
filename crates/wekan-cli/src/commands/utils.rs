use anyhow::{Context, Result};

use wekan_core::WekanConfig;
use wekan_infrastructure::ConfigService;

use crate::GlobalArgs;

/// Command-line flags win over the environment and the config file.
pub fn apply_flags(mut config: WekanConfig, global: &GlobalArgs) -> WekanConfig {
    if let Some(base_url) = &global.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(username) = &global.username {
        config.username = username.clone();
    }
    if let Some(password) = &global.password {
        config.password = password.clone();
    }
    config
}

/// The configuration every command runs with.
pub fn effective_config(global: &GlobalArgs) -> Result<WekanConfig> {
    let loaded = ConfigService::new(global.config.clone())
        .load()
        .context("failed to load configuration")?;
    Ok(apply_flags(loaded, global).normalized()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_loaded_values() {
        let loaded = WekanConfig {
            username: "from-file".to_string(),
            password: "file-secret".to_string(),
            ..WekanConfig::default()
        };
        let global = GlobalArgs {
            username: Some("from-flag".to_string()),
            ..GlobalArgs::default()
        };

        let config = apply_flags(loaded, &global);

        assert_eq!(config.username, "from-flag");
        assert_eq!(config.password, "file-secret");
    }
}
