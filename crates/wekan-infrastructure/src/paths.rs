//! Platform paths for wekan configuration and shell history.

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// The platform config directory could not be determined.
    ConfigDirNotFound,
    /// The platform data directory could not be determined.
    DataDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find the config directory"),
            PathError::DataDirNotFound => write!(f, "Cannot find the data directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Where wekan keeps its files.
///
/// # Directory Structure
///
/// ```text
/// ./.wekan.toml                # Project-local config, checked first
///
/// ~/.config/wekan/
/// └── config.toml              # User config
///
/// ~/.local/share/wekan/
/// └── history                  # Readline history of the shell
/// ```
pub struct WekanPaths;

impl WekanPaths {
    const APP_DIR: &'static str = "wekan";

    /// Name of the project-local config file, relative to the working directory.
    pub const LOCAL_CONFIG: &'static str = ".wekan.toml";

    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(Self::APP_DIR))
            .ok_or(PathError::ConfigDirNotFound)
    }

    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(Self::APP_DIR))
            .ok_or(PathError::DataDirNotFound)
    }

    /// Returns the path to the user configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn local_config_file() -> PathBuf {
        PathBuf::from(Self::LOCAL_CONFIG)
    }

    /// Returns the path of the persisted readline history.
    pub fn history_file() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("history"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_live_under_app_dirs() {
        if let (Ok(dir), Ok(file)) = (WekanPaths::config_dir(), WekanPaths::config_file()) {
            assert!(dir.ends_with("wekan"));
            assert_eq!(file.parent(), Some(dir.as_path()));
        }
        if let Ok(history) = WekanPaths::history_file() {
            assert!(history.ends_with("wekan/history"));
        }
    }
}
