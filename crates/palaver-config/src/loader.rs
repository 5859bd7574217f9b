//! Configuration loading utilities

use crate::Config;
use palaver_common::PalaverError;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "PALAVER_CONFIG";

/// Files probed in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILES: [&str; 3] = ["palaver.yaml", "palaver.yml", "palaver.toml"];

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error when reading configuration file
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// File extension is neither YAML nor TOML
    #[error("Unsupported configuration format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Configuration validation error
    #[error("Configuration validation failed: {0}")]
    Validation(String),

    /// Environment variable parsing error
    #[error("Failed to parse environment variable '{var}': {source}")]
    EnvParse {
        /// Variable name.
        var: String,
        /// Parse failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),
}

impl From<ConfigError> for PalaverError {
    fn from(err: ConfigError) -> Self {
        Self::config_with_source("Failed to load configuration", err)
    }
}

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.toml`
    Toml,
}

impl ConfigFormat {
    /// Detects the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Configuration loader for the application
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from `explicit`, else `PALAVER_CONFIG`, else the
    /// first default file present, else built-in defaults. Environment
    /// overrides are applied and the result is validated.
    pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_PATH_VAR).map(PathBuf::from))
            .or_else(|| {
                DEFAULT_CONFIG_FILES
                    .iter()
                    .map(PathBuf::from)
                    .find(|candidate| candidate.exists())
            });

        match path {
            Some(path) => Self::load_config(&path),
            None => {
                info!("No configuration file found, using defaults");
                let mut config = Config::default();
                Self::apply_env_overrides(&mut config)?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load configuration from a file with environment variable overrides
    pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let format =
            ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content, format)?;
        debug!(path = %path.display(), ?format, "Parsed configuration file");

        Self::apply_env_overrides(&mut config)?;
        config.validate()?;

        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parses configuration text without overrides or validation.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
        Ok(match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        })
    }

    /// Apply process environment overrides to configuration
    pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
        Self::apply_overrides(config, |var| env::var(var).ok())
    }

    /// Apply overrides read through `lookup`, which maps a variable name to
    /// its value.
    pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_TOKEN") {
            config.telegram.token = token;
        }

        if let Some(username) = lookup("TELEGRAM_BOT_USERNAME") {
            config.telegram.bot_username = username.trim().trim_start_matches('@').to_string();
        }

        if let Some(ids) = lookup("PALAVER_ADMIN_IDS") {
            config.telegram.admin_ids = split_list(&ids)
                .map(|id| {
                    id.parse().map_err(|e| ConfigError::EnvParse {
                        var: "PALAVER_ADMIN_IDS".to_string(),
                        source: Box::new(e),
                    })
                })
                .collect::<Result<_, _>>()?;
        }

        if let Some(keys) = lookup("GEMINI_API_KEYS") {
            config.inference.api_keys = split_list(&keys).map(str::to_string).collect();
        }

        if let Some(path) = lookup("PALAVER_DATABASE_PATH") {
            config.storage.path = PathBuf::from(path);
        }

        if let Some(level) = lookup("PALAVER_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(())
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yaml")), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_path(Path::new("a.YML")), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        let lookup = lookup_from(&[
            ("TELEGRAM_TOKEN", "123:abc"),
            ("TELEGRAM_BOT_USERNAME", "@palaver_bot"),
            ("PALAVER_ADMIN_IDS", "1, 2,3"),
            ("GEMINI_API_KEYS", "k1,,k2"),
        ]);
        ConfigLoader::apply_overrides(&mut config, lookup).unwrap();

        assert_eq!(config.telegram.token, "123:abc");
        assert_eq!(config.telegram.bot_username, "palaver_bot");
        assert_eq!(config.telegram.admin_ids, vec![1, 2, 3]);
        assert_eq!(config.inference.api_keys, vec!["k1", "k2"]);
        assert!(config.validate_for_runtime().is_ok());
    }

    #[test]
    fn test_bad_admin_id_is_reported() {
        let mut config = Config::default();
        let result =
            ConfigLoader::apply_overrides(&mut config, lookup_from(&[("PALAVER_ADMIN_IDS", "12,x")]));
        assert!(matches!(result, Err(ConfigError::EnvParse { var, .. }) if var == "PALAVER_ADMIN_IDS"));
    }
}
