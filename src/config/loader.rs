//! Configuration loading
//!
//! Layers, lowest to highest precedence: built-in defaults, the config file,
//! environment variable overrides.

use super::{paths, schema::Config};
use anyhow::{Context, Result};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the root config file (if any) with environment overrides applied
    pub fn load() -> Result<Config> {
        let path = paths::root_config_path();
        let config = if path.exists() {
            Self::load_file(&path)?
        } else {
            Config::default()
        };

        Ok(Self::apply_env_overrides(config))
    }

    /// Load configuration from a file
    pub fn load_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parse the config file and check values that serde cannot
    pub fn validate() -> Result<()> {
        let config = Self::load().context("Failed to load configuration")?;
        Self::validate_config(&config)
    }

    pub fn validate_config(config: &Config) -> Result<()> {
        if !config.rancher.url.is_empty() {
            url::Url::parse(&config.rancher.url)
                .with_context(|| format!("rancher.url is not a valid URL: {}", config.rancher.url))?;
        }
        if config.rancher.token_env.is_empty() {
            return Err(anyhow::anyhow!("rancher.tokenEnv must not be empty"));
        }
        if config.rancher.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("rancher.requestTimeoutSeconds must be positive"));
        }
        if config.install.watch_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("install.watchTimeoutSeconds must be positive"));
        }
        if config.install.fleet_namespace.is_empty() {
            return Err(anyhow::anyhow!("install.fleetNamespace must not be empty"));
        }
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(config: Config) -> Config {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    fn apply_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
        if let Some(url) = lookup("CATTLE_HARNESS_RANCHER_URL") {
            config.rancher.url = url;
        }

        if let Some(token_env) = lookup("CATTLE_HARNESS_TOKEN_ENV") {
            config.rancher.token_env = token_env;
        }

        if let Some(insecure) = lookup("CATTLE_HARNESS_INSECURE") {
            if let Ok(val) = insecure.parse::<bool>() {
                config.rancher.insecure = val;
            }
        }

        config
    }

    /// Save configuration to a file
    pub fn save(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)?;
        }

        let yaml =
            serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;

        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Save root configuration
    pub fn save_root(config: &Config) -> Result<()> {
        Self::save(config, &paths::root_config_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CATTLE_HARNESS_RANCHER_URL", "https://rancher.test"),
            ("CATTLE_HARNESS_INSECURE", "true"),
        ]);

        let config = ConfigLoader::apply_overrides(Config::default(), |key| {
            env.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.rancher.url, "https://rancher.test");
        assert!(config.rancher.insecure);
        assert_eq!(config.rancher.token_env, "RANCHER_TOKEN");
    }

    #[test]
    fn test_unparseable_bool_override_is_ignored() {
        let config = ConfigLoader::apply_overrides(Config::default(), |key| {
            (key == "CATTLE_HARNESS_INSECURE").then(|| "yes please".to_string())
        });
        assert!(!config.rancher.insecure);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        ConfigLoader::validate_config(&config).unwrap();

        config.rancher.url = "not a url".to_string();
        assert!(ConfigLoader::validate_config(&config).is_err());

        let mut config = Config::default();
        config.install.watch_timeout_seconds = 0;
        assert!(ConfigLoader::validate_config(&config).is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.rancher.url = "https://rancher.example.com".to_string();
        ConfigLoader::save(&config, &path).unwrap();

        let loaded = ConfigLoader::load_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(ConfigLoader::load_file(&tmp.path().join("nope.yaml")).is_err());
    }
}
