//! Configuration for cattle-harness
//!
//! A single YAML file with environment variable overrides. See `schema.rs`
//! for the layout.

pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{Config, InstallConfig, KubeConfig, RancherConfig};

use crate::charts::InstallerOptions;

impl From<&InstallConfig> for InstallerOptions {
    fn from(install: &InstallConfig) -> Self {
        Self {
            fleet_namespace: install.fleet_namespace.clone(),
            local_cluster: install.local_cluster.clone(),
            system_project: install.system_project.clone(),
            watch_timeout_seconds: install.watch_timeout_seconds,
        }
    }
}

/// Every key accepted by `get_config_value` / `set_config_value`
pub const CONFIG_KEYS: &[&str] = &[
    "rancher.url",
    "rancher.tokenEnv",
    "rancher.insecure",
    "rancher.requestTimeoutSeconds",
    "install.fleetNamespace",
    "install.localCluster",
    "install.systemProject",
    "install.watchTimeoutSeconds",
    "kube.context",
];

/// Get a configuration value by key (dot notation)
pub fn get_config_value(config: &Config, key: &str) -> anyhow::Result<String> {
    match key {
        "rancher.url" => Ok(config.rancher.url.clone()),
        "rancher.tokenEnv" => Ok(config.rancher.token_env.clone()),
        "rancher.insecure" => Ok(config.rancher.insecure.to_string()),
        "rancher.requestTimeoutSeconds" => Ok(config.rancher.request_timeout_seconds.to_string()),
        "install.fleetNamespace" => Ok(config.install.fleet_namespace.clone()),
        "install.localCluster" => Ok(config.install.local_cluster.clone()),
        "install.systemProject" => Ok(config.install.system_project.clone()),
        "install.watchTimeoutSeconds" => Ok(config.install.watch_timeout_seconds.to_string()),
        "kube.context" => Ok(config.kube.context.clone().unwrap_or_default()),
        _ => Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }
}

/// Set a configuration value by key (dot notation)
pub fn set_config_value(config: &mut Config, key: &str, value: &str) -> anyhow::Result<()> {
    use anyhow::Context;
    match key {
        "rancher.url" => {
            config.rancher.url = value.to_string();
        }
        "rancher.tokenEnv" => {
            config.rancher.token_env = value.to_string();
        }
        "rancher.insecure" => {
            config.rancher.insecure = value
                .parse()
                .context("rancher.insecure must be 'true' or 'false'")?;
        }
        "rancher.requestTimeoutSeconds" => {
            config.rancher.request_timeout_seconds = value
                .parse()
                .context("rancher.requestTimeoutSeconds must be a number")?;
        }
        "install.fleetNamespace" => {
            config.install.fleet_namespace = value.to_string();
        }
        "install.localCluster" => {
            config.install.local_cluster = value.to_string();
        }
        "install.systemProject" => {
            config.install.system_project = value.to_string();
        }
        "install.watchTimeoutSeconds" => {
            config.install.watch_timeout_seconds = value
                .parse()
                .context("install.watchTimeoutSeconds must be a number")?;
        }
        "kube.context" => {
            config.kube.context = (!value.is_empty()).then(|| value.to_string());
        }
        _ => return Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }

    Ok(())
}
