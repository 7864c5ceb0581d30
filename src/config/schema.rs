//! Configuration schema
//!
//! YAML layout of `config.yaml`. Every field has a default so a partial file
//! (or none at all) is valid.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub rancher: RancherConfig,

    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub kube: KubeConfig,
}

/// Rancher API access
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RancherConfig {
    /// Base URL of the Rancher server, e.g. `https://rancher.example.com`
    #[serde(default)]
    pub url: String,

    /// Environment variable holding the API bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Accept self-signed certificates
    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

/// Where template charts are installed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstallConfig {
    #[serde(default = "default_fleet_namespace")]
    pub fleet_namespace: String,

    #[serde(default = "default_local_cluster")]
    pub local_cluster: String,

    #[serde(default = "default_system_project")]
    pub system_project: String,

    /// Bound on waiting for an uninstalled App to disappear
    #[serde(default = "default_watch_timeout")]
    pub watch_timeout_seconds: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeConfig {
    /// Kubeconfig context; the current context when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn default_token_env() -> String {
    "RANCHER_TOKEN".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_fleet_namespace() -> String {
    crate::charts::FLEET_NAMESPACE.to_string()
}

fn default_local_cluster() -> String {
    crate::charts::LOCAL_CLUSTER.to_string()
}

fn default_system_project() -> String {
    crate::charts::SYSTEM_PROJECT.to_string()
}

fn default_watch_timeout() -> u32 {
    crate::charts::WATCH_TIMEOUT_SECONDS
}

impl Default for RancherConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token_env: default_token_env(),
            insecure: false,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            fleet_namespace: default_fleet_namespace(),
            local_cluster: default_local_cluster(),
            system_project: default_system_project(),
            watch_timeout_seconds: default_watch_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.rancher.token_env, "RANCHER_TOKEN");
        assert_eq!(config.install.fleet_namespace, "fleet-default");
        assert_eq!(config.install.system_project, "System");
        assert_eq!(config.install.watch_timeout_seconds, 300);
        assert!(config.kube.context.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(yaml.contains("tokenEnv"));
        assert!(yaml.contains("fleetNamespace"));
        assert!(yaml.contains("watchTimeoutSeconds"));
    }

    #[test]
    fn test_partial_config_deserialization() {
        let yaml = r#"
rancher:
  url: https://rancher.example.com
  insecure: true
install:
  fleetNamespace: fleet-local
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.rancher.url, "https://rancher.example.com");
        assert!(config.rancher.insecure);
        assert_eq!(config.rancher.request_timeout_seconds, 30);
        assert_eq!(config.install.fleet_namespace, "fleet-local");
        assert_eq!(config.install.local_cluster, "local");
    }
}
