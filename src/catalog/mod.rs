//! Rancher catalog access
//!
//! Two seams are consumed by the chart helpers:
//! - `CatalogClient`: chart index, values, install/uninstall, settings and projects
//!   (Rancher HTTP APIs, see `rancher.rs`)
//! - `AppWatcher`: watches `catalog.cattle.io/v1` Apps in the target cluster
//!   (kube-rs, see `apps.rs`)
//!
//! Both are traits so test setups can substitute fakes.

mod apps;
mod rancher;
pub mod types;

pub use apps::KubeAppWatcher;
pub use rancher::RancherClient;
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Rancher chart catalog and management lookups
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Latest version of `chart` published in cluster repository `repo`
    async fn latest_chart_version(&self, chart: &str, repo: &str) -> Result<String>;

    /// Default values of a chart version
    async fn chart_values(
        &self,
        repo: &str,
        chart: &str,
        version: &str,
    ) -> Result<Map<String, Value>>;

    /// Submit an install action against cluster repository `repo`
    async fn install_chart(&self, action: &ChartInstallAction, repo: &str) -> Result<()>;

    /// Uninstall the App `name` in `namespace`
    async fn uninstall_chart(
        &self,
        name: &str,
        namespace: &str,
        action: &ChartUninstallAction,
    ) -> Result<()>;

    /// Read a management setting by id
    async fn setting(&self, id: &str) -> Result<Setting>;

    /// Find a project by display name within a cluster
    async fn project_by_name(&self, cluster_id: &str, name: &str) -> Result<Project>;
}

/// Watches catalog Apps in the cluster the chart was installed into
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AppWatcher: Send + Sync {
    /// Block until the App is gone, bounded by `timeout_secs`
    async fn wait_for_deletion(&self, namespace: &str, name: &str, timeout_secs: u32)
    -> Result<()>;

    /// Block until the App reports a successful install
    async fn verify_chart_install(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Pick the latest version from a repository index document
///
/// The index lists versions newest first under `entries.<chart>`; entries
/// without a version are skipped.
pub fn latest_version_from_index(index: &Value, chart: &str) -> Option<String> {
    index
        .get("entries")
        .and_then(|e| e.get(chart))
        .and_then(|versions| versions.as_array())
        .and_then(|versions| {
            versions
                .iter()
                .filter_map(|v| v.get("version").and_then(|v| v.as_str()))
                .find(|v| !v.is_empty())
                .map(str::to_string)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_latest_version_is_first_listed() {
        let index = json!({
            "apiVersion": "v1",
            "entries": {
                "rke2-template": [
                    {"version": "0.3.0"},
                    {"version": "0.2.1"},
                    {"version": "0.1.0"}
                ]
            }
        });
        assert_eq!(
            latest_version_from_index(&index, "rke2-template"),
            Some("0.3.0".to_string())
        );
    }

    #[test]
    fn test_latest_version_skips_entries_without_version() {
        let index = json!({
            "entries": {"rke2-template": [{"name": "rke2-template"}, {"version": "0.2.0"}]}
        });
        assert_eq!(
            latest_version_from_index(&index, "rke2-template"),
            Some("0.2.0".to_string())
        );
    }

    #[test]
    fn test_latest_version_missing_chart() {
        let index = json!({"entries": {"other": [{"version": "1.0.0"}]}});
        assert_eq!(latest_version_from_index(&index, "rke2-template"), None);
        assert_eq!(latest_version_from_index(&json!({}), "rke2-template"), None);
    }
}
