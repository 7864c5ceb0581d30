//! Chart install payloads and the cluster-template install helper
//!
//! Builders here produce the JSON payloads accepted by the Rancher catalog
//! install/uninstall actions. `template.rs` sequences the lookups, the install,
//! cleanup registration and the readiness check.

pub mod namegen;
mod template;

pub use template::{
    FLEET_NAMESPACE, InstallerOptions, LOCAL_CLUSTER, SYSTEM_PROJECT, TemplateChartRequest,
    TemplateInstaller, WATCH_TIMEOUT_SECONDS, template_install_action,
};

use crate::catalog::{ChartInstall, ChartInstallAction, ChartUninstallAction};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Helm timeout used for install actions
pub const CHART_INSTALL_TIMEOUT: &str = "600s";

/// Setting holding the public Rancher URL
pub const SERVER_URL_SETTING_ID: &str = "server-url";
/// Setting holding the registry prefix for system images
pub const DEFAULT_REGISTRY_SETTING_ID: &str = "system-default-registry";

/// Build a single chart entry
///
/// Values start with the `global.cattle` block Rancher charts expect, then the
/// chart-specific values are laid over it key by key.
#[allow(clippy::too_many_arguments)]
pub fn new_chart_install(
    name: &str,
    version: &str,
    cluster_id: &str,
    cluster_name: &str,
    url: &str,
    repo_name: &str,
    project_id: &str,
    default_registry: &str,
    chart_values: Map<String, Value>,
) -> ChartInstall {
    let system_project_id = project_id
        .strip_prefix(&format!("{}:", cluster_id))
        .unwrap_or(project_id);

    let mut values = Map::new();
    values.insert(
        "global".to_string(),
        json!({
            "cattle": {
                "clusterId": cluster_id,
                "clusterName": cluster_name,
                "rkePathPrefix": "",
                "rkeWindowsPathPrefix": "",
                "systemDefaultRegistry": default_registry,
                "url": url,
                "systemProjectId": system_project_id,
            },
            "systemDefaultRegistry": default_registry,
        }),
    );
    values.extend(chart_values);

    let annotations = BTreeMap::from([
        (
            "catalog.cattle.io/ui-source-repo".to_string(),
            repo_name.to_string(),
        ),
        (
            "catalog.cattle.io/ui-source-repo-type".to_string(),
            "cluster".to_string(),
        ),
    ]);

    ChartInstall {
        chart_name: name.to_string(),
        version: version.to_string(),
        release_name: name.to_string(),
        description: String::new(),
        values,
        annotations,
    }
}

/// Wrap chart entries into an install action
pub fn new_chart_install_action(
    namespace: &str,
    project_id: &str,
    charts: Vec<ChartInstall>,
) -> ChartInstallAction {
    ChartInstallAction {
        no_hooks: false,
        timeout: Some(CHART_INSTALL_TIMEOUT.to_string()),
        wait: true,
        namespace: namespace.to_string(),
        project_id: project_id.to_string(),
        disable_open_api_validation: false,
        charts,
    }
}

/// Uninstall action with Helm defaults
pub fn new_chart_uninstall_action() -> ChartUninstallAction {
    ChartUninstallAction::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chart_install_global_block() {
        let install = new_chart_install(
            "rke2-template",
            "0.2.0",
            "local",
            "local",
            "https://rancher.example.com",
            "templates",
            "local:p-xyz12",
            "registry.example.com",
            Map::new(),
        );

        assert_eq!(install.chart_name, "rke2-template");
        assert_eq!(install.release_name, "rke2-template");
        assert_eq!(install.version, "0.2.0");

        let cattle = &install.values["global"]["cattle"];
        assert_eq!(cattle["clusterId"], "local");
        assert_eq!(cattle["url"], "https://rancher.example.com");
        assert_eq!(cattle["systemProjectId"], "p-xyz12");
        assert_eq!(cattle["systemDefaultRegistry"], "registry.example.com");
        assert_eq!(
            install.values["global"]["systemDefaultRegistry"],
            "registry.example.com"
        );
        assert_eq!(
            install.annotations["catalog.cattle.io/ui-source-repo"],
            "templates"
        );
        assert_eq!(
            install.annotations["catalog.cattle.io/ui-source-repo-type"],
            "cluster"
        );
    }

    #[test]
    fn test_chart_values_override_global() {
        let mut chart_values = Map::new();
        chart_values.insert("global".to_string(), json!({"custom": true}));
        chart_values.insert("replicas".to_string(), json!(3));

        let install = new_chart_install(
            "chart", "1.0.0", "local", "local", "", "repo", "local:p-1", "", chart_values,
        );

        assert_eq!(install.values["global"], json!({"custom": true}));
        assert_eq!(install.values["replicas"], json!(3));
    }

    #[test]
    fn test_new_chart_install_action_defaults() {
        let action = new_chart_install_action("fleet-default", "local:p-1", Vec::new());
        assert!(action.wait);
        assert!(!action.no_hooks);
        assert_eq!(action.timeout.as_deref(), Some("600s"));
        assert_eq!(action.namespace, "fleet-default");
        assert_eq!(action.project_id, "local:p-1");
    }
}
