//! Wire types for the Rancher catalog and management APIs
//!
//! Field names follow the JSON accepted by the Steve catalog actions
//! (`?action=install`, `?action=uninstall`) and the v3 management API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Identifies the cluster a chart is installed into
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterMeta {
    pub id: String,
    pub name: String,
}

/// Resolved install context for a chart
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallOptions {
    pub cluster: ClusterMeta,
    pub version: String,
    pub project_id: String,
}

/// Everything needed to build a `ChartInstallAction` besides the chart values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadOpts {
    pub install_options: InstallOptions,
    pub name: String,
    pub namespace: String,
    /// Rancher server URL (`server-url` setting)
    pub host: String,
    /// `system-default-registry` setting, empty when unset
    pub default_registry: String,
}

/// A single chart entry of an install action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInstall {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub chart_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub values: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Body of `POST /v1/catalog.cattle.io.clusterrepos/{repo}?action=install`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInstallAction {
    pub no_hooks: bool,
    /// Helm timeout as a Go duration string, e.g. "600s"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    pub wait: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
    #[serde(rename = "disableOpenAPIValidation")]
    pub disable_open_api_validation: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<ChartInstall>,
}

/// Body of `POST /v1/catalog.cattle.io.apps/{namespace}/{name}?action=uninstall`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartUninstallAction {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_hooks: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub keep_history: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A v3 management setting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub id: String,
    #[serde(default)]
    pub value: String,
}

/// A v3 management project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Fully qualified id, `<cluster>:<project>`
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cluster_id: String,
}

/// `status.summary` of a `catalog.cattle.io/v1` App
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSummary {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub transitioning: bool,
    #[serde(default)]
    pub error: bool,
}

impl AppSummary {
    pub const DEPLOYED: &'static str = "deployed";
    pub const FAILED: &'static str = "failed";

    /// Read the summary from an App object's JSON, if present
    pub fn from_app(app: &Value) -> Option<Self> {
        app.get("status")
            .and_then(|s| s.get("summary"))
            .and_then(|s| serde_json::from_value(s.clone()).ok())
    }

    pub fn is_deployed(&self) -> bool {
        self.state == Self::DEPLOYED
    }

    pub fn is_failed(&self) -> bool {
        self.error || self.state == Self::FAILED
    }
}
