//! Cluster-template chart installation for end-to-end test setup

use super::namegen::append_random_string;
use super::{
    DEFAULT_REGISTRY_SETTING_ID, SERVER_URL_SETTING_ID, new_chart_install,
    new_chart_install_action, new_chart_uninstall_action,
};
use crate::catalog::{
    AppWatcher, CatalogClient, ChartInstallAction, ClusterMeta, InstallOptions, PayloadOpts,
};
use crate::error::{Error, Result};
use crate::session::Session;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Namespace cluster templates are installed into
pub const FLEET_NAMESPACE: &str = "fleet-default";
/// Cluster the Rancher server itself runs in
pub const LOCAL_CLUSTER: &str = "local";
/// Project holding system workloads in the local cluster
pub const SYSTEM_PROJECT: &str = "System";
/// Upper bound for waiting on App deletion during cleanup
pub const WATCH_TIMEOUT_SECONDS: u32 = 300;

/// Inputs for a single template install
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateChartRequest {
    pub repo_name: String,
    pub template_name: String,
    /// Name given to the downstream cluster the template creates
    pub cluster_name: String,
    pub k8s_version: String,
    /// Cloud credential id, e.g. `cattle-global-data:cc-abcde`
    pub credential_id: String,
}

/// Where and how templates get installed
#[derive(Debug, Clone, PartialEq)]
pub struct InstallerOptions {
    pub fleet_namespace: String,
    pub local_cluster: String,
    pub system_project: String,
    pub watch_timeout_seconds: u32,
}

impl Default for InstallerOptions {
    fn default() -> Self {
        Self {
            fleet_namespace: FLEET_NAMESPACE.to_string(),
            local_cluster: LOCAL_CLUSTER.to_string(),
            system_project: SYSTEM_PROJECT.to_string(),
            watch_timeout_seconds: WATCH_TIMEOUT_SECONDS,
        }
    }
}

/// Installs cluster-template charts and registers their removal
pub struct TemplateInstaller {
    catalog: Arc<dyn CatalogClient>,
    apps: Arc<dyn AppWatcher>,
    options: InstallerOptions,
}

impl TemplateInstaller {
    pub fn new(catalog: Arc<dyn CatalogClient>, apps: Arc<dyn AppWatcher>) -> Self {
        Self::with_options(catalog, apps, InstallerOptions::default())
    }

    pub fn with_options(
        catalog: Arc<dyn CatalogClient>,
        apps: Arc<dyn AppWatcher>,
        options: InstallerOptions,
    ) -> Self {
        Self {
            catalog,
            apps,
            options,
        }
    }

    pub fn options(&self) -> &InstallerOptions {
        &self.options
    }

    /// Install the latest version of a template chart and wait for it
    ///
    /// All lookups happen before the install is submitted, so a missing chart,
    /// setting or project leaves the cluster untouched. Once the install is
    /// accepted an uninstall is registered on `session`, even if the App later
    /// fails to become ready.
    pub async fn install_template_chart(
        &self,
        session: &mut Session,
        request: &TemplateChartRequest,
    ) -> Result<()> {
        let repo = request.repo_name.as_str();
        let template = request.template_name.as_str();
        let namespace = self.options.fleet_namespace.clone();

        let latest_version = self.catalog.latest_chart_version(template, repo).await?;
        tracing::debug!("Latest version of {} in {}: {}", template, repo, latest_version);

        let project = self
            .catalog
            .project_by_name(&self.options.local_cluster, &self.options.system_project)
            .await?;

        let install_options = InstallOptions {
            // Only the id is known; the chart gets an empty clusterName
            cluster: ClusterMeta {
                id: self.options.local_cluster.clone(),
                name: String::new(),
            },
            version: latest_version,
            project_id: project.id,
        };

        let server_setting = self.catalog.setting(SERVER_URL_SETTING_ID).await?;
        let registry_setting = self.catalog.setting(DEFAULT_REGISTRY_SETTING_ID).await?;

        let payload = PayloadOpts {
            install_options,
            name: template.to_string(),
            namespace: namespace.clone(),
            host: server_setting.value,
            default_registry: registry_setting.value,
        };

        let chart_values = self
            .catalog
            .chart_values(repo, template, &payload.install_options.version)
            .await?;

        let action = template_install_action(
            &payload,
            repo,
            &request.cluster_name,
            &request.credential_id,
            &request.k8s_version,
            &namespace,
            chart_values,
        )?;

        self.catalog.install_chart(&action, repo).await?;
        tracing::info!(
            "Installed {} {} into {}",
            template,
            payload.install_options.version,
            namespace
        );

        let catalog = self.catalog.clone();
        let apps = self.apps.clone();
        let name = template.to_string();
        let timeout = self.options.watch_timeout_seconds;
        session.register_cleanup(format!("uninstall {}/{}", namespace, name), {
            let namespace = namespace.clone();
            move || async move {
                catalog
                    .uninstall_chart(&name, &namespace, &new_chart_uninstall_action())
                    .await?;
                apps.wait_for_deletion(&namespace, &name, timeout).await
            }
        });

        self.apps.verify_chart_install(&namespace, template).await
    }
}

/// Build the install payload for a cluster template
///
/// Sets the credential and Kubernetes version, names the downstream cluster,
/// and gives every node pool a fresh unique name.
pub fn template_install_action(
    payload: &PayloadOpts,
    repo_name: &str,
    cluster_name: &str,
    cloud_credential: &str,
    k8s_version: &str,
    namespace: &str,
    mut chart_values: Map<String, Value>,
) -> Result<ChartInstallAction> {
    chart_values.insert(
        "cloudCredentialSecretName".to_string(),
        Value::String(cloud_credential.to_string()),
    );
    chart_values.insert(
        "kubernetesVersion".to_string(),
        Value::String(k8s_version.to_string()),
    );

    match chart_values
        .entry("cluster")
        .or_insert_with(|| Value::Object(Map::new()))
    {
        Value::Object(cluster) => {
            cluster.insert("name".to_string(), Value::String(cluster_name.to_string()));
        }
        other => {
            return Err(Error::InvalidChartValues(format!(
                "cluster must be an object, got {}",
                other
            )));
        }
    }

    if let Some(nodepools) = chart_values.get_mut("nodepools") {
        name_nodepools(nodepools)?;
    }

    let options = &payload.install_options;
    let chart = new_chart_install(
        &payload.name,
        &options.version,
        &options.cluster.id,
        &options.cluster.name,
        &payload.host,
        repo_name,
        &options.project_id,
        &payload.default_registry,
        chart_values,
    );

    Ok(new_chart_install_action(
        namespace,
        &options.project_id,
        vec![chart],
    ))
}

/// Give each node pool entry a generated name, distinct within the template
fn name_nodepools(nodepools: &mut Value) -> Result<()> {
    let pools: Vec<&mut Value> = match nodepools {
        Value::Object(map) => map.values_mut().collect(),
        Value::Array(list) => list.iter_mut().collect(),
        Value::Null => return Ok(()),
        other => {
            return Err(Error::InvalidChartValues(format!(
                "nodepools must be an object or a list, got {}",
                other
            )));
        }
    };

    let mut used = HashSet::new();
    for pool in pools {
        let Value::Object(pool) = pool else {
            return Err(Error::InvalidChartValues(
                "nodepool entries must be objects".to_string(),
            ));
        };
        let name = loop {
            let candidate = append_random_string("nodepool");
            if used.insert(candidate.clone()) {
                break candidate;
            }
        };
        pool.insert("name".to_string(), Value::String(name));
    }
    Ok(())
}
