//! Template install flow against in-memory Rancher and App fakes

use async_trait::async_trait;
use cattle_harness::catalog::{
    AppWatcher, CatalogClient, ChartInstallAction, ChartUninstallAction, Project, Setting,
};
use cattle_harness::charts::{InstallerOptions, TemplateChartRequest, TemplateInstaller};
use cattle_harness::{Error, Result, Session};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Records every call in order; installs are kept for inspection
#[derive(Default)]
struct FakeRancher {
    calls: Mutex<Vec<String>>,
    installs: Mutex<Vec<ChartInstallAction>>,
    values: Map<String, Value>,
    missing_setting: Option<&'static str>,
}

impl FakeRancher {
    fn with_values(values: Value) -> Self {
        Self {
            values: values.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CatalogClient for FakeRancher {
    async fn latest_chart_version(&self, chart: &str, repo: &str) -> Result<String> {
        self.record(format!("latest {} {}", repo, chart));
        Ok("1.4.0".to_string())
    }

    async fn chart_values(&self, repo: &str, chart: &str, version: &str) -> Result<Map<String, Value>> {
        self.record(format!("values {} {} {}", repo, chart, version));
        Ok(self.values.clone())
    }

    async fn install_chart(&self, action: &ChartInstallAction, repo: &str) -> Result<()> {
        self.record(format!("install {}", repo));
        self.installs.lock().unwrap().push(action.clone());
        Ok(())
    }

    async fn uninstall_chart(
        &self,
        name: &str,
        namespace: &str,
        _action: &ChartUninstallAction,
    ) -> Result<()> {
        self.record(format!("uninstall {}/{}", namespace, name));
        Ok(())
    }

    async fn setting(&self, id: &str) -> Result<Setting> {
        self.record(format!("setting {}", id));
        if self.missing_setting == Some(id) {
            return Err(Error::SettingNotFound(id.to_string()));
        }
        Ok(Setting {
            id: id.to_string(),
            value: format!("{}-value", id),
        })
    }

    async fn project_by_name(&self, cluster_id: &str, name: &str) -> Result<Project> {
        self.record(format!("project {} {}", cluster_id, name));
        Ok(Project {
            id: format!("{}:p-0001", cluster_id),
            name: name.to_string(),
            cluster_id: cluster_id.to_string(),
        })
    }
}

#[derive(Default)]
struct FakeApps {
    calls: Mutex<Vec<String>>,
    fail_verify: bool,
}

#[async_trait]
impl AppWatcher for FakeApps {
    async fn wait_for_deletion(&self, namespace: &str, name: &str, timeout_secs: u32) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("deleted {}/{} within {}", namespace, name, timeout_secs));
        Ok(())
    }

    async fn verify_chart_install(&self, namespace: &str, name: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("verify {}/{}", namespace, name));
        if self.fail_verify {
            return Err(Error::InstallFailed {
                namespace: namespace.to_string(),
                name: name.to_string(),
                message: "hook failed".to_string(),
            });
        }
        Ok(())
    }
}

fn request() -> TemplateChartRequest {
    TemplateChartRequest {
        repo_name: "cluster-templates".to_string(),
        template_name: "aws-rke2".to_string(),
        cluster_name: "ci-cluster".to_string(),
        k8s_version: "v1.31.4+rke2r1".to_string(),
        credential_id: "cattle-global-data:cc-x7k2p".to_string(),
    }
}

fn node_pool_values() -> Value {
    json!({
        "cluster": {"annotations": {}},
        "nodepools": [
            {"quantity": 1, "etcd": true},
            {"quantity": 1, "controlplane": true},
            {"quantity": 3, "worker": true}
        ]
    })
}

#[tokio::test]
async fn test_install_records_credential_version_and_pool_names() {
    let rancher = Arc::new(FakeRancher::with_values(node_pool_values()));
    let apps = Arc::new(FakeApps::default());
    let installer = TemplateInstaller::new(rancher.clone(), apps.clone());
    let mut session = Session::new();

    installer
        .install_template_chart(&mut session, &request())
        .await
        .unwrap();

    let installs = rancher.installs.lock().unwrap();
    assert_eq!(installs.len(), 1);
    let action = &installs[0];
    assert_eq!(action.namespace, "fleet-default");
    assert_eq!(action.project_id, "local:p-0001");

    let chart = &action.charts[0];
    assert_eq!(chart.version, "1.4.0");
    assert_eq!(chart.values["cloudCredentialSecretName"], "cattle-global-data:cc-x7k2p");
    assert_eq!(chart.values["kubernetesVersion"], "v1.31.4+rke2r1");
    assert_eq!(chart.values["cluster"]["name"], "ci-cluster");
    assert_eq!(chart.values["global"]["cattle"]["url"], "server-url-value");

    let names: Vec<&str> = chart.values["nodepools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|n| n.starts_with("nodepool-") && n.len() > "nodepool-".len()));
    assert_eq!(names.iter().collect::<HashSet<_>>().len(), 3);

    assert_eq!(session.len(), 1);
    assert_eq!(
        *apps.calls.lock().unwrap(),
        vec!["verify fleet-default/aws-rke2".to_string()]
    );
}

#[tokio::test]
async fn test_lookups_precede_install() {
    let rancher = Arc::new(FakeRancher::with_values(node_pool_values()));
    let installer = TemplateInstaller::new(rancher.clone(), Arc::new(FakeApps::default()));
    let mut session = Session::new();

    installer
        .install_template_chart(&mut session, &request())
        .await
        .unwrap();

    let calls = rancher.calls();
    let install_at = calls.iter().position(|c| c.starts_with("install")).unwrap();
    assert_eq!(install_at, calls.len() - 1);
    assert_eq!(calls[0], "latest cluster-templates aws-rke2");
    assert!(calls.contains(&"project local System".to_string()));
    assert!(calls.contains(&"values cluster-templates aws-rke2 1.4.0".to_string()));
}

#[tokio::test]
async fn test_cleanup_uninstalls_then_waits_for_deletion() {
    let rancher = Arc::new(FakeRancher::with_values(node_pool_values()));
    let apps = Arc::new(FakeApps::default());
    let options = InstallerOptions {
        watch_timeout_seconds: 42,
        ..Default::default()
    };
    let installer = TemplateInstaller::with_options(rancher.clone(), apps.clone(), options);
    let mut session = Session::new();

    installer
        .install_template_chart(&mut session, &request())
        .await
        .unwrap();
    session.cleanup().await.unwrap();

    assert_eq!(rancher.calls().last().unwrap(), "uninstall fleet-default/aws-rke2");
    assert_eq!(
        apps.calls.lock().unwrap().last().unwrap(),
        "deleted fleet-default/aws-rke2 within 42"
    );
    assert!(session.is_empty());
}

#[tokio::test]
async fn test_missing_setting_installs_nothing() {
    let rancher = Arc::new(FakeRancher {
        missing_setting: Some("system-default-registry"),
        ..FakeRancher::with_values(node_pool_values())
    });
    let installer = TemplateInstaller::new(rancher.clone(), Arc::new(FakeApps::default()));
    let mut session = Session::new();

    let err = installer
        .install_template_chart(&mut session, &request())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(rancher.installs.lock().unwrap().is_empty());
    assert!(session.is_empty());
}

#[tokio::test]
async fn test_failed_verification_keeps_cleanup() {
    let rancher = Arc::new(FakeRancher::with_values(node_pool_values()));
    let apps = Arc::new(FakeApps {
        fail_verify: true,
        ..Default::default()
    });
    let installer = TemplateInstaller::new(rancher.clone(), apps);
    let mut session = Session::new();

    let err = installer
        .install_template_chart(&mut session, &request())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InstallFailed { ref message, .. } if message == "hook failed"));
    assert_eq!(session.len(), 1);
    session.cleanup().await.unwrap();
    assert!(rancher.calls().contains(&"uninstall fleet-default/aws-rke2".to_string()));
}
