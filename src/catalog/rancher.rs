//! Rancher HTTP client
//!
//! Talks to the Steve catalog API (`/v1/catalog.cattle.io.*`) and the v3
//! management API (`/v3/settings`, `/v3/projects`) with a bearer token.

use super::{
    CatalogClient, ChartInstallAction, ChartUninstallAction, Project, Setting,
    latest_version_from_index,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

const CLUSTER_REPOS: &str = "v1/catalog.cattle.io.clusterrepos";
const APPS: &str = "v1/catalog.cattle.io.apps";

/// Rancher API client
pub struct RancherClient {
    client: reqwest::Client,
    base: Url,
    token: String,
}

impl RancherClient {
    /// Create a client for the Rancher server at `base`
    ///
    /// `insecure` accepts self-signed certificates, which test environments
    /// commonly use.
    pub fn new(base: &str, token: String, insecure: bool, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base)
            .map_err(|e| Error::Handler(format!("Invalid Rancher URL {}: {}", base, e)))?;
        // Joining relative paths requires a trailing slash on the base
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure)
            .build()?;

        tracing::debug!("Created Rancher client for: {}", base);

        Ok(Self {
            client,
            base,
            token,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::Handler(format!("Invalid API path {}: {}", path, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        tracing::debug!("GET {}", url);
        let resp = self
            .client
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await?;
        let resp = check_status(resp, &url).await?;
        Ok(resp.json().await?)
    }

    async fn post_json<B: serde::Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<()> {
        tracing::debug!("POST {}", url);
        let resp = self
            .client
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        check_status(resp, &url).await?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response, url: &Url) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::ApiStatus {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

/// Map a 404 from the API onto a typed lookup error
fn not_found_as(err: Error, lookup: Error) -> Error {
    if err.is_not_found() { lookup } else { err }
}

#[async_trait]
impl CatalogClient for RancherClient {
    async fn latest_chart_version(&self, chart: &str, repo: &str) -> Result<String> {
        let mut url = self.url(&format!("{}/{}", CLUSTER_REPOS, repo))?;
        url.query_pairs_mut().append_pair("link", "index");

        let not_found = || Error::ChartNotFound {
            chart: chart.to_string(),
            repo: repo.to_string(),
        };
        let index: Value = self
            .get_json(url)
            .await
            .map_err(|e| not_found_as(e, not_found()))?;

        latest_version_from_index(&index, chart).ok_or_else(not_found)
    }

    async fn chart_values(
        &self,
        repo: &str,
        chart: &str,
        version: &str,
    ) -> Result<Map<String, Value>> {
        let mut url = self.url(&format!("{}/{}", CLUSTER_REPOS, repo))?;
        url.query_pairs_mut()
            .append_pair("link", "info")
            .append_pair("chartName", chart)
            .append_pair("version", version);

        let info: Value = self.get_json(url).await.map_err(|e| {
            not_found_as(
                e,
                Error::ChartNotFound {
                    chart: format!("{}@{}", chart, version),
                    repo: repo.to_string(),
                },
            )
        })?;

        match info.get("values") {
            Some(Value::Object(values)) => Ok(values.clone()),
            None | Some(Value::Null) => Ok(Map::new()),
            Some(other) => Err(Error::InvalidChartValues(format!(
                "expected an object for {} values, got {}",
                chart, other
            ))),
        }
    }

    async fn install_chart(&self, action: &ChartInstallAction, repo: &str) -> Result<()> {
        let mut url = self.url(&format!("{}/{}", CLUSTER_REPOS, repo))?;
        url.query_pairs_mut().append_pair("action", "install");
        self.post_json(url, action).await?;

        let names: Vec<&str> = action.charts.iter().map(|c| c.chart_name.as_str()).collect();
        tracing::info!(
            "Submitted install of {:?} from {} into {}",
            names,
            repo,
            action.namespace
        );
        Ok(())
    }

    async fn uninstall_chart(
        &self,
        name: &str,
        namespace: &str,
        action: &ChartUninstallAction,
    ) -> Result<()> {
        let mut url = self.url(&format!("{}/{}/{}", APPS, namespace, name))?;
        url.query_pairs_mut().append_pair("action", "uninstall");
        self.post_json(url, action).await?;

        tracing::info!("Submitted uninstall of {}/{}", namespace, name);
        Ok(())
    }

    async fn setting(&self, id: &str) -> Result<Setting> {
        let url = self.url(&format!("v3/settings/{}", id))?;
        self.get_json(url)
            .await
            .map_err(|e| not_found_as(e, Error::SettingNotFound(id.to_string())))
    }

    async fn project_by_name(&self, cluster_id: &str, name: &str) -> Result<Project> {
        let mut url = self.url("v3/projects")?;
        url.query_pairs_mut()
            .append_pair("clusterId", cluster_id)
            .append_pair("name", name);

        let collection: Value = self.get_json(url).await?;
        collection
            .get("data")
            .and_then(|d| d.as_array())
            .into_iter()
            .flatten()
            .filter_map(|p| serde_json::from_value::<Project>(p.clone()).ok())
            .find(|p| p.name == name && (p.cluster_id.is_empty() || p.cluster_id == cluster_id))
            .ok_or_else(|| Error::ProjectNotFound {
                cluster: cluster_id.to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = RancherClient::new(
            "https://rancher.example.com/prefix",
            "token".to_string(),
            false,
            Duration::from_secs(5),
        )
        .unwrap();

        let url = client.url("v3/settings/server-url").unwrap();
        assert_eq!(
            url.as_str(),
            "https://rancher.example.com/prefix/v3/settings/server-url"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(
            RancherClient::new(
                "not a url",
                "token".to_string(),
                false,
                Duration::from_secs(5)
            )
            .is_err()
        );
    }

    #[test]
    fn test_not_found_mapping() {
        let err = not_found_as(
            Error::ApiStatus {
                status: 404,
                url: "https://rancher/v3/settings/x".into(),
                body: String::new(),
            },
            Error::SettingNotFound("x".into()),
        );
        assert!(matches!(err, Error::SettingNotFound(_)));

        let err = not_found_as(
            Error::ApiStatus {
                status: 500,
                url: "https://rancher/v3/settings/x".into(),
                body: String::new(),
            },
            Error::SettingNotFound("x".into()),
        );
        assert!(matches!(err, Error::ApiStatus { status: 500, .. }));
    }
}
