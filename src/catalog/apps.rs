//! Catalog App watching over the Kubernetes API

use super::{AppSummary, AppWatcher};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client};
use std::time::Duration;

/// Upper bound for waiting on an App to finish installing
pub const INSTALL_TIMEOUT_SECONDS: u64 = 600;

/// Server-side watch timeout; kube-rs rejects 295s and above
const MAX_WATCH_TIMEOUT_SECONDS: u32 = 290;

fn app_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("catalog.cattle.io", "v1", "App"))
}

/// Watches `catalog.cattle.io/v1` Apps with a kube-rs client
#[derive(Clone)]
pub struct KubeAppWatcher {
    client: Client,
}

impl KubeAppWatcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &app_resource())
    }
}

/// Watch config scoped to a single App by name
///
/// The overall wait is bounded by the caller; the server-side timeout only
/// controls how often the watch is renewed.
fn watch_config(name: &str, timeout_secs: u32) -> watcher::Config {
    watcher::Config::default()
        .fields(&format!("metadata.name={}", name))
        .timeout(timeout_secs.clamp(1, MAX_WATCH_TIMEOUT_SECONDS))
}

#[async_trait]
impl AppWatcher for KubeAppWatcher {
    async fn wait_for_deletion(
        &self,
        namespace: &str,
        name: &str,
        timeout_secs: u32,
    ) -> Result<()> {
        let api = self.api(namespace);

        if api.get_opt(name).await?.is_none() {
            tracing::debug!("App {}/{} already gone", namespace, name);
            return Ok(());
        }

        let what = format!("deletion of App {}/{}", namespace, name);
        let mut stream = Box::pin(watcher(api, watch_config(name, timeout_secs)).default_backoff());

        let wait = async {
            while let Some(event) = stream.next().await {
                match event {
                    Ok(watcher::Event::Delete(obj)) if obj.metadata.name.as_deref() == Some(name) => {
                        return Ok(());
                    }
                    // A relist that no longer contains the App also means it is gone
                    Ok(watcher::Event::InitDone) => {
                        if self.api(namespace).get_opt(name).await?.is_none() {
                            return Ok(());
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!("Watch error while waiting for {}: {}", what, e);
                    }
                }
            }
            Err::<(), Error>(Error::WatchEnded(what.clone()))
        };

        match tokio::time::timeout(Duration::from_secs(u64::from(timeout_secs)), wait).await {
            Ok(result) => {
                if result.is_ok() {
                    tracing::info!("App {}/{} deleted", namespace, name);
                }
                result
            }
            Err(_) => Err(Error::Timeout {
                seconds: u64::from(timeout_secs),
                what,
            }),
        }
    }

    async fn verify_chart_install(&self, namespace: &str, name: &str) -> Result<()> {
        let api = self.api(namespace);
        let what = format!("install of App {}/{}", namespace, name);
        let timeout_secs = INSTALL_TIMEOUT_SECONDS as u32;
        let mut stream = Box::pin(watcher(api, watch_config(name, timeout_secs)).default_backoff());

        let wait = async {
            while let Some(event) = stream.next().await {
                let obj = match event {
                    Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::InitApply(obj)) => obj,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!("Watch error while waiting for {}: {}", what, e);
                        continue;
                    }
                };

                if obj.metadata.name.as_deref() != Some(name) {
                    continue;
                }

                let app = serde_json::to_value(&obj)?;
                let Some(summary) = AppSummary::from_app(&app) else {
                    continue;
                };
                tracing::debug!("App {}/{} state: {}", namespace, name, summary.state);

                if summary.is_deployed() {
                    return Ok(());
                }
                if summary.is_failed() {
                    return Err(Error::InstallFailed {
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                        message: summary.state,
                    });
                }
            }
            Err::<(), Error>(Error::WatchEnded(what.clone()))
        };

        match tokio::time::timeout(Duration::from_secs(INSTALL_TIMEOUT_SECONDS), wait).await {
            Ok(result) => {
                if result.is_ok() {
                    tracing::info!("App {}/{} deployed", namespace, name);
                }
                result
            }
            Err(_) => Err(Error::Timeout {
                seconds: INSTALL_TIMEOUT_SECONDS,
                what,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response};
    use kube::client::Body;
    use serde_json::{Value, json};
    use tokio::task::JoinHandle;

    type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

    fn mock_watcher() -> (KubeAppWatcher, ApiServerHandle) {
        let (svc, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        (KubeAppWatcher::new(Client::new(svc, "default")), handle)
    }

    fn app(state: &str) -> Value {
        json!({
            "apiVersion": "catalog.cattle.io/v1",
            "kind": "App",
            "metadata": {
                "name": "rke2-template",
                "namespace": "fleet-default",
                "resourceVersion": "11"
            },
            "status": {"summary": {"state": state, "transitioning": false, "error": false}}
        })
    }

    fn app_list(items: Vec<Value>) -> Value {
        json!({
            "apiVersion": "catalog.cattle.io/v1",
            "kind": "AppList",
            "metadata": {"resourceVersion": "10"},
            "items": items
        })
    }

    fn watch_line(kind: &str, object: Value) -> Vec<u8> {
        let mut line = serde_json::to_vec(&json!({"type": kind, "object": object})).unwrap();
        line.push(b'\n');
        line
    }

    /// Answer requests in order and return their URIs
    fn serve(mut handle: ApiServerHandle, replies: Vec<Vec<u8>>) -> JoinHandle<Vec<String>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for reply in replies {
                let (req, send) = handle.next_request().await.expect("service not called");
                seen.push(req.uri().to_string());
                send.send_response(Response::builder().body(Body::from(reply)).unwrap());
            }
            seen
        })
    }

    async fn finished(server: JoinHandle<Vec<String>>) -> Vec<String> {
        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("timeout on mock apiserver")
            .unwrap()
    }

    #[tokio::test]
    async fn test_verify_returns_once_watch_reports_deployed() {
        let (apps, handle) = mock_watcher();
        let server = serve(
            handle,
            vec![
                serde_json::to_vec(&app_list(vec![app("pending-install")])).unwrap(),
                watch_line("MODIFIED", app("deployed")),
            ],
        );

        apps.verify_chart_install("fleet-default", "rke2-template")
            .await
            .unwrap();

        let seen = finished(server).await;
        assert!(seen[0].contains("/apis/catalog.cattle.io/v1/namespaces/fleet-default/apps?"));
        assert!(seen[1].contains("watch=true"));
        assert!(seen[1].contains(&format!("timeoutSeconds={}", MAX_WATCH_TIMEOUT_SECONDS)));
    }

    #[tokio::test]
    async fn test_verify_fails_on_failed_app() {
        let (apps, handle) = mock_watcher();
        let server = serve(
            handle,
            vec![serde_json::to_vec(&app_list(vec![app("failed")])).unwrap()],
        );

        let err = apps
            .verify_chart_install("fleet-default", "rke2-template")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InstallFailed { ref message, .. } if message == "failed"));
        finished(server).await;
    }

    #[tokio::test]
    async fn test_wait_for_deletion_follows_delete_event() {
        let (apps, handle) = mock_watcher();
        let server = serve(
            handle,
            vec![
                serde_json::to_vec(&app("uninstalling")).unwrap(),
                serde_json::to_vec(&app_list(vec![app("uninstalling")])).unwrap(),
                // still present when the initial list completes
                serde_json::to_vec(&app("uninstalling")).unwrap(),
                watch_line("DELETED", app("uninstalling")),
            ],
        );

        apps.wait_for_deletion("fleet-default", "rke2-template", 300)
            .await
            .unwrap();

        let seen = finished(server).await;
        assert!(seen[0].ends_with("/namespaces/fleet-default/apps/rke2-template"));
        assert!(seen[3].contains("watch=true"));
        assert!(seen[3].contains(&format!("timeoutSeconds={}", MAX_WATCH_TIMEOUT_SECONDS)));
    }

    #[test]
    fn test_app_resource() {
        let ar = app_resource();
        assert_eq!(ar.group, "catalog.cattle.io");
        assert_eq!(ar.version, "v1");
        assert_eq!(ar.kind, "App");
        assert_eq!(ar.plural, "apps");
        assert_eq!(ar.api_version, "catalog.cattle.io/v1");
    }

    #[test]
    fn test_watch_config_selects_by_name() {
        let config = watch_config("rke2-template", 120);
        assert_eq!(
            config.field_selector.as_deref(),
            Some("metadata.name=rke2-template")
        );
        assert_eq!(config.timeout, Some(120));
    }

    #[test]
    fn test_watch_config_clamps_server_timeout() {
        assert_eq!(watch_config("a", 300).timeout, Some(MAX_WATCH_TIMEOUT_SECONDS));
        assert_eq!(
            watch_config("a", INSTALL_TIMEOUT_SECONDS as u32).timeout,
            Some(MAX_WATCH_TIMEOUT_SECONDS)
        );
        assert_eq!(watch_config("a", 0).timeout, Some(1));
    }
}
