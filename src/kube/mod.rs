//! Kubernetes client bootstrap
//!
//! Loads kubeconfig the standard way (in-cluster, `KUBECONFIG`,
//! `~/.kube/config`), optionally pinned to a named context.

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

/// Build a client, using `context` instead of the current context when given
pub async fn create_client(context: Option<&str>) -> Result<Client> {
    let config = match context {
        Some(name) => {
            let options = KubeConfigOptions {
                context: Some(name.to_string()),
                ..Default::default()
            };
            Config::from_kubeconfig(&options)
                .await
                .with_context(|| format!("Failed to load kubeconfig context '{}'", name))?
        }
        None => Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?,
    };

    tracing::debug!("Connecting to Kubernetes API at {}", config.cluster_url);
    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Name of the kubeconfig context that will be used
pub fn current_context(context: Option<&str>) -> Option<String> {
    if let Some(name) = context {
        return Some(name.to_string());
    }
    Kubeconfig::read().ok().and_then(|kc| kc.current_context)
}
