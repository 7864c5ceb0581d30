//! Status reconciliation adapter
//!
//! Handlers written as "object + status in, status out" are adapted onto a
//! plain change-notification loop. `StatusSync` persists status changes and
//! stamps a condition, `GeneratingHandler` applies dependent objects and
//! prunes them when the owner goes away.
//!
//! Handlers only depend on the narrow `StatusClient` and `Applier` traits, so
//! tests drive them with in-memory fakes and no cluster.

pub mod apply;
mod client;
pub mod condition;
mod generating;
mod seen;
mod status;

pub use apply::{Applier, ApplyScope, GeneratingHandlerOptions, KubeApplier, OwnerRef};
pub use client::{KubeStatusClient, StatusClient};
pub use condition::{Condition, ConditionType, Conditioned};
pub use generating::{GenerateFn, GeneratingHandler, Generator, register_generating_handler};
pub use seen::SeenVersions;
pub use status::{StatusFn, StatusHandler, StatusSync, register_status_handler};

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use kube::runtime::watcher;
use kube::{Api, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A resource with a typed, conditioned status
pub trait StatusObject:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: Clone + PartialEq + Default + Debug + Conditioned + Send + Sync + 'static;

    fn status(&self) -> Option<&Self::Status>;
    fn set_status(&mut self, status: Self::Status);

    /// Current status, or the zero value when the object has none yet
    fn current_status(&self) -> Self::Status {
        self.status().cloned().unwrap_or_default()
    }
}

/// Key of an object in change notifications: `namespace/name` or `name`
pub fn object_key<K: Resource>(obj: &K) -> String {
    match obj.meta().namespace.as_deref() {
        Some(ns) if !ns.is_empty() => format!("{}/{}", ns, obj.name_any()),
        _ => obj.name_any(),
    }
}

/// Split a notification key at its last `/`
pub fn split_key(key: &str) -> (Option<String>, String) {
    match key.rsplit_once('/') {
        Some((ns, name)) if !ns.is_empty() => (Some(ns.to_string()), name.to_string()),
        Some((_, name)) => (None, name.to_string()),
        None => (None, key.to_string()),
    }
}

/// Handler invoked for every change notification
///
/// `obj` is `None` when the object was deleted. The returned object, if any,
/// is passed on to the next handler in the registry.
#[async_trait]
pub trait ObjectHandler<K>: Send + Sync {
    async fn on_change(&self, key: &str, obj: Option<K>) -> Result<Option<K>>;
}

/// Ordered set of named handlers for one resource type
pub struct HandlerRegistry<K> {
    handlers: Vec<(String, Arc<dyn ObjectHandler<K>>)>,
}

impl<K> Default for HandlerRegistry<K> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<K: Clone + Send + Sync + 'static> HandlerRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, name: impl Into<String>, handler: Arc<dyn ObjectHandler<K>>) {
        self.handlers.push((name.into(), handler));
    }

    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler in registration order
    ///
    /// A failing handler does not stop the ones after it. A single failure is
    /// returned as is; several are folded into one `Error::Handler`.
    pub async fn dispatch(&self, key: &str, obj: Option<K>) -> Result<Option<K>> {
        let mut current = obj;
        let mut errors: Vec<(String, Error)> = Vec::new();

        for (name, handler) in &self.handlers {
            match handler.on_change(key, current.clone()).await {
                Ok(Some(updated)) => current = Some(updated),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!("Handler {} failed for {}: {}", name, key, e);
                    errors.push((name.clone(), e));
                }
            }
        }

        match errors.len() {
            0 => Ok(current),
            1 => Err(errors.remove(0).1),
            _ => Err(Error::Handler(
                errors
                    .iter()
                    .map(|(name, e)| format!("{}: {}", name, e))
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
        }
    }
}

/// Outcome of one dispatched notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// All handlers succeeded for this key
    Synced(String),
    /// A handler or the watch itself failed
    Error(String),
}

/// Drives a handler registry from a kube watch stream
pub struct ControllerRunner<K: StatusObject> {
    api: Api<K>,
    registry: Arc<HandlerRegistry<K>>,
    event_tx: mpsc::UnboundedSender<ControllerEvent>,
    handle: Option<JoinHandle<()>>,
}

impl<K: StatusObject> ControllerRunner<K> {
    pub fn new(
        api: Api<K>,
        registry: HandlerRegistry<K>,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                api,
                registry: Arc::new(registry),
                event_tx: tx,
                handle: None,
            },
            rx,
        )
    }

    pub fn registry(&self) -> &HandlerRegistry<K> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the watch loop; a no-op when already running
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let api = self.api.clone();
        let registry = Arc::clone(&self.registry);
        let event_tx = self.event_tx.clone();
        let kind = K::kind(&()).into_owned();

        self.handle = Some(tokio::spawn(async move {
            let mut w = Box::pin(watcher(api, watcher::Config::default()));
            let mut error_count = 0u32;
            const MAX_CONSECUTIVE_ERRORS: u32 = 5;

            while let Some(event) = w.next().await {
                let (key, obj) = match event {
                    Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::InitApply(obj)) => {
                        error_count = 0;
                        (object_key(&obj), Some(obj))
                    }
                    Ok(watcher::Event::Delete(obj)) => {
                        error_count = 0;
                        (object_key(&obj), None)
                    }
                    Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => {
                        error_count = 0;
                        continue;
                    }
                    Err(e) => {
                        error_count += 1;
                        if error_count == 1 || error_count.is_multiple_of(10) {
                            let _ = event_tx.send(ControllerEvent::Error(format!(
                                "{} watcher error ({}): {}",
                                kind, error_count, e
                            )));
                        }
                        if error_count >= MAX_CONSECUTIVE_ERRORS {
                            let _ = event_tx.send(ControllerEvent::Error(format!(
                                "{} watcher stopped after {} consecutive errors",
                                kind, error_count
                            )));
                            break;
                        }
                        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                        continue;
                    }
                };

                let event = match registry.dispatch(&key, obj).await {
                    Ok(_) => ControllerEvent::Synced(key),
                    Err(e) => {
                        tracing::warn!("Reconcile of {} {} failed: {}", kind, key, e);
                        ControllerEvent::Error(format!("{} {}: {}", kind, key, e))
                    }
                };
                let _ = event_tx.send(event);
            }
        }));
    }

    /// Abort the watch loop
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl<K: StatusObject> Drop for ControllerRunner<K> {
    fn drop(&mut self) {
        self.stop();
    }
}
