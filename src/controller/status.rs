use super::{ConditionType, HandlerRegistry, ObjectHandler, StatusClient, StatusObject};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Computes a new status for an object
///
/// The handler gets a copy of the current status to modify. On error the
/// returned status is discarded.
#[async_trait]
pub trait StatusHandler<K: StatusObject>: Send + Sync {
    async fn handle(&self, obj: &K, status: K::Status) -> Result<K::Status>;
}

/// Adapts a synchronous closure into a `StatusHandler`
pub struct StatusFn<F>(pub F);

#[async_trait]
impl<K, F> StatusHandler<K> for StatusFn<F>
where
    K: StatusObject,
    F: Fn(&K, K::Status) -> Result<K::Status> + Send + Sync,
{
    async fn handle(&self, obj: &K, status: K::Status) -> Result<K::Status> {
        (self.0)(obj, status)
    }
}

/// Runs a status handler and persists what it changed
pub struct StatusSync<K: StatusObject> {
    client: Arc<dyn StatusClient<K>>,
    condition: Option<ConditionType>,
    handler: Arc<dyn StatusHandler<K>>,
}

impl<K: StatusObject> StatusSync<K> {
    pub fn new(
        client: Arc<dyn StatusClient<K>>,
        condition: Option<ConditionType>,
        handler: Arc<dyn StatusHandler<K>>,
    ) -> Self {
        Self {
            client,
            condition,
            handler,
        }
    }

    /// Reconcile one notification
    ///
    /// The status is written only when it differs from what the object
    /// already had. A handler error wins over a write error.
    pub async fn sync(&self, key: &str, obj: Option<K>) -> Result<Option<K>> {
        let Some(mut obj) = obj else {
            return Ok(None);
        };

        let snapshot = obj.current_status();
        let (mut status, mut err) = match self.handler.handle(&obj, snapshot.clone()).await {
            Ok(status) => (status, None),
            Err(e) => (snapshot.clone(), Some(e)),
        };

        if let Some(condition) = &self.condition {
            // A conflict will be retried with a fresh object, not a failure
            match err.as_ref() {
                Some(e) if !e.is_conflict() => condition.set_error(&mut status, "", Some(e)),
                _ => condition.set_error(&mut status, "", None),
            }
        }

        if status != snapshot {
            if let Some(condition) = &self.condition {
                let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
                condition.last_updated(&mut status, &now);
            }

            obj.set_status(status);
            match self.client.update_status(&obj).await {
                Ok(updated) => {
                    tracing::debug!("Updated status of {}", key);
                    obj = updated;
                }
                Err(update_err) => match &err {
                    None => err = Some(update_err),
                    Some(_) => {
                        tracing::warn!("Status update of {} failed: {}", key, update_err);
                    }
                },
            }
        }

        match err {
            Some(e) => Err(e),
            None => Ok(Some(obj)),
        }
    }
}

#[async_trait]
impl<K: StatusObject> ObjectHandler<K> for StatusSync<K> {
    async fn on_change(&self, key: &str, obj: Option<K>) -> Result<Option<K>> {
        self.sync(key, obj).await
    }
}

/// Register `handler` so its status output is persisted
///
/// With a condition, every run stamps it: true on success, false with the
/// error text on failure.
pub fn register_status_handler<K: StatusObject>(
    registry: &mut HandlerRegistry<K>,
    client: Arc<dyn StatusClient<K>>,
    condition: Option<ConditionType>,
    name: &str,
    handler: Arc<dyn StatusHandler<K>>,
) {
    let sync = StatusSync::new(client, condition, handler);
    registry.add_handler(name, Arc::new(sync));
}
