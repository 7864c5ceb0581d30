use super::{
    Applier, ApplyScope, ConditionType, GeneratingHandlerOptions, HandlerRegistry, ObjectHandler,
    OwnerRef, SeenVersions, StatusClient, StatusHandler, StatusObject, object_key,
};
use crate::error::Result;
use async_trait::async_trait;
use kube::ResourceExt;
use kube::api::DynamicObject;
use std::sync::Arc;

/// Produces the dependents an object should own, plus its new status
#[async_trait]
pub trait Generator<K: StatusObject>: Send + Sync {
    async fn generate(&self, obj: &K, status: K::Status) -> Result<(Vec<DynamicObject>, K::Status)>;
}

/// Adapts a synchronous closure into a `Generator`
pub struct GenerateFn<F>(pub F);

#[async_trait]
impl<K, F> Generator<K> for GenerateFn<F>
where
    K: StatusObject,
    F: Fn(&K, K::Status) -> Result<(Vec<DynamicObject>, K::Status)> + Send + Sync,
{
    async fn generate(&self, obj: &K, status: K::Status) -> Result<(Vec<DynamicObject>, K::Status)> {
        (self.0)(obj, status)
    }
}

/// Applies whatever a generator produces under the object as owner
///
/// The same value serves as the status handler (apply on change) and as a
/// plain change handler (prune on deletion).
pub struct GeneratingHandler<K: StatusObject> {
    generator: Arc<dyn Generator<K>>,
    applier: Arc<dyn Applier>,
    opts: GeneratingHandlerOptions,
    name: String,
    seen: SeenVersions,
}

impl<K: StatusObject> GeneratingHandler<K> {
    pub fn new(
        name: impl Into<String>,
        generator: Arc<dyn Generator<K>>,
        applier: Arc<dyn Applier>,
        opts: GeneratingHandlerOptions,
    ) -> Self {
        Self {
            generator,
            applier,
            opts,
            name: name.into(),
            seen: SeenVersions::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seen(&self) -> &SeenVersions {
        &self.seen
    }

    fn scope(&self, owner: OwnerRef) -> ApplyScope {
        ApplyScope::for_owner(owner, &self.name, &self.opts)
    }

    /// Prune everything applied for an object that no longer exists
    pub async fn remove(&self, key: &str, obj: Option<K>) -> Result<Option<K>> {
        if obj.is_some() {
            return Ok(obj);
        }

        self.seen.delete(key);
        let scope = self.scope(OwnerRef::from_key::<K>(key));
        self.applier.apply_objects(&scope, Vec::new()).await?;
        tracing::debug!("Pruned dependents of deleted {} for {}", key, self.name);
        Ok(None)
    }

    /// Generate and apply dependents for a live object
    pub async fn handle(&self, obj: &K, status: K::Status) -> Result<K::Status> {
        if obj.meta().deletion_timestamp.is_some() {
            return Ok(status);
        }

        let (objects, new_status) = self.generator.generate(obj, status).await?;

        if !self.is_new_resource_version(obj) {
            return Ok(new_status);
        }

        self.applier
            .apply_objects(&self.scope(OwnerRef::from_object(obj)), objects)
            .await?;

        if self.opts.unique_apply_for_resource_version {
            self.seen
                .store(object_key(obj), obj.resource_version().unwrap_or_default());
        }

        Ok(new_status)
    }

    fn is_new_resource_version(&self, obj: &K) -> bool {
        if !self.opts.unique_apply_for_resource_version {
            return true;
        }
        let resource_version = obj.resource_version().unwrap_or_default();
        self.seen.is_new(&object_key(obj), &resource_version)
    }
}

#[async_trait]
impl<K: StatusObject> StatusHandler<K> for GeneratingHandler<K> {
    async fn handle(&self, obj: &K, status: K::Status) -> Result<K::Status> {
        GeneratingHandler::handle(self, obj, status).await
    }
}

#[async_trait]
impl<K: StatusObject> ObjectHandler<K> for GeneratingHandler<K> {
    async fn on_change(&self, key: &str, obj: Option<K>) -> Result<Option<K>> {
        self.remove(key, obj).await
    }
}

/// Register a generator: pruning on deletion first, then apply plus status
pub fn register_generating_handler<K: StatusObject>(
    registry: &mut HandlerRegistry<K>,
    client: Arc<dyn StatusClient<K>>,
    applier: Arc<dyn Applier>,
    condition: Option<ConditionType>,
    name: &str,
    generator: Arc<dyn Generator<K>>,
    opts: GeneratingHandlerOptions,
) -> Arc<GeneratingHandler<K>> {
    let handler = Arc::new(GeneratingHandler::new(name, generator, applier, opts));

    registry.add_handler(format!("{}-remove", name), handler.clone());
    super::register_status_handler(
        registry,
        client,
        condition,
        name,
        handler.clone() as Arc<dyn StatusHandler<K>>,
    );

    handler
}
