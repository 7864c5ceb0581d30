//! Declarative apply of dependent objects
//!
//! Objects produced by a generating handler are applied under an owner and a
//! set id. Everything applied for the same owner + set id carries a hash label,
//! which is how objects that are no longer desired get found and pruned.
//! Applying an empty set prunes everything, which is how owner deletion
//! cascades. The applier remembers which kinds it applied for each set, so
//! kinds that are no longer produced still get pruned.

use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch,
    PatchParams, TypeMeta,
};
use kube::discovery::Scope;
use kube::{Client, Resource, ResourceExt};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const LABEL_HASH: &str = "objectset.rio.cattle.io/hash";
pub const ANNOTATION_SET_ID: &str = "objectset.rio.cattle.io/id";
pub const ANNOTATION_OWNER_GVK: &str = "objectset.rio.cattle.io/owner-gvk";
pub const ANNOTATION_OWNER_NAME: &str = "objectset.rio.cattle.io/owner-name";
pub const ANNOTATION_OWNER_NAMESPACE: &str = "objectset.rio.cattle.io/owner-namespace";

/// Options for generating handlers, mapped onto an `ApplyScope` per object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratingHandlerOptions {
    /// Allow dependents in namespaces other than the owner's
    pub allow_cross_namespace: bool,
    /// Allow cluster scoped dependents of namespaced owners
    pub allow_cluster_scoped: bool,
    /// Do not set owner references on dependents
    pub no_owner_reference: bool,
    /// Apply at most once per resource version of the owner
    pub unique_apply_for_resource_version: bool,
    /// Kinds to prune even when no desired object has that kind
    pub prune_types: Vec<GroupVersionKind>,
}

/// Identity of the object owning a set of applied dependents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    /// Unknown for placeholders rebuilt from a deletion key
    pub uid: Option<String>,
}

impl OwnerRef {
    pub fn from_object<K: Resource<DynamicType = ()>>(obj: &K) -> Self {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            namespace: obj.namespace(),
            name: obj.name_any(),
            uid: obj.uid(),
        }
    }

    /// Placeholder owner for an object that has already been deleted
    pub fn from_key<K: Resource<DynamicType = ()>>(key: &str) -> Self {
        let (namespace, name) = super::split_key(key);
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            namespace,
            name,
            uid: None,
        }
    }

    pub fn gvk_string(&self) -> String {
        format!("{}, Kind={}", self.api_version, self.kind)
    }
}

/// Where and how one owner's dependents are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyScope {
    pub owner: OwnerRef,
    pub set_id: String,
    /// Namespace given to namespaced objects that do not set one
    pub default_namespace: Option<String>,
    /// Namespace listed when pruning; `None` lists across namespaces
    pub lister_namespace: Option<String>,
    /// Reject namespaced objects outside the owner's namespace
    pub restrict_namespace: bool,
    /// Reject cluster scoped objects for namespaced owners
    pub restrict_cluster_scoped: bool,
    pub set_owner_reference: bool,
    pub prune_types: Vec<GroupVersionKind>,
}

impl ApplyScope {
    /// Scope the dependents of `owner` under `set_id`
    pub fn for_owner(owner: OwnerRef, set_id: &str, opts: &GeneratingHandlerOptions) -> Self {
        let pinned = if opts.allow_cluster_scoped || opts.allow_cross_namespace {
            None
        } else {
            owner.namespace.clone()
        };
        let default_namespace = if opts.allow_cluster_scoped {
            None
        } else {
            owner.namespace.clone()
        };

        Self {
            default_namespace,
            lister_namespace: pinned,
            restrict_namespace: !opts.allow_cross_namespace,
            restrict_cluster_scoped: !opts.allow_cluster_scoped,
            set_owner_reference: !opts.no_owner_reference,
            prune_types: opts.prune_types.clone(),
            set_id: set_id.to_string(),
            owner,
        }
    }

    /// Label value shared by every object applied for this owner + set id
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.set_id.as_bytes());
        hasher.update(b"/");
        hasher.update(self.owner.gvk_string().as_bytes());
        hasher.update(b"/");
        hasher.update(self.owner.namespace.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"/");
        hasher.update(self.owner.name.as_bytes());
        // label values are capped at 63 characters
        hex::encode(hasher.finalize())[..40].to_string()
    }

    /// Resolve the namespace of a desired object and enforce scope rules
    pub fn place(&self, obj: &mut DynamicObject, namespaced: bool) -> Result<()> {
        let owner_ns = self.owner.namespace.as_deref();

        if !namespaced {
            if self.restrict_cluster_scoped && owner_ns.is_some() {
                return Err(Error::Apply(format!(
                    "cluster scoped object {} is not allowed for namespaced owner {}",
                    describe(obj),
                    self.owner.name
                )));
            }
            obj.metadata.namespace = None;
            return Ok(());
        }

        if obj.metadata.namespace.as_deref().unwrap_or("").is_empty() {
            obj.metadata.namespace = self.default_namespace.clone();
        }

        let Some(ns) = obj.metadata.namespace.as_deref() else {
            return Err(Error::Apply(format!(
                "namespaced object {} has no namespace",
                describe(obj)
            )));
        };

        if self.restrict_namespace && owner_ns.is_some_and(|owner| owner != ns) {
            return Err(Error::Apply(format!(
                "object {} in namespace {} is outside owner namespace {}",
                describe(obj),
                ns,
                owner_ns.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Stamp the set labels, annotations and owner reference onto an object
    pub fn decorate(&self, obj: &mut DynamicObject) {
        obj.labels_mut()
            .insert(LABEL_HASH.to_string(), self.hash());

        let annotations = obj.annotations_mut();
        annotations.insert(ANNOTATION_SET_ID.to_string(), self.set_id.clone());
        annotations.insert(ANNOTATION_OWNER_GVK.to_string(), self.owner.gvk_string());
        annotations.insert(ANNOTATION_OWNER_NAME.to_string(), self.owner.name.clone());
        annotations.insert(
            ANNOTATION_OWNER_NAMESPACE.to_string(),
            self.owner.namespace.clone().unwrap_or_default(),
        );

        // Namespaced owners can only own objects in their own namespace
        let same_scope = match self.owner.namespace.as_deref() {
            None => true,
            Some(owner_ns) => obj.metadata.namespace.as_deref() == Some(owner_ns),
        };
        if let (true, true, Some(uid)) = (self.set_owner_reference, same_scope, &self.owner.uid) {
            obj.owner_references_mut().push(OwnerReference {
                api_version: self.owner.api_version.clone(),
                kind: self.owner.kind.clone(),
                name: self.owner.name.clone(),
                uid: uid.clone(),
                controller: Some(true),
                block_owner_deletion: Some(false),
            });
        }
    }
}

fn describe(obj: &DynamicObject) -> String {
    let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("?");
    format!("{}/{}", kind, obj.name_any())
}

/// Parse the group/version/kind of an object's type metadata
pub fn gvk_of(types: &TypeMeta) -> GroupVersionKind {
    match types.api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, &types.kind),
        None => GroupVersionKind::gvk("", &types.api_version, &types.kind),
    }
}

/// Applies dependents for an owner
#[async_trait]
pub trait Applier: Send + Sync {
    /// Make the applied set for `scope` equal to `objects`
    async fn apply_objects(&self, scope: &ApplyScope, objects: Vec<DynamicObject>) -> Result<()>;
}

/// Server-side apply plus label-scoped pruning over kube-rs
pub struct KubeApplier {
    client: Client,
    field_manager: String,
    /// Kinds applied so far, keyed by set hash
    applied_kinds: Mutex<HashMap<String, Vec<GroupVersionKind>>>,
}

impl KubeApplier {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            applied_kinds: Mutex::new(HashMap::new()),
        }
    }

    /// Kinds previously applied under `hash`
    pub fn applied_kinds(&self, hash: &str) -> Vec<GroupVersionKind> {
        let known = self.applied_kinds.lock().unwrap_or_else(|e| e.into_inner());
        known.get(hash).cloned().unwrap_or_default()
    }

    fn remember_kinds(&self, hash: &str, kinds: Vec<GroupVersionKind>) {
        let mut known = self.applied_kinds.lock().unwrap_or_else(|e| e.into_inner());
        if kinds.is_empty() {
            known.remove(hash);
        } else {
            known.insert(hash.to_string(), kinds);
        }
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, bool)> {
        let (ar, caps) = kube::discovery::pinned_kind(&self.client, gvk).await?;
        Ok((ar, caps.scope == Scope::Namespaced))
    }

    fn api(&self, ar: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, ar),
            None => Api::all_with(self.client.clone(), ar),
        }
    }
}

type ObjectId = (String, Option<String>, String);

fn object_id(gvk: &GroupVersionKind, namespace: Option<String>, name: String) -> ObjectId {
    (format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind), namespace, name)
}

#[async_trait]
impl Applier for KubeApplier {
    async fn apply_objects(&self, scope: &ApplyScope, objects: Vec<DynamicObject>) -> Result<()> {
        let hash = scope.hash();
        let mut desired: HashSet<ObjectId> = HashSet::new();
        let mut desired_kinds: Vec<GroupVersionKind> = Vec::new();
        let mut kinds: Vec<GroupVersionKind> = scope.prune_types.clone();
        for gvk in self.applied_kinds(&hash) {
            if !kinds.contains(&gvk) {
                kinds.push(gvk);
            }
        }
        let params = PatchParams::apply(&self.field_manager).force();

        for mut obj in objects {
            let types = obj
                .types
                .clone()
                .ok_or_else(|| Error::Apply(format!("object {} has no type", describe(&obj))))?;
            let gvk = gvk_of(&types);
            let (ar, namespaced) = self.resolve(&gvk).await?;

            scope.place(&mut obj, namespaced)?;
            scope.decorate(&mut obj);

            let name = obj
                .metadata
                .name
                .clone()
                .ok_or_else(|| Error::Apply(format!("{} object has no name", types.kind)))?;
            let namespace = obj.metadata.namespace.clone();

            self.api(&ar, namespace.as_deref())
                .patch(&name, &params, &Patch::Apply(&obj))
                .await?;
            tracing::debug!("Applied {} {:?}/{} for set {}", types.kind, namespace, name, scope.set_id);

            desired.insert(object_id(&gvk, namespace, name));
            if !desired_kinds.contains(&gvk) {
                desired_kinds.push(gvk.clone());
            }
            if !kinds.contains(&gvk) {
                kinds.push(gvk);
            }
        }

        // Keep every kind that may still have objects until the prune succeeds
        self.remember_kinds(&hash, kinds.clone());

        let selector = format!("{}={}", LABEL_HASH, hash);
        for gvk in &kinds {
            let (ar, namespaced) = self.resolve(gvk).await?;
            let lister_ns = if namespaced {
                scope.lister_namespace.as_deref()
            } else {
                None
            };
            let existing = self
                .api(&ar, lister_ns)
                .list(&ListParams::default().labels(&selector))
                .await?;

            for obj in existing {
                let namespace = obj.namespace();
                let name = obj.name_any();
                if desired.contains(&object_id(gvk, namespace.clone(), name.clone())) {
                    continue;
                }

                let api = self.api(&ar, namespace.as_deref());
                match api.delete(&name, &DeleteParams::background()).await {
                    Ok(_) => {
                        tracing::info!("Pruned {} {:?}/{} from set {}", gvk.kind, namespace, name, scope.set_id);
                    }
                    Err(kube::Error::Api(resp)) if resp.code == 404 => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.remember_kinds(&hash, desired_kinds);
        Ok(())
    }
}
