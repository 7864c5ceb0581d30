use super::StatusObject;
use crate::error::{Error, Result};
use async_trait::async_trait;
use kube::api::PostParams;
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;

/// Writes the status subresource of an object
#[async_trait]
pub trait StatusClient<K>: Send + Sync {
    /// Persist `obj`'s status and return the object as stored
    async fn update_status(&self, obj: &K) -> Result<K>;
}

type ApiFor<K> = Arc<dyn Fn(Option<&str>) -> Api<K> + Send + Sync>;

/// `StatusClient` backed by the status subresource
pub struct KubeStatusClient<K: StatusObject> {
    api_for: ApiFor<K>,
}

impl<K: StatusObject> KubeStatusClient<K> {
    /// For cluster scoped resources
    pub fn cluster(client: Client) -> Self {
        Self {
            api_for: Arc::new(move |_| Api::all(client.clone())),
        }
    }

    /// For namespaced resources; the namespace is taken from each object
    pub fn namespaced(client: Client) -> Self
    where
        K: Resource<Scope = NamespaceResourceScope>,
    {
        Self {
            api_for: Arc::new(move |ns| match ns {
                Some(ns) => Api::namespaced(client.clone(), ns),
                None => Api::default_namespaced(client.clone()),
            }),
        }
    }
}

#[async_trait]
impl<K: StatusObject> StatusClient<K> for KubeStatusClient<K> {
    async fn update_status(&self, obj: &K) -> Result<K> {
        let namespace = obj.namespace();
        let api = (self.api_for)(namespace.as_deref());
        let data = serde_json::to_vec(obj)?;

        match api
            .replace_status(&obj.name_any(), &PostParams::default(), data)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(resp)) if resp.code == 409 => {
                Err(Error::Conflict(format!("{}: {}", obj.name_any(), resp.message)))
            }
            Err(e) => Err(e.into()),
        }
    }
}
