//! # Remote Store
//!
//! Write-side boundary of the manager. Every mutation of a derived object
//! goes through [`ObjectStore`]; results are observed back only through the
//! watch stream.

use crate::error::StoreError;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Mutating operations against the backing object store
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Create `obj`. The store assigns a name when only `generateName` is set.
    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace `obj`, guarded by its `resourceVersion`.
    async fn update(&self, obj: &K) -> Result<K, StoreError>;

    /// Request deletion of the object called `name`.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// [`ObjectStore`] backed by a Kubernetes API endpoint
pub struct KubeObjectStore<K> {
    api: Api<K>,
}

impl<K> KubeObjectStore<K> {
    pub fn new(api: Api<K>) -> Self {
        Self { api }
    }
}

impl<K> Debug for KubeObjectStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeObjectStore<K>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj
            .meta()
            .name
            .clone()
            .or_else(|| obj.meta().generate_name.clone())
            .ok_or(StoreError::MissingName)?;
        debug!(object = %name, "creating object");
        self.api
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(e, &name))
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj.meta().name.clone().ok_or(StoreError::MissingName)?;
        debug!(
            object = %name,
            resource_version = obj.resource_version().as_deref().unwrap_or(""),
            "replacing object"
        );
        self.api
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(e, &name))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        debug!(object = %name, "deleting object");
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_kube(e, name))
    }
}
