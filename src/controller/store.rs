//! Storage seam between the engine and the Kubernetes API
//!
//! The engine never holds an `Api` directly. Reads always go to the API server
//! so every reconcile starts from the latest object, and object writes carry
//! the `resourceVersion` they were based on.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::{json, Value};

use crate::crd::ServiceStatus;
use crate::error::{Error, Result};

use super::kind::ServiceKind;

/// Field manager used for every write the operator makes
pub const FIELD_MANAGER: &str = "aiven-operator";

/// Namespaced object identity used as the work queue key
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_object<K: ResourceExt>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[async_trait]
pub trait ObjectStore<K: ServiceKind>: Send + Sync {
    /// Latest version of the object; `None` once it is gone
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>>;

    /// Replace the finalizer list. Fails with [`Error::StaleWrite`] if the
    /// object changed since `obj` was read.
    async fn patch_finalizers(&self, obj: &K, finalizers: Vec<String>) -> Result<K>;

    async fn patch_status(&self, obj: &K, status: &ServiceStatus) -> Result<K>;
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Create or update a Secret with server-side apply
    async fn apply_secret(&self, secret: &Secret) -> Result<()>;
}

/// Store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn map_conflict(err: kube::Error, what: String) -> Error {
    match err {
        kube::Error::Api(ref resp) if resp.code == 409 => Error::StaleWrite(what),
        other => Error::KubeError(other),
    }
}

/// Merge patch for the status subresource, guarded by `resourceVersion`
///
/// Unset status fields are sent as `null`, which removes them on the server.
pub(crate) fn status_patch<K: ServiceKind>(obj: &K, status: &ServiceStatus) -> Value {
    json!({
        "metadata": {
            "resourceVersion": obj.resource_version()
        },
        "status": status
    })
}

#[async_trait]
impl<K: ServiceKind> ObjectStore<K> for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn patch_finalizers(&self, obj: &K, finalizers: Vec<String>) -> Result<K> {
        let key = ObjectKey::from_object(obj);
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        let patch = json!({
            "metadata": {
                "resourceVersion": obj.resource_version(),
                "finalizers": finalizers
            }
        });
        api.patch(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| map_conflict(e, key.to_string()))
    }

    async fn patch_status(&self, obj: &K, status: &ServiceStatus) -> Result<K> {
        let key = ObjectKey::from_object(obj);
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        let patch = status_patch(obj, status);
        api.patch_status(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| map_conflict(e, key.to_string()))
    }
}

#[async_trait]
impl SecretStore for KubeStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<()> {
        let namespace = secret.namespace().unwrap_or_default();
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(
            &secret.name_any(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(secret),
        )
        .await?;
        Ok(())
    }
}
