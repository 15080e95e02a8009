//! Credential Secret materialization
//!
//! The Secret is named after the owning object and carries a controller owner
//! reference, so Kubernetes garbage collection removes it with the parent.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::error::Result;

use super::kind::ServiceKind;
use super::store::SecretStore;

/// Build an OwnerReference pointing at the managed object
pub fn owner_reference<K: ServiceKind>(obj: &K) -> OwnerReference {
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: obj.name_any(),
        uid: obj.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Standard labels for operator-managed Secrets
pub fn standard_labels<K: ServiceKind>(obj: &K) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        K::SERVICE_TYPE.replace('_', "-"),
    );
    labels.insert("app.kubernetes.io/instance".to_string(), obj.name_any());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "aiven-operator".to_string(),
    );
    labels
}

pub fn build_credential_secret<K: ServiceKind>(
    obj: &K,
    bundle: &BTreeMap<String, String>,
) -> Secret {
    let data = bundle
        .iter()
        .map(|(k, v)| (k.clone(), ByteString(v.as_bytes().to_vec())))
        .collect();

    Secret {
        metadata: ObjectMeta {
            name: Some(obj.name_any()),
            namespace: obj.namespace(),
            labels: Some(standard_labels(obj)),
            owner_references: Some(vec![owner_reference(obj)]),
            ..Default::default()
        },
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Create or update the credential Secret for `obj`
///
/// Returns `false` when the stored Secret already matches and nothing was
/// written.
pub async fn materialize<K: ServiceKind>(
    secrets: &dyn SecretStore,
    obj: &K,
    bundle: &BTreeMap<String, String>,
) -> Result<bool> {
    let desired = build_credential_secret(obj, bundle);
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();

    if let Some(existing) = secrets.get_secret(&namespace, &name).await? {
        if existing.data == desired.data
            && existing.metadata.owner_references == desired.metadata.owner_references
        {
            debug!("Secret {}/{} is up to date", namespace, name);
            return Ok(false);
        }
    }

    secrets.apply_secret(&desired).await?;
    info!("Wrote credential Secret {}/{}", namespace, name);
    Ok(true)
}
