//! Finalizer handling for managed service cleanup
//!
//! The finalizer is present for as long as the remote service may still
//! exist. It is added before the first mutating remote call and released only
//! after the service is confirmed gone (or was never ours).

use kube::ResourceExt;
use tracing::info;

use crate::error::Result;

use super::kind::ServiceKind;
use super::store::ObjectStore;

/// Finalizer name used to protect managed service objects
pub const SERVICE_FINALIZER: &str = "aiven.io/service-finalizer";

/// Add the finalizer if not present
///
/// Returns the object as written, or `obj` unchanged when nothing was needed.
pub async fn ensure<K: ServiceKind>(store: &dyn ObjectStore<K>, obj: K) -> Result<K> {
    if has_finalizer(&obj) {
        return Ok(obj);
    }
    let mut finalizers: Vec<String> = obj.finalizers().to_vec();
    finalizers.push(SERVICE_FINALIZER.to_string());

    let updated = store.patch_finalizers(&obj, finalizers).await?;
    info!("Added finalizer to {} {}", K::kind(&()), obj.name_any());
    Ok(updated)
}

/// Remove the finalizer if present, keeping any others
pub async fn release<K: ServiceKind>(store: &dyn ObjectStore<K>, obj: K) -> Result<K> {
    if !has_finalizer(&obj) {
        return Ok(obj);
    }
    let finalizers: Vec<String> = obj
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != SERVICE_FINALIZER)
        .cloned()
        .collect();

    let updated = store.patch_finalizers(&obj, finalizers).await?;
    info!("Removed finalizer from {} {}", K::kind(&()), obj.name_any());
    Ok(updated)
}

/// Check if the object is being deleted
///
/// A deletion timestamp indicates the user has requested deletion,
/// but finalizers are preventing the actual removal.
pub fn is_being_deleted<K: ServiceKind>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// Check if the object has our finalizer
pub fn has_finalizer<K: ServiceKind>(obj: &K) -> bool {
    obj.finalizers().iter().any(|f| f == SERVICE_FINALIZER)
}
