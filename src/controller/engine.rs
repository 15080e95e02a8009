//! Reconciliation engine for managed services
//!
//! One call to [`Engine::reconcile`] handles one trigger for one object:
//!
//! 1. Re-fetch the object; if it is being deleted, run the finalizer path
//! 2. Validate the spec; failures become `Failed=True` with `InvalidSpec`
//! 3. Look the service up and refuse to touch it if another object owns it
//! 4. Ensure our finalizer, then create the service or converge drift
//! 5. Project the remote snapshot onto the status
//! 6. Publish the credential Secret once the service is running
//!
//! The engine keeps no per-object state between calls. Retryable failures are
//! returned as [`Action::Backoff`] and the controller context owns the retry
//! curve. On the deletion path every error except a permission denial is
//! retried.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::config::RequeuePolicy;
use crate::crd::{describe_validation_errors, user_config_diff, ServiceStatus};
use crate::error::{Error, Result};
use crate::remote::{
    ClientFactory, ErrorClass, RemoteError, RemoteService, ServiceClient, ServiceUpdate,
};

use super::finalizers::{self, has_finalizer, is_being_deleted};
use super::kind::{desired_maintenance, ServiceKind};
use super::secrets;
use super::status::{clear_failure, project_status, set_credentials_condition, set_failure};
use super::store::{ObjectKey, ObjectStore, SecretStore};

/// Requeue directive returned by a reconcile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Check again after the given delay
    Requeue(Duration),
    /// Retry with the next step of the exponential backoff
    Backoff,
    /// Nothing to do until the object changes
    AwaitChange,
}

/// Outcome of looking for our service remotely
enum Ownership {
    Ours(RemoteService),
    Foreign(String),
}

pub struct Engine<K: ServiceKind> {
    store: Arc<dyn ObjectStore<K>>,
    secrets: Arc<dyn SecretStore>,
    client: Arc<dyn ServiceClient>,
    factory: Option<Arc<dyn ClientFactory>>,
    policy: RequeuePolicy,
}

impl<K: ServiceKind> Engine<K> {
    pub fn new(
        store: Arc<dyn ObjectStore<K>>,
        secrets: Arc<dyn SecretStore>,
        client: Arc<dyn ServiceClient>,
        policy: RequeuePolicy,
    ) -> Self {
        Self {
            store,
            secrets,
            client,
            factory: None,
            policy,
        }
    }

    /// Use `factory` to build clients for objects with `authSecretRef`
    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn policy(&self) -> &RequeuePolicy {
        &self.policy
    }

    #[instrument(skip(self, key), fields(kind = %K::kind(&()), object = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let Some(obj) = self.store.get(key).await? else {
            debug!("Object is gone");
            return Ok(Action::AwaitChange);
        };

        if is_being_deleted(&obj) {
            return self.finalize(obj).await;
        }
        self.apply(obj).await
    }

    async fn apply(&self, obj: K) -> Result<Action> {
        let key = ObjectKey::from_object(&obj);

        if let Err(errors) = obj.validate() {
            let message = describe_validation_errors(&errors);
            return self.terminal(&key, RemoteError::spec(message)).await;
        }

        match self.apply_remote(obj).await {
            Err(Error::Remote(e)) if e.is_retryable() => {
                self.retryable(&e);
                Ok(Action::Backoff)
            }
            Err(Error::Remote(e)) => self.terminal(&key, e).await,
            other => other,
        }
    }

    async fn apply_remote(&self, obj: K) -> Result<Action> {
        let client = self.client_for(&obj).await?;
        let service_key = obj.service_key();
        let owner = obj.owner_identity();

        // Read-only lookup first so a foreign service never gets our finalizer
        let observed = client.get(&service_key).await?;
        if let Some(service) = &observed {
            if !service.is_owned_by(&owner) {
                return self.name_conflict(&obj, service).await;
            }
        }

        let obj = finalizers::ensure(self.store.as_ref(), obj).await?;

        let remote = match observed {
            None => match self.create(client.as_ref(), &obj).await? {
                Ownership::Ours(service) => service,
                Ownership::Foreign(message) => {
                    return self.release_and_fail(&obj, message).await;
                }
            },
            Some(service) => self.converge(client.as_ref(), &obj, service).await?,
        };

        self.sync_status(obj, &remote).await
    }

    async fn create(&self, client: &dyn ServiceClient, obj: &K) -> Result<Ownership> {
        let service_key = obj.service_key();
        let request = obj.build_desired_spec();
        info!(
            "Creating {} service {} (plan {}, cloud {})",
            K::SERVICE_TYPE,
            service_key,
            request.plan,
            request.cloud_name
        );

        match client.create(&service_key, &request).await {
            Ok(service) => Ok(Ownership::Ours(service)),
            Err(e) if e.class == ErrorClass::TerminalConflict => {
                // A previous attempt may have succeeded without us seeing the reply
                match client.get(&service_key).await? {
                    Some(service) if service.is_owned_by(&obj.owner_identity()) => {
                        info!("Service {} already created by this object", service_key);
                        Ok(Ownership::Ours(service))
                    }
                    _ => Ok(Ownership::Foreign(format!(
                        "service {service_key} already exists and is not owned by this object: {}",
                        e.message
                    ))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn converge(
        &self,
        client: &dyn ServiceClient,
        obj: &K,
        service: RemoteService,
    ) -> Result<RemoteService> {
        if !service.state.accepts_updates() {
            debug!(
                "Service is {}, deferring configuration changes",
                service.state
            );
            return Ok(service);
        }

        let update = desired_update(obj, &service);
        if update.is_empty() {
            return Ok(service);
        }

        info!("Updating service {}: {:?}", obj.service_key(), update);
        Ok(client.update(&obj.service_key(), &update).await?)
    }

    async fn sync_status(&self, obj: K, remote: &RemoteService) -> Result<Action> {
        let now = now();
        let mut status = project_status(
            obj.status(),
            Some(remote),
            obj.meta().generation,
            &now,
        );
        clear_failure(&mut status, &now);

        let mut action = Action::Requeue(self.policy.interval_for(Some(&remote.state)));

        if remote.state.is_running() && !K::credential_keys().is_empty() {
            match self.publish_credentials(&obj, remote).await {
                Ok(_) => {
                    let message = format!("Secret {} is up to date", obj.name_any());
                    set_credentials_condition(&mut status, true, &message, &now);
                }
                Err(message) => {
                    warn!("Credentials not published: {}", message);
                    set_credentials_condition(&mut status, false, &message, &now);
                    action = Action::Backoff;
                }
            }
        }

        self.write_status(&obj, status).await?;
        Ok(action)
    }

    async fn publish_credentials(
        &self,
        obj: &K,
        remote: &RemoteService,
    ) -> std::result::Result<bool, String> {
        let conn = remote
            .connection
            .as_ref()
            .ok_or_else(|| "service reports no connection parameters".to_string())?;
        let bundle: BTreeMap<String, String> = obj.credentials(conn);

        let missing: Vec<&str> = K::credential_keys()
            .iter()
            .copied()
            .filter(|k| bundle.get(*k).map(|v| v.is_empty()).unwrap_or(true))
            .collect();
        if !missing.is_empty() {
            return Err(format!(
                "connection parameters incomplete, missing {}",
                missing.join(", ")
            ));
        }

        secrets::materialize(self.secrets.as_ref(), obj, &bundle)
            .await
            .map_err(|e| e.to_string())
    }

    async fn finalize(&self, obj: K) -> Result<Action> {
        if !has_finalizer(&obj) {
            return Ok(Action::AwaitChange);
        }
        let key = ObjectKey::from_object(&obj);

        match self.delete_remote(&obj).await {
            Ok(()) => {
                finalizers::release(self.store.as_ref(), obj).await?;
                Ok(Action::AwaitChange)
            }
            Err(Error::Remote(e)) if e.class == ErrorClass::TerminalPermission => {
                self.terminal(&key, e).await
            }
            // Anything else on the way out is retried with backoff
            Err(Error::Remote(e)) => {
                self.retryable(&e);
                Ok(Action::Backoff)
            }
            Err(other) => Err(other),
        }
    }

    async fn delete_remote(&self, obj: &K) -> Result<()> {
        let client = self.client_for(obj).await?;
        let service_key = obj.service_key();

        match client.get(&service_key).await? {
            None => {
                info!("Service {} is already gone", service_key);
            }
            Some(service) if !service.is_owned_by(&obj.owner_identity()) => {
                info!(
                    "Service {} is not owned by this object, leaving it in place",
                    service_key
                );
            }
            Some(_) => {
                if client.delete(&service_key).await? {
                    info!("Deleted service {}", service_key);
                } else {
                    info!("Service {} disappeared before delete", service_key);
                }
            }
        }
        Ok(())
    }

    /// Resolve the client for `obj`, honouring a per-object API token
    async fn client_for(&self, obj: &K) -> Result<Arc<dyn ServiceClient>> {
        let (Some(auth), Some(factory)) = (&obj.common().auth_secret_ref, &self.factory) else {
            return Ok(self.client.clone());
        };
        let namespace = obj.namespace().unwrap_or_default();

        let secret = self
            .secrets
            .get_secret(&namespace, &auth.name)
            .await?
            .ok_or_else(|| {
                RemoteError::spec(format!(
                    "auth secret {}/{} not found",
                    namespace, auth.name
                ))
            })?;
        let token = secret
            .data
            .as_ref()
            .and_then(|d| d.get(&auth.key))
            .map(|v| String::from_utf8_lossy(&v.0).trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                RemoteError::spec(format!(
                    "auth secret {}/{} has no key {:?}",
                    namespace, auth.name, auth.key
                ))
            })?;

        Ok(factory.for_token(&token))
    }

    async fn name_conflict(&self, obj: &K, service: &RemoteService) -> Result<Action> {
        let owner = service
            .tags
            .get(crate::remote::OWNER_TAG)
            .map(String::as_str)
            .unwrap_or("nobody");
        let message = format!(
            "service {} already exists and is owned by {}",
            obj.service_key(),
            owner
        );
        self.release_and_fail(obj, message).await
    }

    /// The name is taken by someone else: drop our marker and report
    async fn release_and_fail(&self, obj: &K, message: String) -> Result<Action> {
        let key = ObjectKey::from_object(obj);
        let Some(latest) = self.store.get(&key).await? else {
            return Ok(Action::AwaitChange);
        };
        finalizers::release(self.store.as_ref(), latest).await?;
        self.terminal(&key, RemoteError::conflict(message)).await
    }

    /// Surface a terminal error as `Failed=True` and wait for a resync
    async fn terminal(&self, key: &ObjectKey, error: RemoteError) -> Result<Action> {
        warn!("Terminal error ({}): {}", error.class.reason(), error.message);
        #[cfg(feature = "metrics")]
        super::metrics::inc_remote_error(&K::kind(&()), error.class.reason());

        let Some(obj) = self.store.get(key).await? else {
            return Ok(Action::AwaitChange);
        };
        let now = now();
        let mut status = obj.status().cloned().unwrap_or_default();
        status.observed_generation = obj.meta().generation;
        set_failure(&mut status, error.class.reason(), &error.message, &now);
        self.write_status(&obj, status).await?;

        Ok(Action::Requeue(self.policy.resync_interval))
    }

    fn retryable(&self, error: &RemoteError) {
        warn!("Retryable error: {}", error.message);
        #[cfg(feature = "metrics")]
        super::metrics::inc_remote_error(&K::kind(&()), error.class.reason());
    }

    async fn write_status(&self, obj: &K, status: ServiceStatus) -> Result<()> {
        if obj.status() == Some(&status) {
            debug!("Status unchanged, skipping write");
            return Ok(());
        }
        self.store.patch_status(obj, &status).await?;
        Ok(())
    }
}

/// Field-level difference between the object's spec and the remote service
///
/// Only fields the spec sets are compared; everything else is left as the
/// remote side has it.
pub fn desired_update<K: ServiceKind>(obj: &K, service: &RemoteService) -> ServiceUpdate {
    let common = obj.common();
    let mut update = ServiceUpdate::default();

    if !common.plan.is_empty() && common.plan != service.plan {
        update.plan = Some(common.plan.clone());
    }
    if !common.cloud_name.is_empty() && common.cloud_name != service.cloud_name {
        update.cloud_name = Some(common.cloud_name.clone());
    }
    if let Some(window) = desired_maintenance(common) {
        if service.maintenance.as_ref() != Some(&window) {
            update.maintenance = Some(window);
        }
    }
    if let Some(protect) = common.termination_protection {
        if protect != service.termination_protection {
            update.termination_protection = Some(protect);
        }
    }
    let config = user_config_diff(&obj.user_config(), &service.user_config);
    if !config.is_empty() {
        update.user_config = Some(config);
    }

    update
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
