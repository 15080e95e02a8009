//! In-memory store and scripted remote client for engine tests

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde_json::{Map, Value};

use crate::crd::{
    KafkaConnect, KafkaConnectSpec, PGSpec, PGSubPGUserConfig, PGUserConfig,
    PublicAccessUserConfig, ServiceCommonSpec, ServiceState, ServiceStatus, PG,
};
use crate::error::{Error, Result};
use crate::remote::{
    ConnectionInfo, RemoteError, RemoteService, ServiceClient, ServiceKey, ServiceRequest,
    ServiceUpdate,
};

use super::kind::ServiceKind;
use super::store::{status_patch, ObjectKey, ObjectStore, SecretStore};

fn common_spec() -> ServiceCommonSpec {
    ServiceCommonSpec {
        project: "aiven-ci".to_string(),
        service_name: None,
        plan: "business-4".to_string(),
        cloud_name: "google-europe-west1".to_string(),
        maintenance_window_dow: Some("friday".to_string()),
        maintenance_window_time: Some("23:00:00".to_string()),
        termination_protection: None,
        auth_secret_ref: None,
    }
}

fn test_meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        generation: Some(1),
        uid: Some(format!("test-uid-{}", name)),
        finalizers: Some(vec![]),
        ..Default::default()
    }
}

/// Helper to create a minimal valid PG object
pub fn test_pg(name: &str, namespace: &str) -> PG {
    PG {
        metadata: test_meta(name, namespace),
        spec: PGSpec {
            common: common_spec(),
            pg_user_config: PGUserConfig {
                pg_version: Some("12".to_string()),
                public_access: Some(PublicAccessUserConfig {
                    pg: Some(true),
                    prometheus: Some(true),
                }),
                ip_filter: None,
                pg: Some(PGSubPGUserConfig {
                    idle_in_transaction_session_timeout: Some(900),
                    ..Default::default()
                }),
            },
        },
        status: None,
    }
}

/// Helper to create a minimal valid KafkaConnect object
pub fn test_kafka_connect(name: &str, namespace: &str) -> KafkaConnect {
    let mut common = common_spec();
    common.service_name = Some(name.to_string());
    KafkaConnect {
        metadata: test_meta(name, namespace),
        spec: KafkaConnectSpec {
            common,
            ..Default::default()
        },
        status: None,
    }
}

/// Object store with API-server-like resourceVersion checks
pub struct MemoryStore<K> {
    objects: Mutex<BTreeMap<ObjectKey, K>>,
    version: AtomicUsize,
    writes: AtomicUsize,
}

impl<K: ServiceKind> MemoryStore<K> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            version: AtomicUsize::new(1),
            writes: AtomicUsize::new(0),
        }
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    pub fn insert(&self, mut obj: K) {
        obj.meta_mut().resource_version = Some(self.next_version());
        let key = ObjectKey::from_object(&obj);
        self.objects.lock().unwrap().insert(key, obj);
    }

    /// Simulate a user edit; bumps resourceVersion and generation
    pub fn update_spec(&self, key: &ObjectKey, edit: impl FnOnce(&mut K)) {
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let obj = objects.get_mut(key).unwrap();
        edit(obj);
        let meta = obj.meta_mut();
        meta.generation = Some(meta.generation.unwrap_or(0) + 1);
        meta.resource_version = Some(version);
    }

    /// Simulate `kubectl delete`: objects without finalizers vanish at once
    pub fn mark_deleted(&self, key: &ObjectKey) {
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let remove = match objects.get_mut(key) {
            Some(obj) => {
                obj.meta_mut().deletion_timestamp = Some(Time(chrono::Utc::now()));
                obj.meta_mut().resource_version = Some(version);
                obj.finalizers().is_empty()
            }
            None => false,
        };
        if remove {
            objects.remove(key);
        }
    }

    pub fn current(&self, key: &ObjectKey) -> Option<K> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn status(&self, key: &ObjectKey) -> Option<ServiceStatus> {
        self.current(key).and_then(|o| o.status().cloned())
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write(&self, obj: &K, change: impl FnOnce(&mut K) -> Result<()>) -> Result<K> {
        let key = ObjectKey::from_object(obj);
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| Error::StaleWrite(format!("{key} is gone")))?;
        if stored.resource_version() != obj.resource_version() {
            return Err(Error::StaleWrite(key.to_string()));
        }
        change(stored)?;
        stored.meta_mut().resource_version = Some(version);
        self.writes.fetch_add(1, Ordering::SeqCst);

        let updated = stored.clone();
        if updated.meta().deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            objects.remove(&key);
        }
        Ok(updated)
    }
}

/// JSON merge patch as the API server applies `Patch::Merge`: `null` removes
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[async_trait]
impl<K: ServiceKind> ObjectStore<K> for MemoryStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>> {
        Ok(self.current(key))
    }

    async fn patch_finalizers(&self, obj: &K, finalizers: Vec<String>) -> Result<K> {
        self.write(obj, |stored| {
            stored.meta_mut().finalizers = Some(finalizers);
            Ok(())
        })
    }

    async fn patch_status(&self, obj: &K, status: &ServiceStatus) -> Result<K> {
        let patch = status_patch(obj, status);
        self.write(obj, |stored| {
            let mut value = serde_json::to_value(&*stored)?;
            merge_patch(&mut value["status"], &patch["status"]);
            *stored = serde_json::from_value(value)?;
            Ok(())
        })
    }
}

/// Secret store that counts writes
#[derive(Default)]
pub struct MemorySecrets {
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    writes: AtomicUsize,
    failures: Mutex<usize>,
}

impl MemorySecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, secret: Secret) {
        let key = (secret.namespace().unwrap_or_default(), secret.name_any());
        self.secrets.lock().unwrap().insert(key, secret);
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Decoded data of a stored secret
    pub fn data(&self, namespace: &str, name: &str) -> Option<BTreeMap<String, String>> {
        self.secret(namespace, name).map(|s| {
            s.data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, String::from_utf8_lossy(&v.0).into_owned()))
                .collect()
        })
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next `n` applies fail
    pub fn fail_next_applies(&self, n: usize) {
        *self.failures.lock().unwrap() = n;
    }
}

#[async_trait]
impl SecretStore for MemorySecrets {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.secret(namespace, name))
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<()> {
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::ConfigError("secret apply rejected".to_string()));
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.insert(secret.clone());
        Ok(())
    }
}

/// Remote operation, used to script failures and read the call log
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Get,
    Update,
    Delete,
}

struct StubService {
    service: RemoteService,
    /// `get` calls left before a CREATING service turns RUNNING
    polls_until_running: u32,
}

/// Scripted stand-in for the provider API
///
/// Created services start in CREATING and report RUNNING after
/// `polls_until_running` reads.
pub struct StubClient {
    services: Mutex<HashMap<ServiceKey, StubService>>,
    failures: Mutex<HashMap<Op, VecDeque<RemoteError>>>,
    calls: Mutex<Vec<(Op, String)>>,
    polls_until_running: u32,
}

impl Default for StubClient {
    fn default() -> Self {
        Self::new(2)
    }
}

impl StubClient {
    pub fn new(polls_until_running: u32) -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            polls_until_running,
        }
    }

    /// Seed a service that already exists remotely
    pub fn insert(&self, project: &str, service: RemoteService) {
        let key = ServiceKey::new(project, service.service_name.clone());
        self.services.lock().unwrap().insert(
            key,
            StubService {
                service,
                polls_until_running: 0,
            },
        );
    }

    pub fn service(&self, key: &ServiceKey) -> Option<RemoteService> {
        self.services
            .lock()
            .unwrap()
            .get(key)
            .map(|s| s.service.clone())
    }

    pub fn set_state(&self, key: &ServiceKey, state: ServiceState) {
        if let Some(s) = self.services.lock().unwrap().get_mut(key) {
            s.service.state = state;
            s.polls_until_running = 0;
        }
    }

    /// Change a service out of band, e.g. through the provider console
    pub fn edit(&self, key: &ServiceKey, edit: impl FnOnce(&mut RemoteService)) {
        if let Some(s) = self.services.lock().unwrap().get_mut(key) {
            edit(&mut s.service);
        }
    }

    pub fn fail_next(&self, op: Op, err: RemoteError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(err);
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().iter().filter(|(o, _)| *o == op).count()
    }

    /// Number of create, update and delete calls made
    pub fn mutating_calls(&self) -> usize {
        self.calls(Op::Create) + self.calls(Op::Update) + self.calls(Op::Delete)
    }

    pub fn last_update(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(o, _)| *o == Op::Update)
            .map(|(_, detail)| detail.clone())
    }

    fn record(&self, op: Op, detail: String) -> std::result::Result<(), RemoteError> {
        self.calls.lock().unwrap().push((op, detail));
        match self.failures.lock().unwrap().get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn connection_for(name: &str) -> ConnectionInfo {
    let host = format!("{name}.aivencloud.com");
    ConnectionInfo {
        host: host.clone(),
        port: "12691".to_string(),
        database: "defaultdb".to_string(),
        user: "avnadmin".to_string(),
        password: format!("{name}-password"),
        ssl_mode: "require".to_string(),
        uri: format!("postgres://avnadmin:{name}-password@{host}:12691/defaultdb?sslmode=require"),
    }
}

fn merge_user_config(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_user_config(existing, nested)
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[async_trait]
impl ServiceClient for StubClient {
    async fn create(
        &self,
        key: &ServiceKey,
        request: &ServiceRequest,
    ) -> std::result::Result<RemoteService, RemoteError> {
        self.record(Op::Create, key.to_string())?;
        let mut services = self.services.lock().unwrap();
        if services.contains_key(key) {
            return Err(RemoteError::conflict(format!(
                "409 Service name {} is already in use",
                key.service_name
            )));
        }
        let service = RemoteService {
            service_name: key.service_name.clone(),
            service_type: request.service_type.clone(),
            plan: request.plan.clone(),
            cloud_name: request.cloud_name.clone(),
            state: ServiceState::Creating,
            maintenance: request.maintenance.clone(),
            termination_protection: request.termination_protection,
            user_config: request.user_config.clone(),
            tags: request.tags.clone(),
            connection: Some(connection_for(&key.service_name)),
        };
        services.insert(
            key.clone(),
            StubService {
                service: service.clone(),
                polls_until_running: self.polls_until_running,
            },
        );
        Ok(service)
    }

    async fn get(
        &self,
        key: &ServiceKey,
    ) -> std::result::Result<Option<RemoteService>, RemoteError> {
        self.record(Op::Get, key.to_string())?;
        let mut services = self.services.lock().unwrap();
        Ok(services.get_mut(key).map(|s| {
            if s.polls_until_running > 0 {
                s.polls_until_running -= 1;
                if s.polls_until_running == 0 && s.service.state == ServiceState::Creating {
                    s.service.state = ServiceState::Running;
                }
            }
            s.service.clone()
        }))
    }

    async fn update(
        &self,
        key: &ServiceKey,
        update: &ServiceUpdate,
    ) -> std::result::Result<RemoteService, RemoteError> {
        self.record(Op::Update, format!("{update:?}"))?;
        let mut services = self.services.lock().unwrap();
        let stub = services
            .get_mut(key)
            .ok_or_else(|| RemoteError::spec(format!("404 Service {key} not found")))?;
        let service = &mut stub.service;
        if let Some(plan) = &update.plan {
            service.plan = plan.clone();
        }
        if let Some(cloud) = &update.cloud_name {
            service.cloud_name = cloud.clone();
        }
        if let Some(window) = &update.maintenance {
            service.maintenance = Some(window.clone());
        }
        if let Some(protect) = update.termination_protection {
            service.termination_protection = protect;
        }
        if let Some(config) = &update.user_config {
            merge_user_config(&mut service.user_config, config);
        }
        Ok(service.clone())
    }

    async fn delete(&self, key: &ServiceKey) -> std::result::Result<bool, RemoteError> {
        self.record(Op::Delete, key.to_string())?;
        Ok(self.services.lock().unwrap().remove(key).is_some())
    }
}
