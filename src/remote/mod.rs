//! Client abstraction over the managed-service provider API
//!
//! The controller only talks to the provider through [`ServiceClient`]. Every
//! failure is classified into an [`ErrorClass`] so the engine can decide
//! between retrying and surfacing a terminal condition.

pub mod aiven;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crd::ServiceState;

pub use aiven::AivenClient;

/// Tag recording which Kubernetes object owns a remote service
///
/// The value is `<namespace>/<name>`.
pub const OWNER_TAG: &str = "k8s-owner";

/// Identifies a remote service
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub project: String,
    pub service_name: String,
}

impl ServiceKey {
    pub fn new(project: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            service_name: service_name.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.service_name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct MaintenanceWindow {
    pub dow: String,
    pub time: String,
}

/// Desired state of a service as sent on create
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceRequest {
    pub service_type: String,
    pub plan: String,
    pub cloud_name: String,
    pub maintenance: Option<MaintenanceWindow>,
    pub termination_protection: bool,
    pub user_config: Map<String, Value>,
    pub tags: BTreeMap<String, String>,
}

/// Partial update; only the fields that are set are sent
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceUpdate {
    pub plan: Option<String>,
    pub cloud_name: Option<String>,
    pub maintenance: Option<MaintenanceWindow>,
    pub termination_protection: Option<bool>,
    pub user_config: Option<Map<String, Value>>,
}

impl ServiceUpdate {
    pub fn is_empty(&self) -> bool {
        self.plan.is_none()
            && self.cloud_name.is_none()
            && self.maintenance.is_none()
            && self.termination_protection.is_none()
            && self.user_config.is_none()
    }
}

/// Connection parameters reported by a running service
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub ssl_mode: String,
    pub uri: String,
}

/// Snapshot of a remote service
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteService {
    pub service_name: String,
    pub service_type: String,
    pub plan: String,
    pub cloud_name: String,
    pub state: ServiceState,
    pub maintenance: Option<MaintenanceWindow>,
    pub termination_protection: bool,
    pub user_config: Map<String, Value>,
    pub tags: BTreeMap<String, String>,
    pub connection: Option<ConnectionInfo>,
}

impl RemoteService {
    /// Whether the service carries the given owner identity
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.tags.get(OWNER_TAG).map(String::as_str) == Some(owner)
    }
}

/// How a remote failure should be handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; retry with backoff
    Retryable,
    /// The request was rejected as invalid
    TerminalSpec,
    /// The credentials lack access
    TerminalPermission,
    /// The name is taken by something we do not own
    TerminalConflict,
}

impl ErrorClass {
    /// Condition reason used when this class is surfaced on an object
    pub fn reason(&self) -> &'static str {
        match self {
            ErrorClass::Retryable => "Retryable",
            ErrorClass::TerminalSpec => "InvalidSpec",
            ErrorClass::TerminalPermission => "PermissionDenied",
            ErrorClass::TerminalConflict => "NameConflict",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    pub class: ErrorClass,
    pub message: String,
}

impl RemoteError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Retryable, message)
    }

    pub fn spec(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::TerminalSpec, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::TerminalPermission, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::TerminalConflict, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.class == ErrorClass::Retryable
    }
}

/// Operations the engine needs from the provider
///
/// Implementations never retry on their own; retries are scheduled by the
/// controller so that backoff stays per object.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    async fn create(
        &self,
        key: &ServiceKey,
        request: &ServiceRequest,
    ) -> Result<RemoteService, RemoteError>;

    /// `Ok(None)` when the service does not exist
    async fn get(&self, key: &ServiceKey) -> Result<Option<RemoteService>, RemoteError>;

    async fn update(
        &self,
        key: &ServiceKey,
        update: &ServiceUpdate,
    ) -> Result<RemoteService, RemoteError>;

    /// `Ok(false)` when the service was already gone
    async fn delete(&self, key: &ServiceKey) -> Result<bool, RemoteError>;
}

/// Builds clients bound to a per-object API token
pub trait ClientFactory: Send + Sync {
    fn for_token(&self, token: &str) -> Arc<dyn ServiceClient>;
}
