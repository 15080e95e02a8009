//! Shared types for managed service specifications
//!
//! These types are embedded in every service kind ([`PG`](super::PG),
//! [`KafkaConnect`](super::KafkaConnect)) and consumed by the controller.
//!
//! # Type Hierarchy
//!
//! - [`ServiceCommonSpec`] - project, plan, cloud and maintenance window shared by all kinds
//! - [`AuthSecretReference`] - Secret holding the API token used for a single object
//! - [`ServiceStatus`] - observed state mirrored from the remote service
//! - [`ServiceState`] - remote lifecycle state
//! - [`Condition`] - Kubernetes-style condition record

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Configuration shared by every managed service kind
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCommonSpec {
    /// Project the service lives in
    pub project: String,

    /// Remote service name; defaults to the object name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Subscription plan, e.g. `business-4`
    pub plan: String,

    /// Cloud and region, e.g. `google-europe-west1`
    pub cloud_name: String,

    /// Day of week for automatic maintenance, e.g. `sunday`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_window_dow: Option<String>,

    /// Time of day (UTC) for automatic maintenance, e.g. `12:00:00`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_window_time: Option<String>,

    /// Prevent the service from being powered off or deleted remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_protection: Option<bool>,

    /// Secret holding the API token for this service. The operator-wide token
    /// is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret_ref: Option<AuthSecretReference>,
}

/// Reference to a key inside a Secret in the object's namespace
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthSecretReference {
    pub name: String,
    pub key: String,
}

/// Remote lifecycle state of a managed service
///
/// Serialized as the upper-case name the remote API reports. Values the
/// operator does not know yet are kept verbatim in [`ServiceState::Unknown`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Creating,
    Rebuilding,
    Rebalancing,
    Running,
    PowerOff,
    Deleting,
    Unknown(String),
}

impl ServiceState {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceState::Creating => "CREATING",
            ServiceState::Rebuilding => "REBUILDING",
            ServiceState::Rebalancing => "REBALANCING",
            ServiceState::Running => "RUNNING",
            ServiceState::PowerOff => "POWEROFF",
            ServiceState::Deleting => "DELETING",
            ServiceState::Unknown(s) => s,
        }
    }

    pub fn is_running(&self) -> bool {
        *self == ServiceState::Running
    }

    /// Stable states are not expected to change without an external action
    pub fn is_stable(&self) -> bool {
        matches!(self, ServiceState::Running | ServiceState::PowerOff)
    }

    /// States in which the remote side refuses configuration changes
    pub fn accepts_updates(&self) -> bool {
        !matches!(self, ServiceState::Creating | ServiceState::Deleting)
    }
}

impl From<&str> for ServiceState {
    fn from(s: &str) -> Self {
        match s {
            "CREATING" => ServiceState::Creating,
            "REBUILDING" => ServiceState::Rebuilding,
            "REBALANCING" => ServiceState::Rebalancing,
            "RUNNING" => ServiceState::Running,
            "POWEROFF" => ServiceState::PowerOff,
            "DELETING" => ServiceState::Deleting,
            other => ServiceState::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ServiceState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ServiceState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ServiceState::from(s.as_str()))
    }
}

/// Status subresource shared by all managed service kinds
///
/// Everything except `conditions` is mirrored from the remote service and is
/// only ever written by the status projector. Unset fields serialize as `null`
/// so a merge patch clears values the remote side no longer reports.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// Remote lifecycle state (RUNNING, REBUILDING, POWEROFF, ...)
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub state: Option<ServiceState>,

    /// Conditions following Kubernetes conventions, at most one per type
    ///
    /// - Running: True when the remote service reports RUNNING
    /// - Failed: True when the last reconcile hit a terminal error
    /// - CredentialsReady: True when the connection Secret is up to date
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub service_name: Option<String>,

    #[serde(default)]
    pub plan: Option<String>,

    #[serde(default)]
    pub cloud_name: Option<String>,

    #[serde(default)]
    pub maintenance_window_dow: Option<String>,

    #[serde(default)]
    pub maintenance_window_time: Option<String>,

    /// Generation of the spec this status was projected for
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl ServiceStatus {
    pub fn get_condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == condition_type)
    }

    pub fn is_running(&self) -> bool {
        self.get_condition("Running")
            .map(|c| c.status == "True")
            .unwrap_or(false)
    }

    pub fn is_failed(&self) -> bool {
        self.get_condition("Failed")
            .map(|c| c.status == "True")
            .unwrap_or(false)
    }
}

/// Kubernetes-style condition
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Running", "Failed")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Structured validation error for service specs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
}

impl SpecValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Join validation errors into a single condition message
pub fn describe_validation_errors(errors: &[SpecValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

const DAYS_OF_WEEK: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

impl ServiceCommonSpec {
    /// Validate the fields every kind shares
    ///
    /// `service_name` is the effective remote name (explicit or derived from the
    /// object name).
    pub fn validate(&self, service_name: &str) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if self.project.trim().is_empty() {
            errors.push(SpecValidationError::new(
                "spec.project",
                "project must not be empty",
            ));
        }
        if self.plan.trim().is_empty() {
            errors.push(SpecValidationError::new("spec.plan", "plan must not be empty"));
        }
        if self.cloud_name.trim().is_empty() {
            errors.push(SpecValidationError::new(
                "spec.cloudName",
                "cloudName must not be empty",
            ));
        }
        if !is_valid_service_name(service_name) {
            errors.push(SpecValidationError::new(
                "spec.serviceName",
                format!(
                    "{service_name:?} must be 1-63 lowercase alphanumerics or '-', starting with a letter"
                ),
            ));
        }

        match (&self.maintenance_window_dow, &self.maintenance_window_time) {
            (Some(dow), Some(time)) => {
                if !DAYS_OF_WEEK.contains(&dow.as_str()) {
                    errors.push(SpecValidationError::new(
                        "spec.maintenanceWindowDow",
                        format!("{dow:?} is not a lowercase day of week"),
                    ));
                }
                if chrono::NaiveTime::parse_from_str(time, "%H:%M:%S").is_err() {
                    errors.push(SpecValidationError::new(
                        "spec.maintenanceWindowTime",
                        format!("{time:?} is not a HH:MM:SS time"),
                    ));
                }
            }
            (None, None) => {}
            _ => errors.push(SpecValidationError::new(
                "spec.maintenanceWindowDow / spec.maintenanceWindowTime",
                "maintenanceWindowDow and maintenanceWindowTime must be set together",
            )),
        }

        if let Some(auth) = &self.auth_secret_ref {
            if auth.name.is_empty() || auth.key.is_empty() {
                errors.push(SpecValidationError::new(
                    "spec.authSecretRef",
                    "authSecretRef needs both name and key",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_valid_service_name(name: &str) -> bool {
    let starts_with_letter = name
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase())
        .unwrap_or(false);
    starts_with_letter
        && name.len() <= 63
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
