//! Per-kind behaviour plugged into the generic reconciliation engine

use std::collections::BTreeMap;
use std::fmt::Debug;

use kube::core::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::crd::{
    KafkaConnect, ServiceCommonSpec, ServiceStatus, SpecValidationError, PG,
};
use crate::remote::{ConnectionInfo, MaintenanceWindow, ServiceKey, ServiceRequest, OWNER_TAG};

/// A managed service kind the engine can reconcile
///
/// Implementations only describe the kind; all lifecycle logic lives in the
/// engine.
pub trait ServiceKind:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Remote service type, e.g. `pg`
    const SERVICE_TYPE: &'static str;

    fn common(&self) -> &ServiceCommonSpec;

    fn status(&self) -> Option<&ServiceStatus>;

    /// Kind-specific user configuration in remote wire form
    fn user_config(&self) -> Map<String, Value>;

    /// Keys of the Credential Bundle; empty when the kind has none
    fn credential_keys() -> &'static [&'static str] {
        &[]
    }

    /// Credential Bundle contents derived from connection parameters
    fn credentials(&self, _conn: &ConnectionInfo) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Effective remote name: `spec.serviceName` or the object name
    fn service_name(&self) -> String {
        self.common()
            .service_name
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.name_any())
    }

    fn service_key(&self) -> ServiceKey {
        ServiceKey::new(self.common().project.clone(), self.service_name())
    }

    /// Identity recorded in the remote owner tag
    fn owner_identity(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }

    fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        self.common().validate(&self.service_name())
    }

    /// Full desired state sent on create
    fn build_desired_spec(&self) -> ServiceRequest {
        let common = self.common();
        let mut tags = BTreeMap::new();
        tags.insert(OWNER_TAG.to_string(), self.owner_identity());
        ServiceRequest {
            service_type: Self::SERVICE_TYPE.to_string(),
            plan: common.plan.clone(),
            cloud_name: common.cloud_name.clone(),
            maintenance: desired_maintenance(common),
            termination_protection: common.termination_protection.unwrap_or(false),
            user_config: self.user_config(),
            tags,
        }
    }
}

pub(crate) fn desired_maintenance(common: &ServiceCommonSpec) -> Option<MaintenanceWindow> {
    match (&common.maintenance_window_dow, &common.maintenance_window_time) {
        (Some(dow), Some(time)) => Some(MaintenanceWindow {
            dow: dow.clone(),
            time: time.clone(),
        }),
        _ => None,
    }
}

/// Secret keys published for a PG service
pub const PG_CREDENTIAL_KEYS: &[&str] = &[
    "PGHOST",
    "PGPORT",
    "PGDATABASE",
    "PGUSER",
    "PGPASSWORD",
    "PGSSLMODE",
    "DATABASE_URI",
];

impl ServiceKind for PG {
    const SERVICE_TYPE: &'static str = "pg";

    fn common(&self) -> &ServiceCommonSpec {
        &self.spec.common
    }

    fn status(&self) -> Option<&ServiceStatus> {
        self.status.as_ref()
    }

    fn user_config(&self) -> Map<String, Value> {
        self.spec.pg_user_config.to_wire()
    }

    fn credential_keys() -> &'static [&'static str] {
        PG_CREDENTIAL_KEYS
    }

    fn credentials(&self, conn: &ConnectionInfo) -> BTreeMap<String, String> {
        [
            ("PGHOST", &conn.host),
            ("PGPORT", &conn.port),
            ("PGDATABASE", &conn.database),
            ("PGUSER", &conn.user),
            ("PGPASSWORD", &conn.password),
            ("PGSSLMODE", &conn.ssl_mode),
            ("DATABASE_URI", &conn.uri),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }
}

impl ServiceKind for KafkaConnect {
    const SERVICE_TYPE: &'static str = "kafka_connect";

    fn common(&self) -> &ServiceCommonSpec {
        &self.spec.common
    }

    fn status(&self) -> Option<&ServiceStatus> {
        self.status.as_ref()
    }

    fn user_config(&self) -> Map<String, Value> {
        self.spec.kafka_connect_user_config.to_wire()
    }
}
