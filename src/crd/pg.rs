//! PG Custom Resource Definition
//!
//! A `PG` object represents a managed PostgreSQL service. Once the service is
//! running its connection parameters are published as a Secret named after the
//! object.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{ServiceCommonSpec, ServiceStatus};
use super::user_config::insert_opt;

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "aiven.io",
    version = "v1alpha1",
    kind = "PG",
    namespaced,
    status = "ServiceStatus",
    shortname = "pg",
    printcolumn = r#"{"name":"Project","type":"string","jsonPath":".spec.project"}"#,
    printcolumn = r#"{"name":"Plan","type":"string","jsonPath":".spec.plan"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Running","type":"string","jsonPath":".status.conditions[?(@.type=='Running')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PGSpec {
    #[serde(flatten)]
    pub common: ServiceCommonSpec,

    #[serde(default)]
    pub pg_user_config: PGUserConfig,
}

/// PostgreSQL specific user configuration
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PGUserConfig {
    /// Major PostgreSQL version, e.g. `"12"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_access: Option<PublicAccessUserConfig>,

    /// CIDR ranges allowed to connect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_filter: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg: Option<PGSubPGUserConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccessUserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pg: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<bool>,
}

/// `postgresql.conf` parameters
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PGSubPGUserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_in_transaction_session_timeout: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_min_duration_statement: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl PGUserConfig {
    /// Render the wire form (snake_case keys) sent to the remote API
    ///
    /// Fields left unset are omitted so they are never touched remotely.
    pub fn to_wire(&self) -> Map<String, Value> {
        let mut out = Map::new();
        insert_opt(&mut out, "pg_version", self.pg_version.clone());
        insert_opt(&mut out, "ip_filter", self.ip_filter.clone());

        if let Some(access) = &self.public_access {
            let mut nested = Map::new();
            insert_opt(&mut nested, "pg", access.pg);
            insert_opt(&mut nested, "prometheus", access.prometheus);
            if !nested.is_empty() {
                out.insert("public_access".to_string(), Value::Object(nested));
            }
        }

        if let Some(pg) = &self.pg {
            let mut nested = Map::new();
            insert_opt(
                &mut nested,
                "idle_in_transaction_session_timeout",
                pg.idle_in_transaction_session_timeout,
            );
            insert_opt(&mut nested, "max_connections", pg.max_connections);
            insert_opt(
                &mut nested,
                "log_min_duration_statement",
                pg.log_min_duration_statement,
            );
            insert_opt(&mut nested, "timezone", pg.timezone.clone());
            if !nested.is_empty() {
                out.insert("pg".to_string(), Value::Object(nested));
            }
        }

        out
    }
}
