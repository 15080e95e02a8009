//! KafkaConnect Custom Resource Definition
//!
//! A `KafkaConnect` object represents a managed Kafka Connect cluster. It has
//! no connection Secret; consumers talk to it through its parent Kafka service.

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
    kind = "KafkaConnect",
    namespaced,
    status = "ServiceStatus",
    shortname = "kc",
    printcolumn = r#"{"name":"Project","type":"string","jsonPath":".spec.project"}"#,
    printcolumn = r#"{"name":"Plan","type":"string","jsonPath":".spec.plan"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConnectSpec {
    #[serde(flatten)]
    pub common: ServiceCommonSpec,

    #[serde(default)]
    pub kafka_connect_user_config: KafkaConnectUserConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConnectUserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_filter: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_access: Option<KafkaConnectPublicAccess>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka_connect: Option<KafkaConnectSubConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConnectPublicAccess {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka_connect: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<bool>,
}

/// Worker settings for the Connect cluster
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConnectSubConfig {
    /// `read_committed` or `read_uncommitted`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_isolation_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_max_poll_records: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_flush_interval_ms: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout_ms: Option<i64>,
}

impl KafkaConnectUserConfig {
    pub fn to_wire(&self) -> Map<String, Value> {
        let mut out = Map::new();
        insert_opt(&mut out, "ip_filter", self.ip_filter.clone());

        if let Some(access) = &self.public_access {
            let mut nested = Map::new();
            insert_opt(&mut nested, "kafka_connect", access.kafka_connect);
            insert_opt(&mut nested, "prometheus", access.prometheus);
            if !nested.is_empty() {
                out.insert("public_access".to_string(), Value::Object(nested));
            }
        }

        if let Some(kc) = &self.kafka_connect {
            let mut nested = Map::new();
            insert_opt(
                &mut nested,
                "consumer_isolation_level",
                kc.consumer_isolation_level.clone(),
            );
            insert_opt(
                &mut nested,
                "consumer_max_poll_records",
                kc.consumer_max_poll_records,
            );
            insert_opt(
                &mut nested,
                "offset_flush_interval_ms",
                kc.offset_flush_interval_ms,
            );
            insert_opt(&mut nested, "session_timeout_ms", kc.session_timeout_ms);
            if !nested.is_empty() {
                out.insert("kafka_connect".to_string(), Value::Object(nested));
            }
        }

        out
    }
}
