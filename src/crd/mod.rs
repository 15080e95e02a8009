//! Custom Resource Definitions for the Aiven operator
//!
//! Each managed service kind is its own CRD in the `aiven.io` group and shares
//! [`ServiceCommonSpec`] and [`ServiceStatus`].

pub mod kafka_connect;
pub mod pg;
pub mod types;
mod user_config;


pub use kafka_connect::{
    KafkaConnect, KafkaConnectPublicAccess, KafkaConnectSpec, KafkaConnectSubConfig,
    KafkaConnectUserConfig,
};
pub use pg::{PGSpec, PGSubPGUserConfig, PGUserConfig, PublicAccessUserConfig, PG};
pub use types::*;
pub use user_config::user_config_diff;

use kube::CustomResourceExt;

/// Render every CRD as a multi-document YAML stream
pub fn render_crds() -> Result<String, serde_yaml::Error> {
    let docs = [PG::crd(), KafkaConnect::crd()]
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(docs.join("---\n"))
}
