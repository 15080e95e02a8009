//! Response bodies for the REST API

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

/// One managed service object as seen by the operator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub project: String,
    pub service_name: String,
    /// Last observed remote state, absent until the first status write
    pub state: Option<String>,
    pub running: bool,
    pub failed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceListResponse {
    pub items: Vec<ServiceSummary>,
    pub total: usize,
}
