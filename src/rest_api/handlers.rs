//! HTTP handlers for the REST API

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use kube::api::Api;
use kube::ResourceExt;
use tracing::{error, instrument};

use crate::controller::{ControllerState, ServiceKind};
use crate::crd::{KafkaConnect, PG};

use super::dto::{ErrorResponse, HealthResponse, ServiceListResponse, ServiceSummary};

/// Health check endpoint
#[instrument]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List all managed services in the watched scope
#[instrument(skip(state))]
pub async fn list_services(
    State(state): State<Arc<ControllerState>>,
) -> Result<Json<ServiceListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let mut items = list_kind::<PG>(&state).await?;
    items.extend(list_kind::<KafkaConnect>(&state).await?);

    let total = items.len();
    Ok(Json(ServiceListResponse { items, total }))
}

async fn list_kind<K: ServiceKind>(
    state: &ControllerState,
) -> Result<Vec<ServiceSummary>, (StatusCode, Json<ErrorResponse>)> {
    let api: Api<K> = match &state.config.watch_namespace {
        Some(ns) => Api::namespaced(state.client.clone(), ns),
        None => Api::all(state.client.clone()),
    };

    match api.list(&Default::default()).await {
        Ok(list) => Ok(list.items.iter().map(summarize).collect()),
        Err(e) => {
            error!("Failed to list {}: {:?}", K::kind(&()), e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("list_failed", &e.to_string())),
            ))
        }
    }
}

pub(crate) fn summarize<K: ServiceKind>(obj: &K) -> ServiceSummary {
    let status = obj.status();
    ServiceSummary {
        kind: K::kind(&()).to_string(),
        name: obj.name_any(),
        namespace: obj.namespace().unwrap_or_default(),
        project: obj.common().project.clone(),
        service_name: obj.service_name(),
        state: status.and_then(|s| s.state.as_ref()).map(ToString::to_string),
        running: status.map(|s| s.is_running()).unwrap_or(false),
        failed: status.map(|s| s.is_failed()).unwrap_or(false),
    }
}
