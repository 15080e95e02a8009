//! HTTP client for the Aiven REST API (v1)
//!
//! Responses wrap the service under a `service` key. Connection parameters are
//! read from `service_uri_params`, where the port is reported as a string.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{
    ClientFactory, ConnectionInfo, MaintenanceWindow, RemoteError, RemoteService, ServiceClient,
    ServiceKey, ServiceRequest, ServiceUpdate,
};
use crate::crd::ServiceState;

pub const DEFAULT_API_URL: &str = "https://api.aiven.io";

/// Thin wrapper over `reqwest::Client` bound to one API token
#[derive(Clone)]
pub struct AivenClient {
    http: Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for AivenClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AivenClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AivenClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("aiven-operator/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("aivenv1 {}", self.token))
    }

    fn service_path(key: &ServiceKey) -> String {
        format!("/v1/project/{}/service/{}", key.project, key.service_name)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        builder.send().await.map_err(classify_transport)
    }

    async fn read_service(response: Response) -> Result<RemoteService, RemoteError> {
        let envelope: ServiceEnvelope = response
            .json()
            .await
            .map_err(|e| RemoteError::retryable(format!("malformed service response: {e}")))?;
        Ok(envelope.service.into())
    }
}

#[async_trait]
impl ServiceClient for AivenClient {
    async fn create(
        &self,
        key: &ServiceKey,
        request: &ServiceRequest,
    ) -> Result<RemoteService, RemoteError> {
        let body = CreateBody {
            service_name: &key.service_name,
            service_type: &request.service_type,
            plan: &request.plan,
            cloud: &request.cloud_name,
            maintenance: request.maintenance.as_ref(),
            termination_protection: request.termination_protection,
            user_config: &request.user_config,
            tags: &request.tags,
        };
        debug!("Creating service {}", key);
        let response = self
            .send(
                self.request(Method::POST, &format!("/v1/project/{}/service", key.project))
                    .json(&body),
            )
            .await?;
        let response = check_status(response).await?;
        Self::read_service(response).await
    }

    async fn get(&self, key: &ServiceKey) -> Result<Option<RemoteService>, RemoteError> {
        let response = self
            .send(self.request(Method::GET, &Self::service_path(key)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        Self::read_service(response).await.map(Some)
    }

    async fn update(
        &self,
        key: &ServiceKey,
        update: &ServiceUpdate,
    ) -> Result<RemoteService, RemoteError> {
        let body = UpdateBody {
            plan: update.plan.as_deref(),
            cloud: update.cloud_name.as_deref(),
            maintenance: update.maintenance.as_ref(),
            termination_protection: update.termination_protection,
            user_config: update.user_config.as_ref(),
        };
        debug!("Updating service {}", key);
        let response = self
            .send(self.request(Method::PUT, &Self::service_path(key)).json(&body))
            .await?;
        let response = check_status(response).await?;
        Self::read_service(response).await
    }

    async fn delete(&self, key: &ServiceKey) -> Result<bool, RemoteError> {
        debug!("Deleting service {}", key);
        let response = self
            .send(self.request(Method::DELETE, &Self::service_path(key)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }
}

impl ClientFactory for AivenClient {
    fn for_token(&self, token: &str) -> Arc<dyn ServiceClient> {
        Arc::new(Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: token.to_string(),
        })
    }
}

/// Map a non-success response to a classified error
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| body.trim().to_string());
    let message = format!("{} {}", status.as_u16(), message);
    let error = classify_status(status, message);
    if error.is_retryable() {
        warn!("Remote API returned {}", error);
    }
    Err(error)
}

pub(crate) fn classify_status(status: StatusCode, message: String) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::permission(message),
        StatusCode::CONFLICT => RemoteError::conflict(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::retryable(message)
        }
        s if s.is_server_error() => RemoteError::retryable(message),
        s if s.is_client_error() => RemoteError::spec(message),
        _ => RemoteError::retryable(message),
    }
}

fn classify_transport(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::retryable(format!("request timed out: {err}"))
    } else {
        RemoteError::retryable(format!("transport error: {err}"))
    }
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Serialize)]
struct CreateBody<'a> {
    service_name: &'a str,
    service_type: &'a str,
    plan: &'a str,
    cloud: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    maintenance: Option<&'a MaintenanceWindow>,
    termination_protection: bool,
    user_config: &'a Map<String, Value>,
    tags: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct UpdateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cloud: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maintenance: Option<&'a MaintenanceWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    termination_protection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_config: Option<&'a Map<String, Value>>,
}

#[derive(Deserialize)]
struct ServiceEnvelope {
    service: ServiceBody,
}

#[derive(Deserialize)]
struct ServiceBody {
    service_name: String,
    #[serde(default)]
    service_type: String,
    #[serde(default)]
    plan: String,
    #[serde(default)]
    cloud_name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    maintenance: Option<MaintenanceWindow>,
    #[serde(default)]
    termination_protection: bool,
    #[serde(default)]
    user_config: Map<String, Value>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    service_uri: Option<String>,
    #[serde(default)]
    service_uri_params: Option<UriParams>,
}

#[derive(Deserialize)]
struct UriParams {
    #[serde(default)]
    host: String,
    #[serde(default, deserialize_with = "string_or_number")]
    port: String,
    #[serde(default)]
    dbname: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    sslmode: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

impl From<ServiceBody> for RemoteService {
    fn from(body: ServiceBody) -> Self {
        let connection = body.service_uri_params.map(|p| ConnectionInfo {
            host: p.host,
            port: p.port,
            database: p.dbname,
            user: p.user,
            password: p.password,
            ssl_mode: p.sslmode,
            uri: body.service_uri.clone().unwrap_or_default(),
        });
        RemoteService {
            service_name: body.service_name,
            service_type: body.service_type,
            plan: body.plan,
            cloud_name: body.cloud_name,
            state: ServiceState::from(body.state.as_str()),
            maintenance: body.maintenance,
            termination_protection: body.termination_protection,
            user_config: body.user_config,
            tags: body.tags,
            connection,
        }
    }
}
