//! Error types for the Aiven operator

use thiserror::Error;

use crate::remote::RemoteError;

/// Errors surfaced by the operator
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// An optimistic-concurrency write lost against a newer version of the object
    #[error("{0} was modified since it was read")]
    StaleWrite(String),
}

impl Error {
    /// Whether the controller should retry with backoff rather than wait for a resync
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(_) | Error::HttpError(_) | Error::StaleWrite(_) => true,
            Error::Remote(e) => e.is_retryable(),
            Error::ConfigError(_) | Error::SerializationError(_) => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
