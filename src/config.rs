//! Runtime configuration for the operator
//!
//! Values come from CLI flags or their environment variables (see `main.rs`)
//! and are validated once at startup.

use std::net::SocketAddr;
use std::time::Duration;

use crate::crd::ServiceState;
use crate::error::{Error, Result};
use crate::remote::aiven::DEFAULT_API_URL;

/// Requeue intervals and retry backoff
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequeuePolicy {
    /// Delay between polls while the remote service is transitioning
    pub poll_interval: Duration,
    /// Delay between checks once the service is stable, and after terminal errors
    pub resync_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RequeuePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            resync_interval: Duration::from_secs(30 * 60),
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl RequeuePolicy {
    /// Next check for an object whose remote service is in `state`
    pub fn interval_for(&self, state: Option<&ServiceState>) -> Duration {
        match state {
            Some(s) if s.is_stable() => self.resync_interval,
            _ => self.poll_interval,
        }
    }

    /// Exponential backoff: base * 2^attempt, capped at the maximum
    ///
    /// `attempt` starts at 0 for the first retry.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.backoff_base
            .checked_mul(factor)
            .map(|d| d.min(self.backoff_max))
            .unwrap_or(self.backoff_max)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::ConfigError(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.resync_interval < self.poll_interval {
            return Err(Error::ConfigError(format!(
                "resync interval ({}s) must not be shorter than poll interval ({}s)",
                self.resync_interval.as_secs(),
                self.poll_interval.as_secs()
            )));
        }
        if self.backoff_base.is_zero() {
            return Err(Error::ConfigError(
                "backoff base must be greater than zero".to_string(),
            ));
        }
        if self.backoff_max < self.backoff_base {
            return Err(Error::ConfigError(format!(
                "backoff max ({}s) must not be shorter than backoff base ({}s)",
                self.backoff_max.as_secs(),
                self.backoff_base.as_secs()
            )));
        }
        Ok(())
    }
}

/// Validated operator configuration
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Default API token, used for objects without `authSecretRef`
    pub api_token: String,
    pub api_url: String,
    /// Restrict watches to one namespace; all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Number of concurrent reconcile workers per kind
    pub workers: usize,
    pub requeue: RequeuePolicy,
    pub request_timeout: Duration,
    pub metrics_addr: SocketAddr,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            watch_namespace: None,
            workers: 4,
            requeue: RequeuePolicy::default(),
            request_timeout: Duration::from_secs(30),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl OperatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            return Err(Error::ConfigError("AIVEN_TOKEN must be set".to_string()));
        }
        if self.workers == 0 {
            return Err(Error::ConfigError(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::ConfigError(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(Error::ConfigError(format!(
                "API URL {:?} must be an http(s) URL",
                self.api_url
            )));
        }
        self.requeue.validate()
    }
}
