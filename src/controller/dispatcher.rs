//! Glue between kube's controller runtime and the engine
//!
//! The runtime merges triggers per object, runs at most one reconcile per
//! object at a time and owns the requeue schedule. This module turns the
//! engine's [`Action`] into a runtime action and keeps the per-object backoff
//! counter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use kube::runtime::controller::Action as RuntimeAction;
use tracing::{error, warn};

use crate::config::RequeuePolicy;
use crate::error::{Error, Result};

use super::engine::{Action, Engine};
use super::kind::ServiceKind;
use super::store::ObjectKey;

/// Directive for an error the engine could not turn into an [`Action`]
///
/// Retriable errors back off; anything else waits for the next resync.
pub fn classify_error(error: &Error, policy: &RequeuePolicy) -> Action {
    if error.is_retriable() {
        Action::Backoff
    } else {
        Action::Requeue(policy.resync_interval)
    }
}

/// Shared state handed to every reconcile of one kind
pub struct Context<K: ServiceKind> {
    engine: Engine<K>,
    attempts: Mutex<HashMap<ObjectKey, u32>>,
}

impl<K: ServiceKind> Context<K> {
    pub fn new(engine: Engine<K>) -> Self {
        Self {
            engine,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Run the engine for `key` and return the delay until its next run
    pub async fn process(&self, key: &ObjectKey) -> Result<Option<Duration>> {
        let started = Instant::now();
        let result = self.engine.reconcile(key).await;
        record_metrics::<K>(&result, started.elapsed());
        Ok(self.next_delay(key, result?))
    }

    /// Delay after a reconcile of `key` failed with `error`
    pub fn handle_error(&self, key: &ObjectKey, error: &Error) -> Option<Duration> {
        error!("Reconciliation error for {}: {}", key, error);
        self.next_delay(key, classify_error(error, self.engine.policy()))
    }

    /// `None` means wait for the object to change
    fn next_delay(&self, key: &ObjectKey, action: Action) -> Option<Duration> {
        let policy = self.engine.policy();
        let mut attempts = self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let delay = match action {
            Action::Backoff => {
                let attempt = attempts.entry(key.clone()).or_insert(0);
                let delay = policy.backoff(*attempt);
                *attempt = attempt.saturating_add(1);
                warn!("Backing off {} for {:?} (attempt {})", key, delay, attempt);
                Some(delay)
            }
            Action::Requeue(delay) => {
                attempts.remove(key);
                Some(delay)
            }
            Action::AwaitChange => {
                attempts.remove(key);
                None
            }
        };

        #[cfg(feature = "metrics")]
        super::metrics::set_backoff_objects(&K::kind(&()), attempts.len());
        delay
    }
}

fn to_runtime(delay: Option<Duration>) -> RuntimeAction {
    match delay {
        Some(delay) => RuntimeAction::requeue(delay),
        None => RuntimeAction::await_change(),
    }
}

/// Reconcile function handed to [`kube::runtime::Controller::run`]
///
/// Only the identity of `obj` is used; the engine re-reads the object.
pub async fn reconcile<K: ServiceKind>(
    obj: Arc<K>,
    ctx: Arc<Context<K>>,
) -> Result<RuntimeAction> {
    let key = ObjectKey::from_object(obj.as_ref());
    ctx.process(&key).await.map(to_runtime)
}

/// Error policy handed to [`kube::runtime::Controller::run`]
pub fn error_policy<K: ServiceKind>(
    obj: Arc<K>,
    error: &Error,
    ctx: Arc<Context<K>>,
) -> RuntimeAction {
    let key = ObjectKey::from_object(obj.as_ref());
    to_runtime(ctx.handle_error(&key, error))
}

#[cfg(feature = "metrics")]
fn record_metrics<K: ServiceKind>(result: &Result<Action>, elapsed: Duration) {
    use super::metrics;

    let kind = K::kind(&());
    metrics::observe_reconcile_duration_seconds(&kind, elapsed.as_secs_f64());
    let outcome = match result {
        Ok(Action::Requeue(_)) => "requeue",
        Ok(Action::Backoff) => "backoff",
        Ok(Action::AwaitChange) => "await_change",
        Err(e) => {
            metrics::inc_reconcile_error(&kind, error_kind(e));
            "error"
        }
    };
    metrics::inc_reconcile_outcome(&kind, outcome);
}

#[cfg(not(feature = "metrics"))]
fn record_metrics<K: ServiceKind>(_result: &Result<Action>, _elapsed: Duration) {}

#[cfg(feature = "metrics")]
fn error_kind(error: &Error) -> &'static str {
    match error {
        Error::KubeError(_) => "kube",
        Error::Remote(_) => "remote",
        Error::ConfigError(_) => "config",
        Error::SerializationError(_) => "serialization",
        Error::HttpError(_) => "http",
        Error::StaleWrite(_) => "stale_write",
    }
}
