//! Controller module for managed service reconciliation
//!
//! This module contains the controller runtime, the reconciliation engine,
//! and the Kubernetes-side plumbing for status, finalizers and secrets.

pub mod conditions;
pub mod dispatcher;
pub mod engine;
pub mod finalizers;
pub mod kind;
#[cfg(feature = "metrics")]
pub mod metrics;
mod reconciler;
pub mod secrets;
pub mod status;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{classify_error, error_policy, reconcile, Context};
pub use engine::{desired_update, Action, Engine};
pub use finalizers::SERVICE_FINALIZER;
pub use kind::ServiceKind;
pub use reconciler::{run_controller, ControllerState};
pub use store::{KubeStore, ObjectKey, ObjectStore, SecretStore, FIELD_MANAGER};
