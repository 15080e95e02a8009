//! aiven-operator: Kubernetes operator for managed Aiven services
//!
//! This crate reconciles `PG` and `KafkaConnect` custom resources against the
//! Aiven API. Each object owns one remote service; the operator creates it,
//! converges configuration drift, mirrors its state onto the object's status
//! and publishes connection credentials as a Secret.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod remote;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::config::{OperatorConfig, RequeuePolicy};
pub use crate::error::{Error, Result};
