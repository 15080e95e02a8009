//! Prometheus metrics for the Aiven operator
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports the following metrics:
//! - `aiven_reconcile_duration_seconds` (histogram): reconcile duration labeled by kind.
//! - `aiven_reconcile_total` (counter): reconcile outcomes labeled by kind and outcome.
//! - `aiven_reconcile_errors_total` (counter): reconcile errors labeled by kind and error kind.
//! - `aiven_remote_errors_total` (counter): classified remote API errors labeled by kind and class.
//! - `aiven_backoff_objects` (gauge): objects currently retrying with backoff, per kind.

use std::sync::atomic::{AtomicI64, AtomicU64};

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Labels for per-kind metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabels {
    /// Resource kind, e.g. "PG"
    pub kind: String,
}

/// Labels for reconcile outcome metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub kind: String,
    /// "requeue", "backoff", "await_change" or "error"
    pub outcome: String,
}

/// Labels for operator error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub kind: String,
    /// Error category, e.g. "kube", "stale_write", "remote"
    pub error: String,
}

/// Labels for remote API error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RemoteErrorLabels {
    pub kind: String,
    /// Error class reason, e.g. "Retryable", "PermissionDenied"
    pub class: String,
}

/// Histogram tracking reconcile duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Family<KindLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

pub static RECONCILE_TOTAL: Lazy<Family<OutcomeLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static REMOTE_ERRORS_TOTAL: Lazy<Family<RemoteErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static BACKOFF_OBJECTS: Lazy<Family<KindLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "aiven_reconcile_duration_seconds",
        "Duration of reconcile loops in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "aiven_reconcile",
        "Total number of reconciles by outcome",
        RECONCILE_TOTAL.clone(),
    );
    registry.register(
        "aiven_reconcile_errors",
        "Total number of reconcile errors",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "aiven_remote_errors",
        "Total number of classified remote API errors",
        REMOTE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "aiven_backoff_objects",
        "Number of objects retrying with backoff",
        BACKOFF_OBJECTS.clone(),
    );

    registry
});

/// Observe a reconcile duration in seconds.
pub fn observe_reconcile_duration_seconds(kind: &str, seconds: f64) {
    let labels = KindLabels {
        kind: kind.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

pub fn inc_reconcile_outcome(kind: &str, outcome: &str) {
    let labels = OutcomeLabels {
        kind: kind.to_string(),
        outcome: outcome.to_string(),
    };
    RECONCILE_TOTAL.get_or_create(&labels).inc();
}

/// Increment the reconcile error counter.
pub fn inc_reconcile_error(kind: &str, error: &str) {
    let labels = ErrorLabels {
        kind: kind.to_string(),
        error: error.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_remote_error(kind: &str, class: &str) {
    let labels = RemoteErrorLabels {
        kind: kind.to_string(),
        class: class.to_string(),
    };
    REMOTE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn set_backoff_objects(kind: &str, count: usize) {
    let labels = KindLabels {
        kind: kind.to_string(),
    };
    BACKOFF_OBJECTS
        .get_or_create(&labels)
        .set(count as i64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn test_registry_exports_operator_metrics() {
        observe_reconcile_duration_seconds("PG", 0.25);
        inc_reconcile_outcome("PG", "requeue");
        inc_reconcile_error("PG", "stale_write");
        inc_remote_error("PG", "Retryable");
        set_backoff_objects("PG", 3);

        let mut buffer = String::new();
        encode(&mut buffer, &REGISTRY).unwrap();

        assert!(buffer.contains("aiven_reconcile_duration_seconds"));
        assert!(buffer.contains("aiven_reconcile_total"));
        assert!(buffer.contains("aiven_remote_errors_total"));
        assert!(buffer.contains("aiven_backoff_objects{kind=\"PG\"} 3"));
    }
}
