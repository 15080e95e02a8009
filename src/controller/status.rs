//! Status projection from a remote service snapshot
//!
//! All functions here are pure: they take the previous status and a clock
//! reading and return the next status. The engine compares the result with
//! what is stored and skips the write when nothing changed.

use crate::crd::ServiceStatus;
use crate::remote::RemoteService;

use super::conditions::{
    find_condition, set_condition, CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE,
    CONDITION_TYPE_CREDENTIALS_READY, CONDITION_TYPE_FAILED, CONDITION_TYPE_RUNNING,
};

/// Project a remote snapshot onto the object's status
///
/// `remote` is `None` when the service does not exist (yet). Observed fields
/// are taken from the snapshot; conditions other than `Running` are carried
/// over from `previous`.
pub fn project_status(
    previous: Option<&ServiceStatus>,
    remote: Option<&RemoteService>,
    observed_generation: Option<i64>,
    now: &str,
) -> ServiceStatus {
    let mut status = previous.cloned().unwrap_or_default();
    status.observed_generation = observed_generation;

    match remote {
        Some(service) => {
            status.state = Some(service.state.clone());
            status.service_name = Some(service.service_name.clone());
            status.plan = Some(service.plan.clone());
            status.cloud_name = Some(service.cloud_name.clone());
            status.maintenance_window_dow = service.maintenance.as_ref().map(|m| m.dow.clone());
            status.maintenance_window_time =
                service.maintenance.as_ref().map(|m| m.time.clone());

            if service.state.is_running() {
                set_condition(
                    &mut status.conditions,
                    CONDITION_TYPE_RUNNING,
                    CONDITION_STATUS_TRUE,
                    service.state.as_str(),
                    "Service is running",
                    observed_generation,
                    now,
                );
            } else {
                set_condition(
                    &mut status.conditions,
                    CONDITION_TYPE_RUNNING,
                    CONDITION_STATUS_FALSE,
                    service.state.as_str(),
                    &format!("Service is {}", service.state),
                    observed_generation,
                    now,
                );
            }
        }
        None => {
            status.state = None;
            set_condition(
                &mut status.conditions,
                CONDITION_TYPE_RUNNING,
                CONDITION_STATUS_FALSE,
                "NotFound",
                "Service does not exist",
                observed_generation,
                now,
            );
        }
    }

    status
}

/// Record a terminal error as `Failed=True`
pub fn set_failure(status: &mut ServiceStatus, reason: &str, message: &str, now: &str) {
    let generation = status.observed_generation;
    set_condition(
        &mut status.conditions,
        CONDITION_TYPE_FAILED,
        CONDITION_STATUS_TRUE,
        reason,
        message,
        generation,
        now,
    );
}

/// Flip an existing `Failed` condition back to False
///
/// Objects that never failed get no `Failed` condition at all.
pub fn clear_failure(status: &mut ServiceStatus, now: &str) {
    if find_condition(&status.conditions, CONDITION_TYPE_FAILED).is_none() {
        return;
    }
    let generation = status.observed_generation;
    set_condition(
        &mut status.conditions,
        CONDITION_TYPE_FAILED,
        CONDITION_STATUS_FALSE,
        "Reconciled",
        "Last reconcile succeeded",
        generation,
        now,
    );
}

pub fn set_credentials_condition(status: &mut ServiceStatus, ready: bool, message: &str, now: &str) {
    let generation = status.observed_generation;
    let (value, reason) = if ready {
        (CONDITION_STATUS_TRUE, "SecretUpToDate")
    } else {
        (CONDITION_STATUS_FALSE, "SecretNotReady")
    };
    set_condition(
        &mut status.conditions,
        CONDITION_TYPE_CREDENTIALS_READY,
        value,
        reason,
        message,
        generation,
        now,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ServiceState;
    use crate::remote::MaintenanceWindow;
    use serde_json::Map;
    use std::collections::BTreeMap;

    const T0: &str = "2024-01-01T00:00:00+00:00";
    const T1: &str = "2024-01-01T00:05:00+00:00";

    fn snapshot(state: ServiceState) -> RemoteService {
        RemoteService {
            service_name: "pg-1".to_string(),
            service_type: "pg".to_string(),
            plan: "business-4".to_string(),
            cloud_name: "google-europe-west1".to_string(),
            state,
            maintenance: Some(MaintenanceWindow {
                dow: "friday".to_string(),
                time: "23:00:00".to_string(),
            }),
            termination_protection: false,
            user_config: Map::new(),
            tags: BTreeMap::new(),
            connection: None,
        }
    }

    #[test]
    fn test_running_projection() {
        let status = project_status(None, Some(&snapshot(ServiceState::Running)), Some(3), T0);

        assert_eq!(status.state, Some(ServiceState::Running));
        assert_eq!(status.service_name.as_deref(), Some("pg-1"));
        assert_eq!(status.plan.as_deref(), Some("business-4"));
        assert_eq!(status.cloud_name.as_deref(), Some("google-europe-west1"));
        assert_eq!(status.maintenance_window_dow.as_deref(), Some("friday"));
        assert_eq!(status.maintenance_window_time.as_deref(), Some("23:00:00"));
        assert_eq!(status.observed_generation, Some(3));
        assert!(status.is_running());
    }

    #[test]
    fn test_transitional_state_reason() {
        let status = project_status(None, Some(&snapshot(ServiceState::Rebuilding)), None, T0);
        let running = status.get_condition(CONDITION_TYPE_RUNNING).unwrap();
        assert_eq!(running.status, CONDITION_STATUS_FALSE);
        assert_eq!(running.reason, "REBUILDING");
    }

    #[test]
    fn test_missing_service_is_not_found() {
        let status = project_status(None, None, Some(1), T0);
        assert_eq!(status.state, None);
        let running = status.get_condition(CONDITION_TYPE_RUNNING).unwrap();
        assert_eq!(running.reason, "NotFound");
    }

    #[test]
    fn test_projection_is_deterministic() {
        let remote = snapshot(ServiceState::Running);
        let first = project_status(None, Some(&remote), Some(1), T0);
        let second = project_status(Some(&first), Some(&remote), Some(1), T1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_transition_time_moves_only_on_flip() {
        let creating = project_status(None, Some(&snapshot(ServiceState::Creating)), None, T0);
        let running =
            project_status(Some(&creating), Some(&snapshot(ServiceState::Running)), None, T1);
        assert_eq!(
            running
                .get_condition(CONDITION_TYPE_RUNNING)
                .unwrap()
                .last_transition_time,
            T1
        );
    }

    #[test]
    fn test_failure_set_and_clear() {
        let mut status = ServiceStatus::default();
        clear_failure(&mut status, T0);
        assert!(status.get_condition(CONDITION_TYPE_FAILED).is_none());

        set_failure(&mut status, "InvalidSpec", "plan must not be empty", T0);
        assert!(status.is_failed());

        clear_failure(&mut status, T1);
        assert!(!status.is_failed());
        assert_eq!(
            status.get_condition(CONDITION_TYPE_FAILED).unwrap().reason,
            "Reconciled"
        );
    }

    #[test]
    fn test_projection_keeps_other_conditions() {
        let mut previous = ServiceStatus::default();
        set_credentials_condition(&mut previous, true, "Secret pg-1 is up to date", T0);
        let status =
            project_status(Some(&previous), Some(&snapshot(ServiceState::Running)), None, T1);
        assert_eq!(status.conditions.len(), 2);
        assert_eq!(
            status
                .get_condition(CONDITION_TYPE_CREDENTIALS_READY)
                .unwrap()
                .status,
            CONDITION_STATUS_TRUE
        );
    }
}
