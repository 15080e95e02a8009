//! Condition management helpers following Kubernetes API conventions

use crate::crd::Condition;

/// Condition types written by the operator
pub const CONDITION_TYPE_RUNNING: &str = "Running";
pub const CONDITION_TYPE_FAILED: &str = "Failed";
pub const CONDITION_TYPE_CREDENTIALS_READY: &str = "CredentialsReady";

/// Standard condition statuses
pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

/// Update or add a condition to the conditions list
///
/// At most one record exists per type. `last_transition_time` is set to `now`
/// only when the record is new or its status flips, so re-applying the same
/// condition leaves the list unchanged.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
    now: &str,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        // Update transition time only if status changed
        if existing.status != status {
            existing.last_transition_time = now.to_string();
        }
        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.observed_generation = observed_generation;
    } else {
        conditions.push(Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: now.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation,
        });
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: &str = "2024-01-01T00:00:00+00:00";
    const T1: &str = "2024-01-01T00:05:00+00:00";

    #[test]
    fn test_set_condition_adds_new() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            CONDITION_TYPE_RUNNING,
            CONDITION_STATUS_TRUE,
            "RUNNING",
            "Service is running",
            Some(1),
            T0,
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, CONDITION_TYPE_RUNNING);
        assert_eq!(conditions[0].status, CONDITION_STATUS_TRUE);
        assert_eq!(conditions[0].last_transition_time, T0);
        assert_eq!(conditions[0].observed_generation, Some(1));
    }

    #[test]
    fn test_set_condition_updates_existing() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            CONDITION_TYPE_RUNNING,
            CONDITION_STATUS_FALSE,
            "REBUILDING",
            "Service is rebuilding",
            Some(1),
            T0,
        );
        set_condition(
            &mut conditions,
            CONDITION_TYPE_RUNNING,
            CONDITION_STATUS_TRUE,
            "RUNNING",
            "Service is running",
            Some(1),
            T1,
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, CONDITION_STATUS_TRUE);
        assert_eq!(conditions[0].last_transition_time, T1); // Time changes when status changes
    }

    #[test]
    fn test_same_status_keeps_transition_time() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            CONDITION_TYPE_RUNNING,
            CONDITION_STATUS_FALSE,
            "CREATING",
            "Service is creating",
            Some(1),
            T0,
        );
        set_condition(
            &mut conditions,
            CONDITION_TYPE_RUNNING,
            CONDITION_STATUS_FALSE,
            "REBUILDING",
            "Service is rebuilding",
            Some(2),
            T1,
        );

        assert_eq!(conditions[0].last_transition_time, T0);
        assert_eq!(conditions[0].reason, "REBUILDING");
        assert_eq!(conditions[0].observed_generation, Some(2));
    }

    #[test]
    fn test_find_condition() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            CONDITION_TYPE_RUNNING,
            CONDITION_STATUS_TRUE,
            "RUNNING",
            "",
            None,
            T0,
        );
        set_condition(
            &mut conditions,
            CONDITION_TYPE_FAILED,
            CONDITION_STATUS_TRUE,
            "InvalidSpec",
            "plan must not be empty",
            None,
            T0,
        );

        let failed = find_condition(&conditions, CONDITION_TYPE_FAILED).unwrap();
        assert_eq!(failed.reason, "InvalidSpec");
        assert!(find_condition(&conditions, CONDITION_TYPE_CREDENTIALS_READY).is_none());
        assert_eq!(conditions.len(), 2);
    }
}
