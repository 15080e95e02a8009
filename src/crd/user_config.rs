//! Helpers for rendering user configuration into its remote wire form

use serde::Serialize;
use serde_json::{Map, Value};

/// Insert `value` under `key` when it is set
///
/// Values that fail to serialize are skipped; every field type used in the
/// user config structs is a plain scalar or string list.
pub(crate) fn insert_opt<T: Serialize>(out: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(v) = value.and_then(|v| serde_json::to_value(v).ok()) {
        if !v.is_null() {
            out.insert(key.to_string(), v);
        }
    }
}

/// Keys of `desired` whose values differ from `observed`
///
/// Nested objects are compared recursively so that only the changed leaves
/// are sent. Keys present only in `observed` are left alone: the remote side
/// fills in defaults the object never asked for.
pub fn user_config_diff(desired: &Map<String, Value>, observed: &Map<String, Value>) -> Map<String, Value> {
    let mut diff = Map::new();
    for (key, want) in desired {
        if want.is_null() {
            continue;
        }
        match (want, observed.get(key)) {
            (Value::Object(want_obj), Some(Value::Object(have_obj))) => {
                let nested = user_config_diff(want_obj, have_obj);
                if !nested.is_empty() {
                    diff.insert(key.clone(), Value::Object(nested));
                }
            }
            (want, Some(have)) if values_match(want, have) => {}
            (want, _) => {
                diff.insert(key.clone(), want.clone());
            }
        }
    }
    diff
}

// Numbers compare by value so that `900` and `900.0` do not cause churn
fn values_match(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => want == have,
    }
}
