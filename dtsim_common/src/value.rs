//! The dynamic value model shared by component config, ports, and bindings.
//!
//! Components are configured with a loosely-typed `Map<String, Value>` (the
//! persistence collaborator stores these as JSON columns); re-using
//! [`serde_json::Value`] avoids inventing a parallel tagged-union type for
//! the same job.

use std::collections::HashMap;

/// A config, port, or binding value. An alias over [`serde_json::Value`].
pub type Value = serde_json::Value;

/// `Map<string, Value>`, as used for `Component::config` and per-tick
/// kernel inputs/outputs.
pub type ValueMap = HashMap<String, Value>;

/// Reads a numeric config/input value, falling back to `default` if the key
/// is absent or not a number.
///
/// Mirrors the reference implementation's `config.get("key", default)`
/// pattern, which never raises on a missing or wrong-typed key.
pub fn number_or(map: &ValueMap, key: &str, default: f64) -> f64 {
    map.get(key).and_then(Value::as_f64).unwrap_or(default)
}

/// Reads a string config value, falling back to `default` if the key is
/// absent or not a string.
pub fn string_or<'a>(map: &'a ValueMap, key: &str, default: &'a str) -> &'a str {
    map.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// Reads a numeric input if present and numeric; `None` for missing or
/// non-numeric values (never an error — kernels treat this as "no input").
pub fn as_number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_or_falls_back_on_missing_key() {
        let map = ValueMap::new();
        assert_eq!(number_or(&map, "frequency", 0.1), 0.1);
    }

    #[test]
    fn number_or_falls_back_on_wrong_type() {
        let mut map = ValueMap::new();
        map.insert("frequency".to_string(), json!("not a number"));
        assert_eq!(number_or(&map, "frequency", 0.1), 0.1);
    }

    #[test]
    fn number_or_reads_present_numeric_value() {
        let mut map = ValueMap::new();
        map.insert("frequency".to_string(), json!(0.25));
        assert_eq!(number_or(&map, "frequency", 0.1), 0.25);
    }

    #[test]
    fn as_number_rejects_non_numeric_input() {
        assert_eq!(as_number(Some(&json!("On"))), None);
        assert_eq!(as_number(Some(&json!(1.5))), Some(1.5));
        assert_eq!(as_number(None), None);
    }
}
