//! Loose scalar coercion for lab JSON documents.

use serde_json::Value;

/// String form of a scalar; numbers printed, booleans `1`/empty, anything else empty.
pub(crate) fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".into(),
        Value::Bool(false) | Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// `coerce_string` of an optional key; missing keys are empty.
pub(crate) fn string_field(value: &Value, key: &str) -> String {
    value.get(key).map(coerce_string).unwrap_or_default()
}

/// Like `string_field`, but `None` when the key is absent or null.
pub(crate) fn optional_string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key) {
        None | Some(Value::Null) => None,
        Some(v) => Some(coerce_string(v)),
    }
}

/// Integer reading of a gas value. Null stays absent; unparseable text reads as 0.
pub(crate) fn coerce_gas_value(value: &Value) -> Option<i64> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(
            n.as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .unwrap_or(0),
        ),
        Value::String(s) => {
            let s = s.trim();
            Some(
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
                    .unwrap_or(0),
            )
        }
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Array(items) => Some(i64::from(!items.is_empty())),
        Value::Object(map) => Some(i64::from(!map.is_empty())),
    }
}
