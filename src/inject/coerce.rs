//! Loose conversions applied to raw request input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

#[allow(clippy::expect_used)]
static NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?\s*$").expect("valid numeric pattern")
});

#[allow(clippy::expect_used)]
static INTEGER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?\d+\s*$").expect("valid integer pattern")
});

/// Numbers, and strings that look like decimal numbers.
pub fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => NUMERIC.is_match(s),
        _ => false,
    }
}

/// Integer form of a numeric value; fractional parts are truncated.
pub fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) if INTEGER.is_match(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
        Value::String(s) if NUMERIC.is_match(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

pub fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if NUMERIC.is_match(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Truthiness: `false`, `null`, zero, `""`, `"0"` and empty containers are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Free-form object view of a structured value; lists are keyed by index.
pub fn to_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Map::new(),
    }
}

/// Kind name of a raw input value, as reported in type errors.
pub fn actual_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Loose equality used for backed enum lookup: `"2"` matches `2`.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (to_float(a), to_float(b)) {
                (Some(x), Some(y)) => is_numeric(a) && is_numeric(b) && x == y,
                _ => false,
            }
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_strings() {
        for s in ["42", "-7", " 3.5 ", ".5", "5.", "1e3", "+2E-2"] {
            assert!(is_numeric(&json!(s)), "{s} should be numeric");
        }
        for s in ["abc", "", "0x1A", "1.2.3", "4 2"] {
            assert!(!is_numeric(&json!(s)), "{s} should not be numeric");
        }
        assert!(!is_numeric(&json!(true)));
    }

    #[test]
    fn test_int_coercion_truncates() {
        assert_eq!(to_int(&json!("42")), Some(42));
        assert_eq!(to_int(&json!("3.9")), Some(3));
        assert_eq!(to_int(&json!("1e3")), Some(1000));
        assert_eq!(to_int(&json!(-2.5)), Some(-2));
        assert_eq!(to_int(&json!("abc")), None);
    }

    #[test]
    fn test_truthiness() {
        for v in [json!(false), Value::Null, json!(0), json!(0.0), json!(""), json!("0"), json!([]), json!({})] {
            assert!(!truthy(&v), "{v} should be falsy");
        }
        for v in [json!(true), json!(1), json!("false"), json!("a"), json!([0])] {
            assert!(truthy(&v), "{v} should be truthy");
        }
    }

    #[test]
    fn test_list_reshapes_to_indexed_object() {
        let obj = to_object(json!(["a", "b"]));
        assert_eq!(obj["0"], "a");
        assert_eq!(obj["1"], "b");
    }

    #[test]
    fn test_loose_enum_equality() {
        assert!(loosely_equal(&json!(2), &json!("2")));
        assert!(!loosely_equal(&json!(2), &json!("two")));
        assert!(loosely_equal(&json!("draft"), &json!("draft")));
    }
}
