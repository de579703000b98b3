//! Structural equality over JSON values.
//!
//! Used by the store to suppress notifications when a producer re-sends
//! data that is structurally identical to what is already held.

use serde_json::{Number, Value};

/// Returns `true` if `a` and `b` are structurally equal.
///
/// Arrays compare element-wise (same length, same order), objects compare by
/// key set and recursively equal values. Numbers compare by value, so `1`
/// and `1.0` are equal.
#[must_use]
pub fn structural_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_eq(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| structural_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| structural_eq(l, r)))
        }
        _ => false,
    }
}

fn numbers_eq(x: &Number, y: &Number) -> bool {
    if let (Some(l), Some(r)) = (x.as_i64(), y.as_i64()) {
        return l == r;
    }
    if let (Some(l), Some(r)) = (x.as_u64(), y.as_u64()) {
        return l == r;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_primitives() {
        assert!(structural_eq(&json!(null), &json!(null)));
        assert!(structural_eq(&json!(true), &json!(true)));
        assert!(!structural_eq(&json!(true), &json!(false)));
        assert!(structural_eq(&json!("a"), &json!("a")));
        assert!(!structural_eq(&json!(0), &json!(false)));
        assert!(!structural_eq(&json!(""), &json!(null)));
    }

    #[test]
    fn test_numbers_by_value() {
        assert!(structural_eq(&json!(1), &json!(1.0)));
        assert!(structural_eq(&json!(-3), &json!(-3)));
        assert!(!structural_eq(&json!(1), &json!(2)));
        assert!(structural_eq(&json!(u64::MAX), &json!(u64::MAX)));
    }

    #[test]
    fn test_nested_objects() {
        let a = json!({"models": [{"id": "m1", "status": "loaded"}], "total": 1});
        let b = json!({"total": 1, "models": [{"status": "loaded", "id": "m1"}]});
        assert!(structural_eq(&a, &b));

        let c = json!({"total": 1, "models": [{"status": "unloaded", "id": "m1"}]});
        assert!(!structural_eq(&a, &c));
    }

    #[test]
    fn test_key_set_differs() {
        assert!(!structural_eq(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!structural_eq(&json!({"a": 1}), &json!({"b": 1})));
    }

    #[test]
    fn test_array_length_and_order() {
        assert!(!structural_eq(&json!([1, 2]), &json!([1, 2, 3])));
        assert!(!structural_eq(&json!([1, 2]), &json!([2, 1])));
        assert!(structural_eq(&json!([]), &json!([])));
    }

    #[test]
    fn test_array_vs_object() {
        assert!(!structural_eq(&json!([]), &json!({})));
    }
}
