//! Capped buffers stored as JSON arrays.
//!
//! The metrics history grows at the tail and the log tail grows at the
//! head. Both evict from the opposite end once full and keep the relative
//! order of the retained elements.

use serde_json::Value;

/// Appends `item` and drops the oldest elements beyond `cap`.
///
/// A non-array `current` is treated as empty.
#[must_use]
pub fn append_capped(current: Option<&Value>, item: Value, cap: usize) -> Value {
    let mut items = as_items(current);
    items.push(item);

    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }

    Value::Array(items)
}

/// Prepends `item` and drops the oldest elements beyond `cap`.
///
/// The newest element is at index 0, the oldest at the end.
#[must_use]
pub fn prepend_capped(current: Option<&Value>, item: Value, cap: usize) -> Value {
    let mut items = as_items(current);
    items.insert(0, item);
    items.truncate(cap);
    Value::Array(items)
}

fn as_items(current: Option<&Value>) -> Vec<Value> {
    match current {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

// ============================================================================
// Tests
// ============================================================================
