//! Structural helpers shared by the provider payload builders. Pure
//! functions, no I/O.

use crate::domain::notification::PayloadMap;
use serde_json::Value;

/// Recursive structural merge. Nested maps are merged key-by-key; any
/// other overlay value, including null, replaces the base value. Callers
/// prune the nulls afterwards, which gives overrides delete semantics.
pub(crate) fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// Removes null entries from the object at `path`, if present.
pub(crate) fn compact_at(root: &mut Value, path: &[&str]) {
    if let Some(Value::Object(map)) = value_at(root, path) {
        map.retain(|_, v| !v.is_null());
    }
}

/// Removes null and blank entries (empty strings, arrays and objects)
/// from the object at `path`, if present.
pub(crate) fn compact_blank_at(root: &mut Value, path: &[&str]) {
    if let Some(Value::Object(map)) = value_at(root, path) {
        map.retain(|_, v| !is_blank(v));
    }
}

/// Removes the entry at `path` entirely when it is an empty object.
pub(crate) fn prune_empty_at(root: &mut Value, path: &[&str]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    if let Some(Value::Object(map)) = value_at(root, parents)
        && map.get(*last).is_some_and(|v| v.as_object().is_some_and(serde_json::Map::is_empty))
    {
        map.remove(*last);
    }
}

fn value_at<'a>(root: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    path.iter().try_fold(root, |value, key| value.get_mut(key))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// FCM requires data values to be strings. Nulls are dropped, strings
/// pass through, everything else uses its JSON representation.
pub(crate) fn stringify(map: &PayloadMap) -> PayloadMap {
    map.iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), Value::String(text))
        })
        .collect()
}
