//! Layered merging of configuration trees.
//!
//! Later layers always win. Two mappings merge key by key; any other pairing
//! (mapping over scalar, scalar over mapping, null over anything) replaces
//! the destination value outright.

use serde_json::{Map, Value};

/// Merge `src` into `dest` in place.
///
/// Keys only present in `dest` are left alone. When both sides hold a mapping
/// for the same key the merge recurses; otherwise `src`'s value replaces
/// `dest`'s.
pub fn update_values(dest: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (key, src_value) in src {
        match (dest.get_mut(key), src_value) {
            (Some(Value::Object(dest_map)), Value::Object(src_map)) => {
                update_values(dest_map, src_map);
            }
            _ => {
                dest.insert(key.clone(), src_value.clone());
            }
        }
    }
}

/// Merge two values, returning the result.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value @ Value::Object(_)) if overlay_value.is_object() => {
                        deep_merge(base_value, overlay_value)
                    }
                    _ => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge a sequence of layers, lowest precedence first.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values
        .into_iter()
        .fold(Value::Object(Map::new()), deep_merge)
}
