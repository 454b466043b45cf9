//! # Utility Functions Module
//!
//! Small helpers shared by the fingerprint, the in-memory cache key and the
//! option overrides.

use serde_json::{Map, Value};
use std::io::Write;

/// Returns a copy of `value` whose objects have their keys sorted, recursively.
pub fn sorted_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sorted_value(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_value).collect()),
        other => other.clone(),
    }
}

/// Key-sorted compact JSON text.
///
/// Two option blocks that differ only in key order produce the same text,
/// which is what the fingerprint and the memory cache key rely on.
///
/// # Example
/// ```rust
/// use responsive_image_pipeline::utils::canonical_json;
/// use serde_json::json;
///
/// let a = canonical_json(&json!({"quality": 80, "effort": 4}));
/// let b = canonical_json(&json!({"effort": 4, "quality": 80}));
/// assert_eq!(a, b);
/// ```
pub fn canonical_json(value: &Value) -> String {
    sorted_value(value).to_string()
}

/// Deep-merges `patch` into `base`: objects merge key by key, everything else
/// (arrays included) is replaced.
pub fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

/// Size in bytes of `contents` once brotli-compressed at maximum quality.
pub fn brotli_size(contents: &[u8]) -> std::io::Result<u64> {
    let mut writer = brotli::CompressorWriter::new(Vec::new(), 4096, 11, 22);
    writer.write_all(contents)?;
    writer.flush()?;
    Ok(writer.into_inner().len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_ignores_key_order() {
        let a = json!({"webp": {"quality": 80, "effort": 4}, "animated": true});
        let b = json!({"animated": true, "webp": {"effort": 4, "quality": 80}});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&json!({"b": 1, "a": 2})), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_merge_json_nested() {
        let mut base = json!({"widths": [null], "cache_options": {"duration": "1d", "directory": null}});
        merge_json(&mut base, json!({"widths": [300, 600], "cache_options": {"directory": ".cache"}}));
        assert_eq!(
            base,
            json!({"widths": [300, 600], "cache_options": {"duration": "1d", "directory": ".cache"}})
        );
    }

    #[test]
    fn test_brotli_size_shrinks_repetitive_text() {
        let svg = "<svg width=\"10\" height=\"10\">".to_string() + &"<rect/>".repeat(200) + "</svg>";
        let size = brotli_size(svg.as_bytes()).unwrap();
        assert!(size > 0);
        assert!(size < svg.len() as u64);
    }
}
