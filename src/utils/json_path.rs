//! Dot-notation path lookup for pulling fields out of provider JSON frames.
//!
//! Supported forms:
//! - Nested keys (e.g., "delta.text")
//! - Bracket indexing (e.g., "choices[0].delta.content")
//! - Dot indexing (e.g., "choices.0.delta.content")

use serde_json::Value;

pub struct PathMapper;

impl PathMapper {
    /// Get value from JSON using a dot-notation path.
    pub fn get_path<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
        let normalized = path.trim().trim_start_matches("$.");
        if normalized.is_empty() {
            return None;
        }

        let mut current = obj;
        for part in normalized.split('.') {
            if part.is_empty() {
                return None;
            }

            if let Some(bracket_pos) = part.find('[') {
                let key = &part[..bracket_pos];
                let idx_str = part[bracket_pos + 1..].trim_end_matches(']');
                if !key.is_empty() {
                    current = current.as_object()?.get(key)?;
                }
                let idx = idx_str.parse::<usize>().ok()?;
                current = current.as_array()?.get(idx)?;
                continue;
            }

            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Get a string value at `path`; non-string values yield `None`.
    pub fn get_str<'a>(obj: &'a Value, path: &str) -> Option<&'a str> {
        Self::get_path(obj, path).and_then(Value::as_str)
    }
}
