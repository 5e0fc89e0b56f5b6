//! Recursive union of JSON objects.

use serde_json::{Map, Value};

/// Two different non-object values were found under the same key path.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("conflicting values at '{path}'")]
pub struct MergeConflict {
    /// Dotted key path of the conflict (e.g. `visualization.config`).
    pub path: String,
}

/// Merge `b` into `a`.
///
/// Keys present in only one input are copied. Keys holding objects on
/// both sides are merged recursively. Keys holding equal values on both
/// sides are kept once. Anything else is a conflict.
///
/// # Errors
///
/// Returns [`MergeConflict`] naming the first conflicting path.
pub fn merge_maps(
    a: Map<String, Value>,
    b: Map<String, Value>,
) -> Result<Map<String, Value>, MergeConflict> {
    merge_at(a, b, "")
}

fn merge_at(
    mut a: Map<String, Value>,
    b: Map<String, Value>,
    prefix: &str,
) -> Result<Map<String, Value>, MergeConflict> {
    for (key, right) in b {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let merged = match a.remove(&key) {
            None => right,
            Some(Value::Object(left)) => match right {
                Value::Object(right) => Value::Object(merge_at(left, right, &path)?),
                _ => return Err(MergeConflict { path }),
            },
            Some(left) if left == right => left,
            Some(_) => return Err(MergeConflict { path }),
        };
        a.insert(key, merged);
    }
    Ok(a)
}
