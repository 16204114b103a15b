//! Helpers over label metadata documents.

use serde_json::{Map, Value};

/// Deep-merge `patch` into `base`.
///
/// Objects merge key by key. Any other patch value replaces what was there,
/// and nested objects in the patch keep their nested keys.
pub fn merge(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            let mut merged: Map<String, Value> = base.clone();
            for (key, value) in patch {
                let next = match merged.get(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => patch.clone(),
    }
}

/// Walk `document` along `path`, descending through objects only.
pub fn get_path<'a, S: AsRef<str>>(document: &'a Value, path: &[S]) -> Option<&'a Value> {
    path.iter()
        .try_fold(document, |node, segment| node.as_object()?.get(segment.as_ref()))
}

/// Whether the terminal key of `path` is reachable through objects.
///
/// A key holding null still exists.
pub fn path_exists<S: AsRef<str>>(document: &Value, path: &[S]) -> bool {
    get_path(document, path).is_some()
}

/// Split a dotted path into its segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

/// Strip a leading `metadata.` namespace, leaving a path into the metadata
/// document itself.
pub fn metadata_relative(path: &str) -> &str {
    path.strip_prefix("metadata.").unwrap_or(path)
}
