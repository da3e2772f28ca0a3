use serde_json::Value;

/// Looks up `path` inside a JSON document.
///
/// The path is either an RFC 6901 pointer (`/data/items/0`) or a dotted path
/// (`data.items.0`). Returns `None` when the bytes are not JSON or the path
/// does not match.
#[must_use]
pub fn lookup_path(document: &[u8], path: &str) -> Option<Value> {
    let root: Value = serde_json::from_slice(document).ok()?;
    let path = path.trim();
    if path.is_empty() {
        return Some(root);
    }
    if path.starts_with('/') {
        return root.pointer(path).cloned();
    }
    let mut current = &root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => return None,
        };
    }
    Some(current.clone())
}
