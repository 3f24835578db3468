//! Dot-separated JSON paths.
//!
//! A path is a sequence of segments separated by `.`; `\.` escapes a literal
//! dot inside a key. Numeric segments index arrays and `#` yields the
//! length of an array. The empty path addresses the root.

use serde_json::Value;

/// Join a base path and a sub path with `.`, eliding either when empty.
pub fn join_path(base: &str, sub: &str) -> String {
    match (base.is_empty(), sub.is_empty()) {
        (true, _) => sub.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}.{sub}"),
    }
}

/// Split a path into unescaped segments.
pub fn split_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => current.push('\\'),
            },
            '.' => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    segments
}

/// Resolve `path` against `root`, returning an owned copy of the subtree.
///
/// Returns `None` when any segment is missing.
pub fn resolve(root: &Value, path: &str) -> Option<Value> {
    let segments = split_path(path);
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) if segment == "#" => {
                // `#` must be the last segment; nothing can be addressed below a count.
                return (i + 1 == segments.len()).then(|| Value::from(items.len()));
            }
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_elides_empty_operands() {
        assert_eq!(join_path("", "a"), "a");
        assert_eq!(join_path("a", ""), "a");
        assert_eq!(join_path("a", "a"), "a.a");
        assert_eq!(join_path("", ""), "");
    }

    #[test]
    fn split_honours_escaped_dots() {
        assert_eq!(split_path(r"a.b\.c.d"), vec!["a", "b.c", "d"]);
        assert!(split_path("").is_empty());
    }

    #[test]
    fn resolves_objects_and_arrays() {
        let doc = json!({"a": {"list": [{"id": 1}, {"id": 2}], "v.x": true}});
        assert_eq!(resolve(&doc, "a.list.1.id"), Some(json!(2)));
        assert_eq!(resolve(&doc, "a.list.#"), Some(json!(2)));
        assert_eq!(resolve(&doc, r"a.v\.x"), Some(json!(true)));
        assert_eq!(resolve(&doc, ""), Some(doc.clone()));
    }

    #[test]
    fn missing_segments_resolve_to_none() {
        let doc = json!({"a": [1, 2]});
        assert_eq!(resolve(&doc, "b"), None);
        assert_eq!(resolve(&doc, "a.5"), None);
        assert_eq!(resolve(&doc, "a.x"), None);
        assert_eq!(resolve(&doc, "a.#.x"), None);
    }
}
