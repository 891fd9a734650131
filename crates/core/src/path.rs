//! Dot-path access into loosely typed JSON documents.
//!
//! Site configuration is an untyped nested object, so most reads and writes
//! go through a dotted path such as `hero.titulo` or `menu.pizzas.precio.fam`.
//! Numeric segments index into arrays on read.

use serde_json::{Map, Value};

/// Look up `path` inside `root`.
#[must_use]
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Look up `path` and treat `null` and empty strings as absent.
///
/// Partial data must never blank out content on the page, so callers that
/// render values use this instead of [`get_path`].
#[must_use]
pub fn get_present<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    get_path(root, path).filter(|v| is_present(v))
}

/// Whether a value carries renderable content.
#[must_use]
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// Any non-object found along the way is replaced by an object.
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut node = root;
    while let Some(segment) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Join non-empty path segments with dots.
#[must_use]
pub fn join(segments: &[&str]) -> String {
    segments
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_get_nested() {
        let doc = json!({"hero": {"titulo": "Hola", "items": ["a", "b"]}});
        assert_eq!(get_path(&doc, "hero.titulo"), Some(&json!("Hola")));
        assert_eq!(get_path(&doc, "hero.items.1"), Some(&json!("b")));
        assert_eq!(get_path(&doc, "hero.missing"), None);
        assert_eq!(get_path(&doc, "hero.titulo.deeper"), None);
    }

    #[test]
    fn test_get_present_skips_blank() {
        let doc = json!({"a": null, "b": "  ", "c": 0});
        assert!(get_present(&doc, "a").is_none());
        assert!(get_present(&doc, "b").is_none());
        assert_eq!(get_present(&doc, "c"), Some(&json!(0)));
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut doc = json!({"config": "not-an-object"});
        set_path(&mut doc, "config.menu.pizzas.precio", json!(9000));
        assert_eq!(get_path(&doc, "config.menu.pizzas.precio"), Some(&json!(9000)));

        let mut empty = Value::Null;
        set_path(&mut empty, "x", json!(true));
        assert_eq!(empty, json!({"x": true}));
    }

    #[test]
    fn test_join_skips_empty() {
        assert_eq!(join(&["config", "", "menu", "x"]), "config.menu.x");
    }
}
