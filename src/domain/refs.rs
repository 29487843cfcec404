//! Component reference walking
//!
//! Content data points at child components with `{"_ref": uri}` objects. A
//! composed (denormalized) child also carries its data as sibling properties.
//!
//! Traversal rules shared by every consumer:
//! - only `_ref`s addressing components or layouts count as references
//! - keys starting with `_` and internal metadata keys are never descended into
//! - arrays are walked element-wise

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::chunk::Dispatch;
use super::uri::UriType;

/// Property holding a child reference
pub const REF: &str = "_ref";

/// Metadata keys that never hold content
const IGNORED_KEYS: &[&str] = &["locals", "site", "media", "state", "template"];

fn is_walkable(key: &str) -> bool {
    !key.starts_with('_') && !IGNORED_KEYS.contains(&key)
}

/// Returns the component reference carried by `value`, if any
pub fn component_ref(value: &Value) -> Option<&str> {
    let uri = value.as_object()?.get(REF)?.as_str()?;
    UriType::from_uri(uri)
        .filter(UriType::is_component_like)
        .map(|_| uri)
}

/// Lazy depth-first iterator over `(ref, referencing object)` pairs below a tree
///
/// The root itself is never yielded. Calling [`references`] again restarts the walk.
pub struct References<'a> {
    stack: Vec<&'a Value>,
}

impl<'a> References<'a> {
    fn push_children(&mut self, value: &'a Value) {
        match value {
            Value::Object(map) => {
                let children: Vec<_> = map
                    .iter()
                    .filter(|(key, _)| is_walkable(key))
                    .map(|(_, child)| child)
                    .collect();
                self.stack.extend(children.into_iter().rev());
            }
            Value::Array(items) => self.stack.extend(items.iter().rev()),
            _ => {}
        }
    }
}

impl<'a> Iterator for References<'a> {
    type Item = (&'a str, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(value) = self.stack.pop() {
            self.push_children(value);
            if let Some(uri) = component_ref(value) {
                return Some((uri, value));
            }
        }
        None
    }
}

/// Walks every component reference nested inside `tree`
pub fn references(tree: &Value) -> References<'_> {
    let mut walker = References { stack: Vec::new() };
    walker.push_children(tree);
    walker
}

/// Returns the distinct child component URIs of `tree`, in walk order
pub fn child_uris(tree: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    references(tree)
        .filter(|(uri, _)| seen.insert(*uri))
        .map(|(uri, _)| uri.to_string())
        .collect()
}

/// Reduces composed children to bare `{_ref}` pointers
///
/// Returns the extracted child data, deepest descendants first. Children that
/// only carry a `_ref` are left as-is and not returned.
pub fn normalize(data: &mut Value) -> Vec<Dispatch> {
    let mut extracted = Vec::new();
    normalize_children(data, &mut extracted);
    extracted
}

fn normalize_children(value: &mut Value, out: &mut Vec<Dispatch>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if is_walkable(key) {
                    normalize_value(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                normalize_value(item, out);
            }
        }
        _ => {}
    }
}

fn normalize_value(value: &mut Value, out: &mut Vec<Dispatch>) {
    let uri = component_ref(value).map(str::to_string);

    if let (Some(uri), Value::Object(map)) = (uri, &mut *value) {
        if map.len() > 1 {
            let mut child = std::mem::take(map);
            child.remove(REF);
            map.insert(REF.to_string(), Value::String(uri.clone()));

            let mut child = Value::Object(child);
            normalize_children(&mut child, out);
            out.push(Dispatch::new(uri, child));
            return;
        }
    }

    normalize_children(value, out);
}

/// Result of composing a tree
#[derive(Debug, Clone, PartialEq)]
pub struct Composed {
    /// The tree with child data inlined next to each `_ref`
    pub data: Value,

    /// URIs whose non-empty data was inlined somewhere in the tree
    pub inlined: Vec<String>,
}

/// Inlines child data from `lookup` next to every reference
///
/// References already being composed higher up the tree are left as bare
/// pointers, so cyclic graphs terminate.
pub fn compose<'a, F>(data: &Value, lookup: F) -> Composed
where
    F: Fn(&str) -> Option<&'a Value>,
{
    let mut inlined = Vec::new();
    let mut ancestors = Vec::new();
    let data = compose_children(data, &lookup, &mut ancestors, &mut inlined);
    Composed { data, inlined }
}

fn compose_children<'a, F>(
    value: &Value,
    lookup: &F,
    ancestors: &mut Vec<String>,
    inlined: &mut Vec<String>,
) -> Value
where
    F: Fn(&str) -> Option<&'a Value>,
{
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, child)| {
                    let child = if is_walkable(key) {
                        compose_value(child, lookup, ancestors, inlined)
                    } else {
                        child.clone()
                    };
                    (key.clone(), child)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| compose_value(item, lookup, ancestors, inlined))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn compose_value<'a, F>(
    value: &Value,
    lookup: &F,
    ancestors: &mut Vec<String>,
    inlined: &mut Vec<String>,
) -> Value
where
    F: Fn(&str) -> Option<&'a Value>,
{
    let Some(uri) = component_ref(value) else {
        return compose_children(value, lookup, ancestors, inlined);
    };

    let child = match lookup(uri) {
        Some(Value::Object(child)) if !ancestors.iter().any(|a| a == uri) => child,
        _ => return compose_children(value, lookup, ancestors, inlined),
    };

    ancestors.push(uri.to_string());
    let child = compose_children(&Value::Object(child.clone()), lookup, ancestors, inlined);
    ancestors.pop();

    if let Value::Object(child) = child {
        if !child.is_empty() {
            inlined.push(uri.to_string());
        }
        let mut merged = Map::new();
        merged.insert(REF.to_string(), Value::String(uri.to_string()));
        merged.extend(child.into_iter().filter(|(k, _)| k != REF));
        return Value::Object(merged);
    }

    value.clone()
}

/// Collects every string inside array-valued top-level fields (a page's areas)
pub fn area_uris(page: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    page.as_object()
        .into_iter()
        .flat_map(|map| map.values())
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_str)
        .filter(|uri| seen.insert(*uri))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn article() -> Value {
        json!({
            "title": "Hello",
            "content": [
                {"_ref": "/_components/paragraph/instances/1"},
                {"_ref": "/_components/image/instances/2", "src": "a.png",
                 "caption": {"_ref": "/_components/caption/instances/3", "text": "hi"}}
            ],
            "author": {"_ref": "/_pages/not-a-component"},
            "locals": {"_ref": "/_components/hidden/instances/x"},
            "_meta": {"_ref": "/_components/hidden/instances/y"}
        })
    }

    #[test]
    fn walks_component_refs_only() {
        let tree = article();
        let uris: Vec<_> = references(&tree).map(|(uri, _)| uri).collect();
        assert_eq!(
            uris,
            vec![
                "/_components/paragraph/instances/1",
                "/_components/image/instances/2",
                "/_components/caption/instances/3",
            ]
        );
    }

    #[test]
    fn walk_is_restartable() {
        let tree = article();
        assert_eq!(references(&tree).count(), references(&tree).count());
    }

    #[test]
    fn root_ref_is_not_yielded() {
        let tree = json!({"_ref": "/_components/a/instances/1", "child": {"_ref": "/_components/b"}});
        assert_eq!(child_uris(&tree), vec!["/_components/b"]);
    }

    #[test]
    fn normalize_extracts_nested_children() {
        let mut tree = article();
        let children = normalize(&mut tree);

        assert_eq!(
            tree["content"][1],
            json!({"_ref": "/_components/image/instances/2"})
        );
        assert_eq!(children.len(), 2);
        // deepest first
        assert_eq!(children[0].uri, "/_components/caption/instances/3");
        assert_eq!(children[0].data, json!({"text": "hi"}));
        assert_eq!(children[1].uri, "/_components/image/instances/2");
        assert_eq!(
            children[1].data,
            json!({"src": "a.png", "caption": {"_ref": "/_components/caption/instances/3"}})
        );
    }

    #[test]
    fn compose_inlines_and_survives_cycles() {
        let mut store = HashMap::new();
        store.insert("/_components/a".to_string(), json!({"x": 1, "next": {"_ref": "/_components/b"}}));
        store.insert("/_components/b".to_string(), json!({"y": 2, "back": {"_ref": "/_components/a"}}));

        let root = json!({"child": {"_ref": "/_components/a"}});
        let composed = compose(&root, |uri| store.get(uri));

        assert_eq!(composed.data["child"]["x"], 1);
        assert_eq!(composed.data["child"]["next"]["y"], 2);
        assert_eq!(
            composed.data["child"]["next"]["back"],
            json!({"_ref": "/_components/a"})
        );
        assert_eq!(composed.inlined, vec!["/_components/b", "/_components/a"]);
    }

    #[test]
    fn area_uris_collects_array_strings() {
        let page = json!({
            "layout": "/_layouts/l/instances/x",
            "main": ["/_components/a/instances/1", "/_components/b/instances/2"],
            "side": ["/_components/a/instances/1"],
            "title": "ignored"
        });
        assert_eq!(
            area_uris(&page),
            vec!["/_components/a/instances/1", "/_components/b/instances/2"]
        );
    }
}
