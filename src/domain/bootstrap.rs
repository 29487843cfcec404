//! Bootstrap documents
//!
//! A bootstrap groups a whole content graph by type in one nested document:
//!
//! ```yaml
//! _components:
//!   article:
//!     title: Default title        # default data
//!     instances:
//!       hello: { title: Hello }
//! _pages:
//!   index: { main: [/_components/article/instances/hello] }
//! _users:
//!   - { username: alice, provider: google, auth: admin }
//! _lists:
//!   tags: [a, b]
//! _uris:
//!   foo: /_pages/index
//! ```
//!
//! [`Bootstrap::to_dispatch`] flattens it into composed chunks and
//! [`to_bootstrap`] reduces chunks back into a bootstrap.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::chunk::{self, ChunkError, Dispatch};
use super::refs;
use super::uri::{self, UriType};

/// A nested, site-agnostic content document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bootstrap {
    #[serde(rename = "_components", alias = "components", default, skip_serializing_if = "Map::is_empty")]
    pub components: Map<String, Value>,

    #[serde(rename = "_layouts", alias = "layouts", default, skip_serializing_if = "Map::is_empty")]
    pub layouts: Map<String, Value>,

    #[serde(rename = "_pages", alias = "pages", default, skip_serializing_if = "Map::is_empty")]
    pub pages: Map<String, Value>,

    #[serde(rename = "_users", alias = "users", default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<Value>,

    #[serde(rename = "_lists", alias = "lists", default, skip_serializing_if = "Map::is_empty")]
    pub lists: Map<String, Value>,

    #[serde(rename = "_uris", alias = "uris", default, skip_serializing_if = "Map::is_empty")]
    pub uris: Map<String, Value>,
}

impl Bootstrap {
    /// Returns true if the document holds no content
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
            && self.layouts.is_empty()
            && self.pages.is_empty()
            && self.users.is_empty()
            && self.lists.is_empty()
            && self.uris.is_empty()
    }

    /// Flattens to one chunk per entry, without composing children
    pub fn flatten(&self) -> Result<Vec<Dispatch>, ChunkError> {
        let mut chunks = self.component_entries()?;
        chunks.extend(self.other_entries()?);
        Ok(chunks)
    }

    /// Converts to chunks, inlining child components found in this document
    ///
    /// Runs in two passes: first every child referenced by another component
    /// is collected, then only unreferenced roots are emitted (composed).
    /// Anything a root could not carry (cycles, children with empty data) is
    /// emitted on its own afterwards, so no entry is dropped regardless of
    /// iteration order.
    pub fn to_dispatch(&self) -> Result<Vec<Dispatch>, ChunkError> {
        let entries = self.component_entries()?;
        let lookup: HashMap<&str, &Value> = entries
            .iter()
            .map(|entry| (entry.uri.as_str(), &entry.data))
            .collect();

        let referenced: HashSet<String> = entries
            .iter()
            .flat_map(|entry| refs::child_uris(&entry.data))
            .collect();

        let mut covered: HashSet<String> = HashSet::new();
        let mut dispatches = Vec::new();

        let roots = entries.iter().filter(|e| !referenced.contains(&e.uri));
        for entry in roots {
            let composed = refs::compose(&entry.data, |u| lookup.get(u).copied());
            covered.insert(entry.uri.clone());
            covered.extend(composed.inlined);
            dispatches.push(Dispatch::new(entry.uri.clone(), composed.data));
        }

        for entry in &entries {
            if covered.contains(&entry.uri) {
                continue;
            }
            let composed = refs::compose(&entry.data, |u| lookup.get(u).copied());
            covered.insert(entry.uri.clone());
            covered.extend(composed.inlined);
            dispatches.push(Dispatch::new(entry.uri.clone(), composed.data));
        }

        dispatches.extend(self.other_entries()?);
        Ok(dispatches)
    }

    /// Merges several documents into one
    pub fn from_documents<'a>(
        documents: impl IntoIterator<Item = &'a Bootstrap>,
    ) -> Result<Self, ChunkError> {
        let mut chunks = Vec::new();
        for document in documents {
            chunks.extend(document.flatten()?);
        }
        to_bootstrap(&chunks)
    }

    fn component_entries(&self) -> Result<Vec<Dispatch>, ChunkError> {
        let mut chunks = Vec::new();
        for (kind, group) in [
            (UriType::Component, &self.components),
            (UriType::Layout, &self.layouts),
        ] {
            for (name, component) in group {
                chunks.extend(chunk::component_chunks(
                    &kind.bootstrap_key(),
                    name,
                    component,
                )?);
            }
        }
        Ok(chunks)
    }

    fn other_entries(&self) -> Result<Vec<Dispatch>, ChunkError> {
        let mut chunks = Vec::new();

        for (id, page) in &self.pages {
            chunks.push(Dispatch::new(
                format!("{}/{}", UriType::Page.segment(), id),
                custom_url(page.clone()),
            ));
        }

        for user in &self.users {
            let user_uri = uri::user_uri(user).ok_or_else(|| {
                ChunkError::InvalidBootstrap("users need a username and provider".to_string())
            })?;
            chunks.push(Dispatch::new(user_uri, user.clone()));
        }

        for (kind, group) in [(UriType::List, &self.lists), (UriType::Uri, &self.uris)] {
            for (key, value) in group {
                chunks.push(Dispatch::new(
                    format!("{}/{}", kind.segment(), key.trim_start_matches('/')),
                    value.clone(),
                ));
            }
        }

        Ok(chunks)
    }

    fn assign_component(&mut self, kind: UriType, uri: &str, data: Value) -> Result<(), ChunkError> {
        let name = uri::component_name(uri)
            .ok_or_else(|| ChunkError::UnknownType(uri.to_string()))?
            .to_string();

        let group = match kind {
            UriType::Layout => &mut self.layouts,
            _ => &mut self.components,
        };

        let entry = group
            .entry(name.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let entry = entry.as_object_mut().ok_or_else(|| {
            ChunkError::InvalidBootstrap(format!("component '{}' must be an object", name))
        })?;

        match uri::instance_id(uri) {
            Some(id) => {
                let instances = entry
                    .entry("instances")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(instances) = instances {
                    instances.insert(id.to_string(), data);
                }
            }
            None => {
                // default data must not clobber instances collected earlier
                if let Value::Object(defaults) = data {
                    for (key, value) in defaults {
                        if key != "instances" {
                            entry.insert(key, value);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Legacy pages store their public url as `url`; the API expects `customUrl`
fn custom_url(page: Value) -> Value {
    match page {
        Value::Object(mut map) => {
            if !map.contains_key("customUrl") {
                if let Some(url) = map.remove("url") {
                    map.insert("customUrl".to_string(), url);
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

/// Reduces chunks (or dispatches) into a bootstrap document
///
/// Composed component data is split back into one entry per component.
pub fn to_bootstrap<'a>(
    dispatches: impl IntoIterator<Item = &'a Dispatch>,
) -> Result<Bootstrap, ChunkError> {
    let mut bootstrap = Bootstrap::default();

    for dispatch in dispatches {
        let chunk = chunk::to_chunk(&dispatch.uri, &dispatch.data);
        let kind = UriType::from_uri(&chunk.uri)
            .ok_or_else(|| ChunkError::UnknownType(chunk.uri.clone()))?;

        match kind {
            UriType::Component | UriType::Layout => {
                let mut data = chunk.data;
                if let Value::Object(map) = &mut data {
                    map.remove(refs::REF);
                }
                for child in refs::normalize(&mut data) {
                    let child_kind = child.uri_type().unwrap_or(kind);
                    bootstrap.assign_component(child_kind, &child.uri, child.data)?;
                }
                bootstrap.assign_component(kind, &chunk.uri, data)?;
            }
            UriType::Page => {
                let id = uri::entry_name(&chunk.uri)
                    .ok_or_else(|| ChunkError::UnknownType(chunk.uri.clone()))?;
                bootstrap.pages.insert(id.to_string(), custom_url(chunk.data));
            }
            UriType::User => bootstrap.users.push(chunk.data),
            UriType::List | UriType::Uri => {
                let name = uri::entry_name(&chunk.uri)
                    .ok_or_else(|| ChunkError::UnknownType(chunk.uri.clone()))?
                    .to_string();
                let group = if kind == UriType::List {
                    &mut bootstrap.lists
                } else {
                    &mut bootstrap.uris
                };
                group.insert(name, chunk.data);
            }
        }
    }

    Ok(bootstrap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Bootstrap {
        serde_json::from_value(json!({
            "_components": {
                "article": {
                    "title": "Default",
                    "instances": {
                        "hello": {
                            "title": "Hello",
                            "content": [
                                {"_ref": "/_components/paragraph/instances/p1"},
                                {"_ref": "/_components/paragraph/instances/p2"}
                            ]
                        }
                    }
                },
                "paragraph": {
                    "instances": {
                        "p1": {"text": "one"},
                        "p2": {"text": "two"}
                    }
                }
            },
            "_layouts": {
                "main": {"instances": {"x": {"head": [{"_ref": "/_components/meta/instances/m"}]}}}
            },
            "_pages": {
                "index": {"main": ["/_components/article/instances/hello"], "layout": "/_layouts/main/instances/x", "customUrl": "/"}
            },
            "_users": [{"username": "alice", "provider": "google", "auth": "admin"}],
            "_lists": {"tags": ["a", "b"]},
            "_uris": {"foo": "/_pages/index"}
        }))
        .unwrap()
    }

    #[test]
    fn to_dispatch_composes_and_filters_children() {
        let dispatches = sample().to_dispatch().unwrap();
        let uris: Vec<_> = dispatches.iter().map(|d| d.uri.as_str()).collect();

        assert!(uris.contains(&"/_components/article"));
        assert!(uris.contains(&"/_components/article/instances/hello"));
        // inlined into the article instance, not emitted on their own
        assert!(!uris.contains(&"/_components/paragraph/instances/p1"));
        assert!(!uris.contains(&"/_components/paragraph/instances/p2"));

        let hello = dispatches
            .iter()
            .find(|d| d.uri == "/_components/article/instances/hello")
            .unwrap();
        assert_eq!(hello.data["content"][0]["text"], "one");

        assert!(uris.contains(&"/_pages/index"));
        assert!(uris.contains(&"/_lists/tags"));
        assert!(uris.contains(&"/_uris/foo"));
        assert!(uris.contains(&uri::user_uri(&json!({"username": "alice", "provider": "google"})).unwrap().as_str()));
    }

    #[test]
    fn order_independent_child_filtering() {
        // two siblings share a child that sorts before both of them
        let bootstrap: Bootstrap = serde_json::from_value(json!({
            "_components": {
                "aaa": {"instances": {"shared": {"v": 1}}},
                "zzz": {"instances": {
                    "one": {"c": {"_ref": "/_components/aaa/instances/shared"}},
                    "two": {"c": {"_ref": "/_components/aaa/instances/shared"}}
                }}
            }
        }))
        .unwrap();

        let dispatches = bootstrap.to_dispatch().unwrap();
        let uris: Vec<_> = dispatches.iter().map(|d| d.uri.as_str()).collect();
        assert_eq!(uris, vec!["/_components/zzz/instances/one", "/_components/zzz/instances/two"]);
    }

    #[test]
    fn cycles_and_empty_children_are_kept() {
        let bootstrap: Bootstrap = serde_json::from_value(json!({
            "_components": {
                "a": {"instances": {"1": {"next": {"_ref": "/_components/b/instances/1"}}}},
                "b": {"instances": {"1": {"next": {"_ref": "/_components/a/instances/1"}}}},
                "c": {"instances": {"1": {"empty": {"_ref": "/_components/d/instances/1"}}}},
                "d": {"instances": {"1": {}}}
            }
        }))
        .unwrap();

        let dispatches = bootstrap.to_dispatch().unwrap();
        let back = to_bootstrap(&dispatches).unwrap();
        assert_eq!(back, bootstrap);
    }

    #[test]
    fn round_trip() {
        let bootstrap = sample();
        let back = to_bootstrap(&bootstrap.to_dispatch().unwrap()).unwrap();
        assert_eq!(back, bootstrap);
    }

    #[test]
    fn defaults_do_not_clobber_instances() {
        let dispatches = vec![
            Dispatch::new("/_components/foo/instances/a", json!({"x": 1})),
            Dispatch::new("/_components/foo", json!({"x": 0})),
        ];
        let bootstrap = to_bootstrap(&dispatches).unwrap();
        assert_eq!(
            bootstrap.components["foo"],
            json!({"x": 0, "instances": {"a": {"x": 1}}})
        );
    }

    #[test]
    fn legacy_page_url_becomes_custom_url() {
        let bootstrap: Bootstrap =
            serde_json::from_value(json!({"_pages": {"p": {"url": "/legacy"}}})).unwrap();
        let dispatches = bootstrap.to_dispatch().unwrap();
        assert_eq!(dispatches, vec![Dispatch::new("/_pages/p", json!({"customUrl": "/legacy"}))]);

        let kept: Bootstrap = serde_json::from_value(
            json!({"_pages": {"p": {"url": "/legacy", "customUrl": "/new"}}}),
        )
        .unwrap();
        let dispatches = kept.to_dispatch().unwrap();
        assert_eq!(dispatches[0].data["customUrl"], "/new");
        assert_eq!(dispatches[0].data["url"], "/legacy");
    }

    #[test]
    fn to_bootstrap_accepts_absolute_dispatches() {
        let dispatches = vec![Dispatch::new(
            "http://site.com/_components/foo/instances/a",
            json!({"child": {"_ref": "site.com/_components/bar/instances/b"}}),
        )];
        let bootstrap = to_bootstrap(&dispatches).unwrap();
        assert_eq!(
            bootstrap.components["foo"]["instances"]["a"]["child"]["_ref"],
            "/_components/bar/instances/b"
        );
    }

    #[test]
    fn to_bootstrap_rejects_unknown_types() {
        let dispatches = vec![Dispatch::new("/nope/x", json!({}))];
        assert!(matches!(to_bootstrap(&dispatches), Err(ChunkError::UnknownType(_))));
    }

    #[test]
    fn accepts_unprefixed_keys() {
        let bootstrap: Bootstrap =
            serde_yaml::from_str("components:\n  foo:\n    a: 1\nlists:\n  tags: [x]\n").unwrap();
        assert_eq!(bootstrap.components["foo"], json!({"a": 1}));
        assert_eq!(bootstrap.lists["tags"], json!(["x"]));
    }
}
