//! In-memory content API
//!
//! [`MemorySite`] answers the same endpoint shapes as a real Clay server:
//! component/page/list/user/uri GET and PUT, `.json` composed reads, `.html`
//! renders, collection indexes and `_search`. One instance can host several
//! sites at once since documents are keyed by protocol-less URI.
//!
//! Used by the test suite and handy for dry runs when embedding the engines.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::transport::{Method, Request, Response, Transport};
use super::RemoteError;
use crate::domain::refs;
use crate::domain::uri::{self, UriType};

#[derive(Debug, Clone)]
enum Stored {
    Json(Value),
    Text(String),
}

#[derive(Debug, Default)]
struct SiteState {
    documents: BTreeMap<String, Stored>,
    failures: HashMap<String, u16>,
    search_hits: Vec<Value>,
    requests: Vec<Request>,
}

/// A fake content API holding documents in memory
#[derive(Debug, Default)]
pub struct MemorySite {
    state: Mutex<SiteState>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Normalizes a URL or URI into a document key
fn key_for(url: &str) -> String {
    let uri = uri::url_to_uri(url);
    let uri = uri.split('?').next().unwrap_or(uri);
    uri.trim_end_matches('/').to_string()
}

impl MemorySite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every response, to observe concurrency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SiteState> {
        // a panicking test thread must not cascade into every other assertion
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stores JSON data at a URI
    pub fn insert(&self, uri: &str, data: Value) {
        self.state().documents.insert(key_for(uri), Stored::Json(data));
    }

    /// Stores a text body at a URI (e.g. `/_uris/...`)
    pub fn insert_text(&self, uri: &str, text: &str) {
        self.state()
            .documents
            .insert(key_for(uri), Stored::Text(text.to_string()));
    }

    /// Returns JSON data stored at a URI
    pub fn get(&self, uri: &str) -> Option<Value> {
        match self.state().documents.get(&key_for(uri)) {
            Some(Stored::Json(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns a text body stored at a URI
    pub fn text(&self, uri: &str) -> Option<String> {
        match self.state().documents.get(&key_for(uri)) {
            Some(Stored::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.state().documents.contains_key(&key_for(uri))
    }

    /// Makes every request to a URI answer with `status`
    pub fn fail(&self, uri: &str, status: u16) {
        self.state().failures.insert(key_for(uri), status);
    }

    /// Sets the hits returned by `_search`
    pub fn set_search_hits(&self, hits: Vec<Value>) {
        self.state().search_hits = hits;
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }

    /// URLs of every PUT received so far, in arrival order
    pub fn puts(&self) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::Put)
            .collect()
    }

    /// Highest number of requests observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn respond(&self, request: &Request) -> Response {
        let mut state = self.state();
        state.requests.push(request.clone());

        let key = key_for(&request.url);
        let base = uri::strip_extension(&key).to_string();
        if let Some(status) = state
            .failures
            .get(&key)
            .or_else(|| state.failures.get(&base))
        {
            return Response::new(*status, "Internal Server Error\n    at handler (server.js:1)");
        }

        match request.method {
            Method::Get => state.get(&key),
            Method::Put => state.put(&key, request),
            Method::Post if key.ends_with("/_search") => {
                let hits = state.search_hits.clone();
                Response::json(200, &json!({"hits": {"total": hits.len(), "hits": hits}}))
            }
            Method::Post => Response::new(404, "Not Found"),
        }
    }
}

impl SiteState {
    fn lookup(&self, uri: &str) -> Option<&Value> {
        match self.documents.get(&key_for(uri)) {
            Some(Stored::Json(value)) => Some(value),
            _ => None,
        }
    }

    fn get(&self, key: &str) -> Response {
        if let Some(base) = key.strip_suffix(".json") {
            return match self.lookup(base) {
                Some(data) => {
                    let composed = refs::compose(data, |u| self.lookup(u));
                    Response::json(200, &composed.data)
                }
                None => Response::new(404, "Not Found"),
            };
        }

        if let Some(base) = key.strip_suffix(".html") {
            return match self.lookup(base) {
                Some(_) => Response {
                    status: 200,
                    content_type: Some("text/html; charset=UTF-8".to_string()),
                    body: "<html><body></body></html>".to_string(),
                },
                None => Response::new(404, "Not Found"),
            };
        }

        match self.documents.get(key) {
            Some(Stored::Json(value)) => return Response::json(200, value),
            Some(Stored::Text(text)) => return Response::new(200, text.clone()),
            None => {}
        }

        match self.collection(key) {
            Some(items) => Response::json(200, &Value::from(items)),
            None => Response::new(404, "Not Found"),
        }
    }

    /// Answers collection indexes: component names, instance URIs, or entry URIs
    fn collection(&self, key: &str) -> Option<Vec<String>> {
        let kind = UriType::from_uri(key)?;
        let rel = uri::strip_prefix(key);
        let parts: Vec<&str> = rel.trim_start_matches('/').split('/').collect();
        let children = format!("{}/", key);

        let keys = self
            .documents
            .keys()
            .filter(|k| k.starts_with(&children) && !k.contains('@'));

        match parts.as_slice() {
            [_] if kind.is_component_like() => {
                let names: BTreeSet<String> = keys
                    .filter_map(|k| uri::component_name(k).map(str::to_string))
                    .collect();
                Some(names.into_iter().collect())
            }
            [_] => Some(keys.cloned().collect()),
            [_, _, "instances"] if kind.is_component_like() => Some(keys.cloned().collect()),
            _ => None,
        }
    }

    /// Stores a write; component data is split so every child lands at its own URI
    fn put(&mut self, key: &str, request: &Request) -> Response {
        let body = request.body.clone().unwrap_or_default();
        let is_json = request
            .header_value("content-type")
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(true);

        if !is_json {
            self.documents.insert(key.to_string(), Stored::Text(body.clone()));
            return Response::new(200, body);
        }

        let mut data: Value = match serde_json::from_str(&body) {
            Ok(data) => data,
            Err(e) => return Response::new(400, e.to_string()),
        };

        if UriType::from_uri(key).is_some_and(|t| t.is_component_like()) {
            if let Value::Object(map) = &mut data {
                map.remove(refs::REF);
            }
            for child in refs::normalize(&mut data) {
                self.documents.insert(key_for(&child.uri), Stored::Json(child.data));
            }
        }

        self.documents.insert(key.to_string(), Stored::Json(data.clone()));
        Response::json(200, &data)
    }
}

#[async_trait]
impl Transport for MemorySite {
    async fn send(&self, request: Request) -> Result<Response, RemoteError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = self.respond(&request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(response)
    }
}
