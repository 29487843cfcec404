//! Content API client
//!
//! GET failures come back as [`RemoteError`] so callers can tell "missing"
//! (404) apart from real failures. PUT and search results are structured
//! values: network and status failures never escape as errors, so a batch of
//! thousands of writes keeps going past individual failures. The only thing
//! that fails at call time is a missing authorization key.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::debug;

use super::transport::{HttpTransport, Method, Request, Response, Transport};
use super::RemoteError;
use crate::domain::uri;
use crate::domain::ItemResult;

/// Default number of simultaneous requests
pub const DEFAULT_CONCURRENCY: usize = 10;

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// How a request or response body is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    #[default]
    Json,
    Text,
}

impl BodyType {
    fn content_type(&self) -> &'static str {
        match self {
            BodyType::Json => JSON_CONTENT_TYPE,
            BodyType::Text => TEXT_CONTENT_TYPE,
        }
    }
}

/// Outcome of a search query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Success { data: Vec<Value>, total: u64 },
    Error { url: String, message: String },
}

/// Concurrency-limited client for one or more content API sites
#[derive(Clone)]
pub struct RemoteClient {
    transport: Arc<dyn Transport>,
    limit: Arc<Semaphore>,
    headers: Vec<(String, String)>,
}

impl RemoteClient {
    /// Creates a client over `transport` allowing `concurrency` requests in flight
    pub fn new(transport: Arc<dyn Transport>, concurrency: usize) -> Self {
        Self {
            transport,
            limit: Arc::new(Semaphore::new(concurrency.max(1))),
            headers: Vec::new(),
        }
    }

    /// Creates a client that talks HTTP
    pub fn http(concurrency: usize) -> Result<Self, RemoteError> {
        Ok(Self::new(Arc::new(HttpTransport::new()?), concurrency))
    }

    /// Adds headers sent with every request
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    async fn send(&self, request: Request) -> Result<Response, RemoteError> {
        let _permit = self
            .limit
            .acquire()
            .await
            .map_err(|e| RemoteError::Transport {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

        debug!(method = request.method.as_str(), url = %request.url, "request");
        self.transport.send(request.headers(&self.headers)).await
    }

    fn check_status(url: &str, response: &Response) -> Result<(), RemoteError> {
        match response.status {
            _ if response.is_success() => Ok(()),
            404 => Err(RemoteError::NotFound {
                url: url.to_string(),
            }),
            status => Err(RemoteError::Status {
                url: url.to_string(),
                status,
            }),
        }
    }

    /// Fetches a URI, decoding the body as JSON or returning it as a string value
    pub async fn get(&self, uri: &str, body_type: BodyType) -> Result<Value, RemoteError> {
        let url = uri::uri_to_url(uri);
        let response = self.send(Request::new(Method::Get, url.clone())).await?;
        Self::check_status(&url, &response)?;

        match body_type {
            BodyType::Json => serde_json::from_str(&response.body).map_err(|e| {
                RemoteError::Decode {
                    url,
                    message: e.to_string(),
                }
            }),
            BodyType::Text => Ok(Value::String(response.body)),
        }
    }

    /// Fetches JSON data
    pub async fn get_json(&self, uri: &str) -> Result<Value, RemoteError> {
        self.get(uri, BodyType::Json).await
    }

    /// Fetches a text body
    pub async fn get_text(&self, uri: &str) -> Result<String, RemoteError> {
        match self.get(uri, BodyType::Text).await? {
            Value::String(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }

    /// Fetches data with every child component inlined (`<uri>.json`)
    pub async fn get_composed(&self, uri: &str) -> Result<Value, RemoteError> {
        self.get_json(&format!("{}.json", uri::strip_extension(uri)))
            .await
    }

    /// Fetches a JSON array of URIs (a collection index)
    pub async fn get_list(&self, uri: &str) -> Result<Vec<String>, RemoteError> {
        let value = self.get_json(uri).await?;
        let items = value.as_array().ok_or_else(|| RemoteError::Decode {
            url: uri::uri_to_url(uri),
            message: "expected a JSON array".to_string(),
        })?;

        Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    /// Returns whether a URI exists, treating 404 as `false`
    pub async fn exists(&self, uri: &str) -> Result<bool, RemoteError> {
        match self.get_json(uri).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Writes data to a URI
    ///
    /// Fails immediately if `key` is missing; otherwise the returned future
    /// always resolves to a result value.
    pub fn put(
        &self,
        uri: &str,
        data: &Value,
        key: Option<&str>,
        body_type: BodyType,
    ) -> Result<BoxFuture<'static, ItemResult>, RemoteError> {
        let key = require_key(key, "put")?;
        let url = uri::uri_to_url(uri);

        let body = match (body_type, data) {
            (BodyType::Text, Value::String(text)) => text.clone(),
            _ => data.to_string(),
        };

        let request = Request::new(Method::Put, url.clone())
            .header("Authorization", format!("Token {}", key))
            .header("Content-Type", body_type.content_type())
            .body(body);

        let client = self.clone();
        Ok(async move {
            let response = match client.send(request).await {
                Ok(response) => response,
                Err(e) => return ItemResult::error(url, e.to_string()),
            };

            match Self::check_status(&url, &response) {
                Ok(()) => ItemResult::success(url),
                Err(e) => ItemResult::error(url, e.to_string()),
            }
        }
        .boxed())
    }

    /// Runs an Elasticsearch query against `<prefix>/_search`
    ///
    /// Fails immediately if `key` is missing.
    pub fn query(
        &self,
        url: &str,
        query: &Value,
        key: Option<&str>,
    ) -> Result<BoxFuture<'static, QueryResult>, RemoteError> {
        let key = require_key(key, "query")?;
        let url = uri::uri_to_url(url);

        let request = Request::new(Method::Post, url.clone())
            .header("Authorization", format!("Token {}", key))
            .header("Content-Type", JSON_CONTENT_TYPE)
            .body(query.to_string());

        let client = self.clone();
        Ok(async move {
            match client.send(request).await {
                Ok(response) => classify_query_response(&url, &response),
                Err(e) => QueryResult::Error {
                    url,
                    message: e.to_string(),
                },
            }
        }
        .boxed())
    }
}

fn require_key<'a>(key: Option<&'a str>, operation: &'static str) -> Result<&'a str, RemoteError> {
    key.filter(|k| !k.trim().is_empty())
        .ok_or(RemoteError::MissingKey { operation })
}

/// Sorts a search response into success, "No results", or an error message
fn classify_query_response(url: &str, response: &Response) -> QueryResult {
    let error = |message: String| QueryResult::Error {
        url: url.to_string(),
        message,
    };

    let body: Value = match serde_json::from_str(&response.body) {
        Ok(body) => body,
        // HTML/plain error pages: keep the first line, drop any stack trace
        Err(_) => {
            let message = response.body.split('\n').next().unwrap_or("").trim();
            return error(message.to_string());
        }
    };

    if !response.is_success() {
        let message = body
            .get("message")
            .or_else(|| body.get("error"))
            .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()))
            .unwrap_or_else(|| format!("HTTP {}", response.status));
        return error(message);
    }

    let hits = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if hits.is_empty() {
        return error("No results".to_string());
    }

    let total = match body.pointer("/hits/total") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(total) => total.get("value").and_then(Value::as_u64),
        None => None,
    }
    .unwrap_or(hits.len() as u64);

    let data = hits
        .into_iter()
        .map(|hit| {
            let mut source = hit.get("_source").cloned().unwrap_or_else(|| Value::Object(Default::default()));
            if let (Value::Object(map), Some(id)) = (&mut source, hit.get("_id")) {
                map.insert("_id".to_string(), id.clone());
            }
            source
        })
        .collect();

    QueryResult::Success { data, total }
}
