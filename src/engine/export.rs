//! Export Engine
//!
//! Turns a URL into portable chunks. Every URL is first classified into a
//! [`UrlKind`], then routed through one dispatch table; collection kinds fetch
//! their index and fan out to the single-item exporters.
//!
//! Dedup state lives in an [`ExportSession`] owned by the caller, so one run
//! that touches many pages exports each shared layout once, and separate runs
//! never see each other's state.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::bootstrap::{to_bootstrap, Bootstrap};
use crate::domain::chunk::{to_chunk, ChunkError, Dispatch};
use crate::domain::refs;
use crate::domain::uri::{self, UriType};
use crate::remote::{Pacer, QueryResult, RemoteClient, RemoteError, DEFAULT_WINDOW};

/// A failed export, naming the URL that could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("Export of {url} failed: {message}")]
pub struct ExportError {
    pub url: String,
    pub message: String,
}

impl ExportError {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

impl From<RemoteError> for ExportError {
    fn from(e: RemoteError) -> Self {
        Self::new(e.url(), e.to_string())
    }
}

/// What a URL points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlKind {
    /// A component/layout instance or its default data
    ComponentInstance { uri: String, layout: bool },
    /// `<prefix>/_components/<name>/instances`
    ComponentCollection { uri: String, layout: bool },
    /// `<prefix>/_components` (or `_layouts`)
    AllComponents { prefix: String, layout: bool },
    Page { uri: String },
    PageCollection { prefix: String },
    UriEntry { uri: String },
    UriCollection { prefix: String },
    ListOrUserEntry { uri: String, kind: UriType },
    ListOrUserCollection { prefix: String, kind: UriType },
    /// Anything else: a public page URL resolved through `_uris`
    PublicUrl { url: String },
}

impl UrlKind {
    pub fn classify(url: &str) -> Self {
        let uri = uri::strip_extension(uri::url_to_uri(url.trim()));
        let uri = uri.trim_end_matches('/');

        let Some((start, kind)) = uri::find_type(uri) else {
            return UrlKind::PublicUrl {
                url: url.trim().to_string(),
            };
        };

        let prefix = uri[..start].to_string();
        let parts: Vec<&str> = uri[start + 1..].split('/').collect();
        let uri = uri.to_string();

        match (kind, parts.len()) {
            (UriType::Component | UriType::Layout, len) => {
                let layout = kind == UriType::Layout;
                match len {
                    1 => UrlKind::AllComponents { prefix, layout },
                    3 if parts[2] == "instances" => UrlKind::ComponentCollection { uri, layout },
                    _ => UrlKind::ComponentInstance { uri, layout },
                }
            }
            (UriType::Page, 1) => UrlKind::PageCollection { prefix },
            (UriType::Page, _) => UrlKind::Page { uri },
            (UriType::Uri, 1) => UrlKind::UriCollection { prefix },
            (UriType::Uri, _) => UrlKind::UriEntry { uri },
            (UriType::List | UriType::User, 1) => UrlKind::ListOrUserCollection { prefix, kind },
            (UriType::List | UriType::User, _) => UrlKind::ListOrUserEntry { uri, kind },
        }
    }
}

/// Dedup state for one export run
#[derive(Debug, Default)]
pub struct ExportSession {
    exported_layouts: Mutex<HashSet<String>>,
    visited: Mutex<HashSet<String>>,
}

impl ExportSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a URI as exported, returning false if it already was
    fn claim(&self, uri: &str) -> bool {
        insert(&self.visited, uri)
    }

    /// Marks a layout as exported, returning false if it already was
    fn claim_layout(&self, uri: &str) -> bool {
        insert(&self.exported_layouts, uri)
    }

    /// Layouts exported so far in this run
    pub fn exported_layouts(&self) -> Vec<String> {
        let layouts = self.exported_layouts.lock().unwrap_or_else(|e| e.into_inner());
        let mut layouts: Vec<String> = layouts.iter().cloned().collect();
        layouts.sort();
        layouts
    }

    /// Forgets everything, so the session can start an unrelated run
    pub fn clear(&self) {
        self.exported_layouts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.visited.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

fn insert(set: &Mutex<HashSet<String>>, uri: &str) -> bool {
    set.lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(uri.to_string())
}

/// Shape of the export output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Dispatch,
    Bootstrap,
}

/// Export output in the requested format
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutput {
    Dispatches(Vec<Dispatch>),
    Bootstrap(Bootstrap),
}

impl ExportOutput {
    pub fn new(dispatches: Vec<Dispatch>, format: ExportFormat) -> Result<Self, ChunkError> {
        match format {
            ExportFormat::Dispatch => Ok(ExportOutput::Dispatches(dispatches)),
            ExportFormat::Bootstrap => Ok(ExportOutput::Bootstrap(to_bootstrap(&dispatches)?)),
        }
    }
}

/// Fetches content from a site as portable chunks
pub struct Exporter {
    client: RemoteClient,
    concurrency: usize,
    pacer: Option<Arc<Pacer>>,
    include_layouts: bool,
}

impl Exporter {
    /// Creates an exporter pacing itself to `concurrency` requests per second
    pub fn new(client: RemoteClient, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            client,
            concurrency,
            pacer: Some(Arc::new(Pacer::new(concurrency, DEFAULT_WINDOW))),
            include_layouts: false,
        }
    }

    /// Also export each page's layout (once per session)
    pub fn with_layouts(mut self, include: bool) -> Self {
        self.include_layouts = include;
        self
    }

    /// Replaces the default pacer
    pub fn with_pacer(mut self, pacer: Option<Arc<Pacer>>) -> Self {
        self.pacer = pacer;
        self
    }

    async fn pace(&self) {
        if let Some(pacer) = &self.pacer {
            pacer.acquire().await;
        }
    }

    async fn fetch_json(&self, uri: &str) -> Result<Value, ExportError> {
        self.pace().await;
        Ok(self.client.get_json(uri).await?)
    }

    async fn fetch_list(&self, uri: &str) -> Result<Vec<String>, ExportError> {
        self.pace().await;
        Ok(self.client.get_list(uri).await?)
    }

    /// Exports everything a URL points at
    pub async fn export(
        &self,
        url: &str,
        session: &ExportSession,
    ) -> Result<Vec<Dispatch>, ExportError> {
        let kind = UrlKind::classify(url);
        debug!(?kind, "export");

        match kind {
            UrlKind::ComponentInstance { uri, .. } => self.export_component(uri, session).await,
            UrlKind::ComponentCollection { uri, .. } => {
                let prefix = prefix_of(&uri);
                let instances = self.fetch_list(&uri).await?;
                self.export_each(absolute_all(&prefix, instances), |u| {
                    self.export_component(u, session)
                })
                .await
            }
            UrlKind::AllComponents { prefix, layout } => {
                let kind = if layout {
                    UriType::Layout
                } else {
                    UriType::Component
                };
                self.export_all_components(&prefix, kind, session).await
            }
            UrlKind::Page { uri } => self.export_page(uri, session).await,
            UrlKind::PageCollection { prefix } => {
                let pages = self.collection(&prefix, UriType::Page).await?;
                self.export_each(pages, |u| self.export_page(u, session)).await
            }
            UrlKind::UriEntry { uri } => self.export_uri_entry(uri, session).await,
            UrlKind::UriCollection { prefix } => {
                let uris = self.collection(&prefix, UriType::Uri).await?;
                self.export_each(uris, |u| self.export_uri_entry(u, session))
                    .await
            }
            UrlKind::ListOrUserEntry { uri, .. } => self.export_json(uri, session).await,
            UrlKind::ListOrUserCollection { prefix, kind } => {
                let entries = self.collection(&prefix, kind).await?;
                self.export_each(entries, |u| self.export_json(u, session))
                    .await
            }
            UrlKind::PublicUrl { url } => {
                let page = self.resolve_public_url(&url).await?;
                self.export_page(page, session).await
            }
        }
    }

    /// Exports several roots concurrently; no ordering between roots
    pub async fn export_all(
        &self,
        urls: &[String],
        session: &ExportSession,
    ) -> Vec<Result<Vec<Dispatch>, ExportError>> {
        stream::iter(urls)
            .map(|url| self.export(url, session))
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    /// Exports every page matched by a search query against `<prefix>/_search`
    pub async fn export_query(
        &self,
        prefix: &str,
        query: &Value,
        key: Option<&str>,
        session: &ExportSession,
    ) -> Result<Vec<Dispatch>, ExportError> {
        let prefix = site_prefix(prefix);
        let search = format!("{}/_search", prefix);

        self.pace().await;
        let hits = match self.client.query(&search, query, key)?.await {
            QueryResult::Success { data, total } => {
                info!(total, "search matched");
                data
            }
            QueryResult::Error { url, message } => return Err(ExportError::new(url, message)),
        };

        let pages: Vec<String> = hits
            .iter()
            .filter_map(|hit| hit.get("_id").and_then(Value::as_str))
            .map(|id| absolute(&prefix, id))
            .collect();

        self.export_each(pages, |u| self.export_page(u, session)).await
    }

    /// Finds the site prefix and canonical page URI for a public URL
    ///
    /// Tries `<candidate>/_uris/<base64(host + path)>` for each candidate
    /// prefix, dropping one path segment at a time down to the bare host.
    pub async fn resolve_public_url(&self, url: &str) -> Result<String, ExportError> {
        let not_found = || ExportError::new(url, format!("Unable to find API for {}", url));

        let parsed = url::Url::parse(&uri::uri_to_url(url)).map_err(|_| not_found())?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(not_found()),
        };

        let public = format!("{}{}", host, parsed.path());
        let key = uri::encode_uri_key(&public);
        let mut segments: Vec<&str> = public.split('/').collect();

        while segments.len() > 1 {
            segments.pop();
            let candidate = segments.join("/");
            let lookup = format!(
                "{}://{}{}/{}",
                parsed.scheme(),
                candidate,
                UriType::Uri.segment(),
                key
            );

            self.pace().await;
            match self.client.get_text(&lookup).await {
                Ok(page) => {
                    let page = page.trim();
                    if UriType::from_uri(page) == Some(UriType::Page) {
                        let page = uri::add_prefix(&candidate, page);
                        info!(url, page = %page, "resolved public url");
                        return Ok(page);
                    }
                    debug!(lookup = %lookup, "uri does not point at a page");
                }
                Err(e) => debug!(lookup = %lookup, error = %e, "no api at candidate"),
            }
        }

        Err(not_found())
    }

    async fn export_each<F, Fut>(&self, uris: Vec<String>, f: F) -> Result<Vec<Dispatch>, ExportError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Vec<Dispatch>, ExportError>>,
    {
        let batches: Vec<Vec<Dispatch>> = stream::iter(uris)
            .map(f)
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        Ok(batches.into_iter().flatten().collect())
    }

    async fn collection(&self, prefix: &str, kind: UriType) -> Result<Vec<String>, ExportError> {
        let index = format!("{}{}", prefix, kind.segment());
        let items = self.fetch_list(&index).await?;
        Ok(absolute_all(prefix, items))
    }

    /// A component or layout, with its descendants inlined
    async fn export_component(
        &self,
        uri: String,
        session: &ExportSession,
    ) -> Result<Vec<Dispatch>, ExportError> {
        if !session.claim(&uri) {
            return Ok(Vec::new());
        }

        self.pace().await;
        let data = self.client.get_composed(&uri).await?;
        Ok(vec![to_chunk(&uri, &data)])
    }

    async fn export_all_components(
        &self,
        prefix: &str,
        kind: UriType,
        session: &ExportSession,
    ) -> Result<Vec<Dispatch>, ExportError> {
        let names = self.fetch_list(&format!("{}{}", prefix, kind.segment())).await?;
        let bases: Vec<String> = names
            .iter()
            .map(|name| format!("{}{}/{}", prefix, kind.segment(), name))
            .collect();

        self.export_each(bases, |base| async move {
            let mut dispatches = Vec::new();

            // default data is optional
            if session.claim(&base) {
                self.pace().await;
                match self.client.get_composed(&base).await {
                    Ok(data) => dispatches.push(to_chunk(&base, &data)),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
            }

            let instances = self.fetch_list(&format!("{}/instances", base)).await?;
            dispatches.extend(
                self.export_each(absolute_all(prefix, instances), |u| {
                    self.export_component(u, session)
                })
                .await?,
            );
            Ok(dispatches)
        })
        .await
    }

    /// A page, then every component in its areas and (optionally) its layout
    async fn export_page(
        &self,
        uri: String,
        session: &ExportSession,
    ) -> Result<Vec<Dispatch>, ExportError> {
        if !session.claim(&uri) {
            return Ok(Vec::new());
        }

        let page = self.fetch_json(&uri).await?;
        let prefix = prefix_of(&uri);

        let mut children: Vec<String> = refs::area_uris(&page)
            .into_iter()
            .filter(|u| UriType::from_uri(u).is_some_and(|t| t.is_component_like()))
            .map(|u| absolute(&prefix, &u))
            .collect();

        if self.include_layouts {
            if let Some(layout) = page.get("layout").and_then(Value::as_str) {
                let layout = absolute(&prefix, layout);
                if session.claim_layout(&layout) {
                    children.push(layout);
                }
            }
        }

        let mut dispatches = vec![to_chunk(&uri, &page)];
        dispatches.extend(
            self.export_each(children, |u| self.export_component(u, session))
                .await?,
        );
        Ok(dispatches)
    }

    async fn export_uri_entry(
        &self,
        uri: String,
        session: &ExportSession,
    ) -> Result<Vec<Dispatch>, ExportError> {
        if !session.claim(&uri) {
            return Ok(Vec::new());
        }

        self.pace().await;
        let target = self.client.get_text(&uri).await?;
        Ok(vec![to_chunk(&uri, &Value::String(target.trim().to_string()))])
    }

    /// Lists and users
    async fn export_json(
        &self,
        uri: String,
        session: &ExportSession,
    ) -> Result<Vec<Dispatch>, ExportError> {
        if !session.claim(&uri) {
            return Ok(Vec::new());
        }

        let data = self.fetch_json(&uri).await?;
        Ok(vec![to_chunk(&uri, &data)])
    }
}

/// Normalizes a site argument (`http://d.com/`, `d.com`) to a URI prefix
pub fn site_prefix(site: &str) -> String {
    uri::url_to_uri(site.trim()).trim_end_matches('/').to_string()
}

fn prefix_of(uri: &str) -> String {
    uri::get_prefix(uri).unwrap_or_default().to_string()
}

fn absolute(prefix: &str, item: &str) -> String {
    uri::add_prefix(prefix, uri::url_to_uri(item))
}

fn absolute_all(prefix: &str, items: Vec<String>) -> Vec<String> {
    items.iter().map(|item| absolute(prefix, item)).collect()
}
