//! Lint Engine
//!
//! Checks that content is complete: every referenced component exists, a
//! page's layout exists, and pages render. Lint findings are data, never
//! errors, so one run reports every broken reference at once.

use std::collections::{BTreeMap, HashSet};

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::domain::bootstrap::Bootstrap;
use crate::domain::chunk::ChunkError;
use crate::domain::refs;
use crate::domain::uri::{self, UriType};
use crate::domain::ItemResult;
use crate::remote::RemoteClient;

/// One lint finding: `success` for a resolved URI, `error` with a reason otherwise
pub type LintResult = ItemResult;

/// Walks live content on a site
pub struct Linter {
    client: RemoteClient,
    concurrency: usize,
}

impl Linter {
    pub fn new(client: RemoteClient, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// Checks a component or page and everything it references, level by level
    pub async fn lint_url(&self, url: &str) -> Vec<LintResult> {
        let root = uri::strip_extension(uri::url_to_uri(url.trim()))
            .trim_end_matches('/')
            .to_string();
        let is_page = UriType::from_uri(&root) == Some(UriType::Page);

        let mut results = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut level = vec![root.clone()];
        visited.insert(root.clone());

        if is_page {
            results.push(self.check_render(&root).await);
        }

        while !level.is_empty() {
            debug!(count = level.len(), "linting level");
            let checked: Vec<(LintResult, Vec<String>)> = stream::iter(level)
                .map(|uri| self.check(uri))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            level = Vec::new();
            for (result, children) in checked {
                results.push(result);
                for child in children {
                    if visited.insert(child.clone()) {
                        level.push(child);
                    }
                }
            }
        }

        results
    }

    /// Fetches one URI, returning its result and the URIs it references
    async fn check(&self, uri: String) -> (LintResult, Vec<String>) {
        let data = match self.client.get_json(&uri).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                return (ItemResult::error(uri::uri_to_url(&uri), "Missing"), Vec::new())
            }
            Err(e) => return (ItemResult::error(uri::uri_to_url(&uri), e.to_string()), Vec::new()),
        };

        let prefix = uri::get_prefix(&uri).unwrap_or_default();
        let children = references(&uri, &data)
            .into_iter()
            .map(|child| uri::add_prefix(prefix, &child))
            .collect();

        (ItemResult::success(uri::uri_to_url(&uri)), children)
    }

    /// A page must render to HTML without an error status
    async fn check_render(&self, page: &str) -> LintResult {
        let html = format!("{}.html", page);
        match self.client.get_text(&html).await {
            Ok(_) => ItemResult::success(uri::uri_to_url(&html)),
            Err(e) => ItemResult::error(uri::uri_to_url(&html), format!("Render failed: {}", e)),
        }
    }
}

/// URIs an entry depends on: component refs, plus areas and layout for pages
fn references(entry: &str, data: &Value) -> Vec<String> {
    let mut found = refs::child_uris(data);

    if UriType::from_uri(entry) == Some(UriType::Page) {
        found.extend(
            refs::area_uris(data)
                .into_iter()
                .filter(|u| UriType::from_uri(u).is_some_and(|t| t.is_component_like())),
        );
        if let Some(layout) = data.get("layout").and_then(Value::as_str) {
            found.push(layout.to_string());
        }
    }

    let mut seen = HashSet::new();
    found.retain(|u| seen.insert(u.clone()));
    found
}

/// Checks every reference in a bootstrap resolves
///
/// A reference resolves if the bootstrap itself defines it or, when `remote`
/// is given, it exists on that site (`(client, site prefix)`). One result is
/// returned per distinct reference.
pub async fn lint_bootstrap(
    bootstrap: &Bootstrap,
    remote: Option<(&RemoteClient, &str)>,
) -> Result<Vec<LintResult>, ChunkError> {
    let entries = bootstrap.flatten()?;
    let defined: HashSet<String> = entries
        .iter()
        .map(|entry| uri::without_version(&entry.uri))
        .collect();

    // reference -> first entry that points at it
    let mut wanted: BTreeMap<String, String> = BTreeMap::new();
    for entry in &entries {
        for reference in references(&entry.uri, &entry.data) {
            let reference = uri::strip_prefix(&reference).to_string();
            wanted.entry(reference).or_insert_with(|| entry.uri.clone());
        }
    }

    let missing = |reference: &str, from: &str| {
        ItemResult::error(reference, format!("Missing (referenced by {})", from))
    };

    let mut results = Vec::new();
    let mut unresolved = Vec::new();
    for (reference, from) in wanted {
        if defined.contains(&uri::without_version(&reference)) {
            results.push(ItemResult::success(reference));
        } else {
            unresolved.push((reference, from));
        }
    }

    match remote {
        None => results.extend(unresolved.iter().map(|(r, from)| missing(r, from))),
        Some((client, prefix)) => {
            let prefix = uri::url_to_uri(prefix).trim_end_matches('/');
            let checked: Vec<LintResult> = stream::iter(unresolved)
                .map(|(reference, from)| async move {
                    match client.exists(&uri::add_prefix(prefix, &reference)).await {
                        Ok(true) => ItemResult::success(reference),
                        Ok(false) => missing(&reference, &from),
                        Err(e) => ItemResult::error(reference, e.to_string()),
                    }
                })
                .buffered(crate::remote::DEFAULT_CONCURRENCY)
                .collect()
                .await;
            results.extend(checked);
        }
    }

    Ok(results)
}
