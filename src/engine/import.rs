//! Import Engine
//!
//! Writes portable content into a target site:
//!
//! 1. chunks are rewritten to the target prefix (keys and references)
//! 2. unless layouts may be overwritten, layouts are split into one asset per
//!    component and anything already on the target is marked skipped
//! 3. lists are merged with the target's copy instead of replaced
//! 4. everything is PUT, non-page assets first and pages last
//!
//! A failed PUT becomes an error result and the rest carry on. Bad input and
//! missing credentials fail the whole import before anything is written.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::export::{site_prefix, ExportError, ExportSession, Exporter};
use crate::domain::bootstrap::Bootstrap;
use crate::domain::chunk::{self, ChunkError, Dispatch};
use crate::domain::uri::{self, UriType};
use crate::domain::{atomize, dedupe, merge_lists, Asset, ItemResult};
use crate::remote::{BodyType, RemoteClient, RemoteError, DEFAULT_CONCURRENCY};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid chunk: {0}")]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Invalid target site: '{0}'")]
    InvalidTarget(String),
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Simultaneous requests against the target
    pub concurrency: usize,

    /// API key for the target site
    pub key: Option<String>,

    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,

    /// Replace layouts (and their children) that already exist on the target
    pub overwrite_layouts: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            key: None,
            headers: Vec::new(),
            overwrite_layouts: false,
        }
    }
}

pub struct Importer {
    client: RemoteClient,
    options: ImportOptions,
}

impl Importer {
    pub fn new(client: RemoteClient, options: ImportOptions) -> Self {
        let client = client.with_headers(options.headers.clone());
        Self { client, options }
    }

    fn key(&self) -> Result<&str, ImportError> {
        self.options
            .key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ImportError::Remote(RemoteError::MissingKey {
                operation: "import",
            }))
    }

    fn concurrency(&self) -> usize {
        self.options.concurrency.max(1)
    }

    /// Copies content from live source URLs into `target`
    pub async fn import_urls(
        &self,
        urls: &[String],
        target: &str,
    ) -> Result<Vec<ItemResult>, ImportError> {
        let key = self.key()?;
        let target = target_prefix(target)?;

        let exporter = Exporter::new(self.client.clone(), self.concurrency()).with_layouts(true);
        let session = ExportSession::new();

        let mut dispatches = Vec::new();
        for exported in exporter.export_all(urls, &session).await {
            dispatches.extend(exported?);
        }

        info!(count = dispatches.len(), target = %target, "importing exported content");
        Ok(self.run(dispatches, &target, key).await)
    }

    /// Writes chunks or dispatches (an export stream) into `target`
    pub async fn import_dispatches(
        &self,
        dispatches: &[Dispatch],
        target: &str,
    ) -> Result<Vec<ItemResult>, ImportError> {
        let key = self.key()?;
        let target = target_prefix(target)?;

        for dispatch in dispatches {
            if dispatch.is_relative() {
                chunk::validate_key(&dispatch.uri)?;
            } else if dispatch.uri_type().is_none() {
                return Err(ChunkError::UnknownType(dispatch.uri.clone()).into());
            }
        }

        Ok(self.run(dispatches.to_vec(), &target, key).await)
    }

    /// Writes a bootstrap document into `target`
    pub async fn import_bootstrap(
        &self,
        bootstrap: &Bootstrap,
        target: &str,
    ) -> Result<Vec<ItemResult>, ImportError> {
        let dispatches = bootstrap.to_dispatch()?;
        self.import_dispatches(&dispatches, target).await
    }

    async fn run(&self, dispatches: Vec<Dispatch>, target: &str, key: &str) -> Vec<ItemResult> {
        let mut assets = plan(dispatches, target);

        if !self.options.overwrite_layouts {
            assets = self.skip_existing(split_layouts(assets)).await;
        }

        let (pages, others): (Vec<Asset>, Vec<Asset>) = assets.into_iter().partition(Asset::is_page);

        let mut results = self.write_all(others, key).await;
        results.extend(self.write_all(pages, key).await);
        results
    }

    /// Marks `overwrite: false` assets that already exist on the target
    async fn skip_existing(&self, assets: Vec<Asset>) -> Vec<Asset> {
        stream::iter(assets)
            .map(|mut asset| async move {
                if asset.overwrite {
                    return asset;
                }

                match self.client.exists(&asset.url).await {
                    Ok(true) => {
                        debug!(url = %asset.url, "already on target, skipping");
                        asset.skip = true;
                    }
                    Ok(false) => {}
                    Err(e) => warn!(url = %asset.url, error = %e, "existence check failed"),
                }
                asset
            })
            .buffered(self.concurrency())
            .collect()
            .await
    }

    async fn write_all(&self, assets: Vec<Asset>, key: &str) -> Vec<ItemResult> {
        stream::iter(assets)
            .map(|asset| self.write(asset, key))
            .buffered(self.concurrency())
            .collect()
            .await
    }

    async fn write(&self, mut asset: Asset, key: &str) -> ItemResult {
        if asset.skip {
            return ItemResult::skipped(uri::uri_to_url(&asset.url));
        }

        if asset.is_list() {
            match self.merge_list(&asset).await {
                Ok(merged) => asset.data = merged,
                Err(e) => return ItemResult::error(uri::uri_to_url(&asset.url), e.to_string()),
            }
        }

        let body_type = match asset.uri_type() {
            Some(UriType::Uri) => BodyType::Text,
            _ => BodyType::Json,
        };

        match self.client.put(&asset.url, &asset.data, Some(key), body_type) {
            Ok(put) => put.await,
            Err(e) => ItemResult::error(uri::uri_to_url(&asset.url), e.to_string()),
        }
    }

    /// Source items first, then target items not already present
    async fn merge_list(&self, asset: &Asset) -> Result<Value, RemoteError> {
        let Some(source) = asset.data.as_array() else {
            return Ok(asset.data.clone());
        };

        let existing = match self.client.get_json(&asset.url).await {
            Ok(Value::Array(items)) => items,
            Ok(_) => Vec::new(),
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };

        let merged = merge_lists(source, &existing);
        debug!(url = %asset.url, source = source.len(), target = existing.len(), merged = merged.len(), "merged list");
        Ok(Value::Array(merged))
    }
}

fn target_prefix(target: &str) -> Result<String, ImportError> {
    let prefix = site_prefix(target);
    if prefix.is_empty() || uri::is_addressable(&prefix) {
        return Err(ImportError::InvalidTarget(target.to_string()));
    }
    Ok(prefix)
}

/// Rewrites dispatches onto the target, annotating layout assets
fn plan(dispatches: Vec<Dispatch>, target: &str) -> Vec<Asset> {
    let layouts: HashSet<String> = dispatches
        .iter()
        .filter(|d| d.uri_type() == Some(UriType::Page))
        .filter_map(|d| d.data.get("layout").and_then(Value::as_str))
        .map(|layout| uri::strip_prefix(layout).to_string())
        .collect();

    dispatches
        .into_iter()
        .map(|dispatch| {
            let moved = chunk::from_chunk(target, &dispatch);
            let is_layout = dispatch.uri_type() == Some(UriType::Layout)
                || layouts.contains(uri::strip_prefix(&dispatch.uri));

            if is_layout {
                Asset::layout(moved.uri, moved.data)
            } else {
                Asset::new(moved.uri, moved.data)
            }
        })
        .collect()
}

/// Replaces each layout asset by its components, checked once each
fn split_layouts(assets: Vec<Asset>) -> Vec<Asset> {
    let (layouts, mut others): (Vec<Asset>, Vec<Asset>) =
        assets.into_iter().partition(|asset| asset.is_layout);

    let atoms = dedupe(layouts.iter().flat_map(atomize).collect());
    let atom_urls: HashSet<&str> = atoms.iter().map(|a| a.url.as_str()).collect();

    // a component that is part of a layout is handled as part of the layout
    others.retain(|asset| !atom_urls.contains(asset.url.as_str()));
    let mut assets = atoms;
    assets.extend(others);
    assets
}
