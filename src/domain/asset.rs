//! Import assets and per-item results

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::refs;
use super::uri::UriType;

/// One unit of content to write to a target site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    /// Absolute URI of the asset
    pub url: String,

    pub data: Value,

    /// Came from a page's `layout` (or a layout's subtree)
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_layout: bool,

    /// Whether an existing copy on the target may be replaced
    pub overwrite: bool,

    /// Set when the target already holds this asset and it must not be replaced
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skip: bool,
}

impl Asset {
    pub fn new(url: impl Into<String>, data: Value) -> Self {
        Self {
            url: url.into(),
            data,
            is_layout: false,
            overwrite: true,
            skip: false,
        }
    }

    /// An asset that belongs to a page's layout
    pub fn layout(url: impl Into<String>, data: Value) -> Self {
        Self {
            is_layout: true,
            ..Self::new(url, data)
        }
    }

    pub fn uri_type(&self) -> Option<UriType> {
        UriType::from_uri(&self.url)
    }

    pub fn is_page(&self) -> bool {
        self.uri_type() == Some(UriType::Page)
    }

    pub fn is_list(&self) -> bool {
        self.uri_type() == Some(UriType::List)
    }
}

/// Splits a composed layout into one asset per component, each with only its
/// direct child references
///
/// Every resulting asset is marked `overwrite: false`. Descendants come before
/// the layout itself.
pub fn atomize(asset: &Asset) -> Vec<Asset> {
    let mut data = asset.data.clone();
    if let Value::Object(map) = &mut data {
        map.remove(refs::REF);
    }

    let mut atoms: Vec<Asset> = refs::normalize(&mut data)
        .into_iter()
        .map(|child| Asset {
            overwrite: false,
            ..Asset::layout(child.uri, child.data)
        })
        .collect();

    atoms.push(Asset {
        overwrite: false,
        ..Asset::layout(asset.url.clone(), data)
    });
    atoms
}

/// Keeps the first asset for each URL
pub fn dedupe(assets: Vec<Asset>) -> Vec<Asset> {
    let mut seen = HashSet::new();
    assets
        .into_iter()
        .filter(|asset| seen.insert(asset.url.clone()))
        .collect()
}

/// Merges a source list into a target list
///
/// Source items come first, then target items not already present; deep-equal
/// duplicates are dropped.
pub fn merge_lists(source: &[Value], target: &[Value]) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::with_capacity(source.len() + target.len());
    for item in source.iter().chain(target) {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    merged
}

/// Outcome of a single write (or check) against the content API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Error,
    Skipped,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemStatus::Success => "success",
            ItemStatus::Error => "error",
            ItemStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Structured per-item result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub url: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ItemResult {
    pub fn success(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: ItemStatus::Success,
            message: None,
        }
    }

    pub fn error(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: ItemStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn skipped(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: ItemStatus::Skipped,
            message: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ItemStatus::Error
    }
}

/// Counts of results by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub success: usize,
    pub error: usize,
    pub skipped: usize,
}

impl Summary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ItemResult>) -> Self {
        results.into_iter().fold(Self::default(), |mut summary, result| {
            match result.status {
                ItemStatus::Success => summary.success += 1,
                ItemStatus::Error => summary.error += 1,
                ItemStatus::Skipped => summary.skipped += 1,
            }
            summary
        })
    }

    pub fn total(&self) -> usize {
        self.success + self.error + self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_lists_source_first() {
        let source = vec![json!("a"), json!("b"), json!("c")];
        let target = vec![json!("b"), json!("c"), json!("d")];
        assert_eq!(
            merge_lists(&source, &target),
            vec![json!("a"), json!("b"), json!("c"), json!("d")]
        );
    }

    #[test]
    fn merge_lists_deep_equality() {
        let source = vec![json!({"text": "a", "count": 1})];
        let target = vec![json!({"count": 1, "text": "a"}), json!({"text": "b"})];
        assert_eq!(
            merge_lists(&source, &target),
            vec![json!({"text": "a", "count": 1}), json!({"text": "b"})]
        );
    }

    #[test]
    fn atomize_three_levels() {
        let layout = Asset::layout(
            "t.com/_layouts/main/instances/x",
            json!({
                "_ref": "t.com/_layouts/main/instances/x",
                "top": [{
                    "_ref": "t.com/_components/header/instances/h",
                    "nav": {"_ref": "t.com/_components/nav/instances/n", "links": []}
                }]
            }),
        );

        let atoms = atomize(&layout);
        let urls: Vec<_> = atoms.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "t.com/_components/nav/instances/n",
                "t.com/_components/header/instances/h",
                "t.com/_layouts/main/instances/x",
            ]
        );
        assert!(atoms.iter().all(|a| !a.overwrite && a.is_layout));
        assert_eq!(
            atoms[1].data,
            json!({"nav": {"_ref": "t.com/_components/nav/instances/n"}})
        );
        assert_eq!(
            atoms[2].data,
            json!({"top": [{"_ref": "t.com/_components/header/instances/h"}]})
        );
    }

    #[test]
    fn dedupe_keeps_first() {
        let assets = vec![
            Asset::new("a", json!(1)),
            Asset::new("b", json!(2)),
            Asset::new("a", json!(3)),
        ];
        let deduped = dedupe(assets);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].data, json!(1));
    }

    #[test]
    fn summary_counts() {
        let results = vec![
            ItemResult::success("a"),
            ItemResult::skipped("b"),
            ItemResult::error("c", "boom"),
            ItemResult::success("d"),
        ];
        let summary = Summary::from_results(&results);
        assert_eq!(summary, Summary { success: 2, error: 1, skipped: 1 });
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn result_serialization() {
        let json = serde_json::to_value(ItemResult::skipped("x")).unwrap();
        assert_eq!(json, json!({"url": "x", "status": "skipped"}));
    }
}
