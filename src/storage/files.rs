//! Dispatch and bootstrap files
//!
//! | Format | Shape |
//! |--------|-------|
//! | Dispatch | newline-delimited JSON, one `{uri: data}` per line |
//! | Bootstrap | YAML (or JSON), possibly several `---` documents |

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::domain::bootstrap::Bootstrap;
use crate::domain::chunk::Dispatch;
use crate::domain::uri;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Dispatch,
    Bootstrap,
}

impl InputFormat {
    /// Dispatch streams start with a single-key object keyed by a content URI
    pub fn detect(text: &str) -> Self {
        let first = text.lines().map(str::trim).find(|line| !line.is_empty());
        let is_dispatch = first
            .and_then(|line| serde_json::from_str::<Value>(line).ok())
            .and_then(|value| {
                let map = value.as_object()?;
                (map.len() == 1).then(|| map.keys().all(|key| uri::is_addressable(key)))
            })
            .unwrap_or(false);

        if is_dispatch {
            InputFormat::Dispatch
        } else {
            InputFormat::Bootstrap
        }
    }
}

/// Parsed input content
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Dispatches(Vec<Dispatch>),
    Bootstrap(Bootstrap),
}

/// Parses input, detecting the format unless one is given
pub fn parse(text: &str, format: Option<InputFormat>) -> Result<Content> {
    match format.unwrap_or_else(|| InputFormat::detect(text)) {
        InputFormat::Dispatch => parse_dispatches(text).map(Content::Dispatches),
        InputFormat::Bootstrap => parse_bootstrap(text).map(Content::Bootstrap),
    }
}

/// Reads a file, or stdin when no path is given
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read input: {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

/// Parses a newline-delimited dispatch stream
pub fn parse_dispatches(text: &str) -> Result<Vec<Dispatch>> {
    let mut dispatches = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse dispatch at line {}", line_num + 1))?;
        let dispatch = Dispatch::from_value(value)
            .with_context(|| format!("Invalid dispatch at line {}", line_num + 1))?;

        dispatches.push(dispatch);
    }

    Ok(dispatches)
}

/// Parses one or more bootstrap documents, merging them
pub fn parse_bootstrap(text: &str) -> Result<Bootstrap> {
    let mut documents = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("Failed to parse bootstrap document {}", index + 1))?;
        if value.is_null() {
            continue;
        }

        let bootstrap: Bootstrap = serde_yaml::from_value(value)
            .with_context(|| format!("Invalid bootstrap document {}", index + 1))?;
        documents.push(bootstrap);
    }

    match documents.len() {
        0 => Ok(Bootstrap::default()),
        1 => Ok(documents.remove(0)),
        _ => Bootstrap::from_documents(&documents).context("Failed to merge bootstrap documents"),
    }
}

pub fn write_dispatches(mut writer: impl Write, dispatches: &[Dispatch]) -> Result<()> {
    for dispatch in dispatches {
        let line = serde_json::to_string(dispatch).context("Failed to serialize dispatch")?;
        writeln!(writer, "{}", line).context("Failed to write dispatch")?;
    }
    writer.flush().context("Failed to flush output")
}

pub fn write_bootstrap(mut writer: impl Write, bootstrap: &Bootstrap) -> Result<()> {
    serde_yaml::to_writer(&mut writer, bootstrap).context("Failed to serialize bootstrap")?;
    writer.flush().context("Failed to flush output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_formats() {
        assert_eq!(
            InputFormat::detect("\n{\"/_components/foo\": {}}\n"),
            InputFormat::Dispatch
        );
        assert_eq!(
            InputFormat::detect("{\"d.com/_pages/a\": {}}"),
            InputFormat::Dispatch
        );
        assert_eq!(
            InputFormat::detect("{\"_components\": {}}"),
            InputFormat::Bootstrap
        );
        assert_eq!(InputFormat::detect("_pages:\n  a: {}\n"), InputFormat::Bootstrap);
    }

    #[test]
    fn dispatch_errors_name_the_line() {
        let err = parse_dispatches("{\"/_lists/a\": []}\n\n{\"/_lists/b\": [], \"/_lists/c\": []}\n")
            .unwrap_err();
        assert!(format!("{:#}", err).contains("line 3"));

        let err = parse_dispatches("not json").unwrap_err();
        assert!(format!("{:#}", err).contains("line 1"));
    }

    #[test]
    fn dispatches_round_trip_through_ndjson() {
        let dispatches = vec![
            Dispatch::new("/_components/foo", json!({"a": 1})),
            Dispatch::new("/_uris/abc", json!("/_pages/index")),
        ];

        let mut out = Vec::new();
        write_dispatches(&mut out, &dispatches).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text.lines().count(), 2);
        assert_eq!(parse_dispatches(&text).unwrap(), dispatches);
    }

    #[test]
    fn multi_document_bootstraps_merge() {
        let text = r#"
_components:
  article:
    instances:
      a: { title: One }
---
_lists:
  tags: [x, y]
"#;

        let bootstrap = parse_bootstrap(text).unwrap();
        assert_eq!(
            bootstrap.components["article"],
            json!({"instances": {"a": {"title": "One"}}})
        );
        assert_eq!(bootstrap.lists["tags"], json!(["x", "y"]));
    }

    #[test]
    fn bootstrap_writes_yaml() {
        let bootstrap: Bootstrap =
            serde_json::from_value(json!({"_lists": {"tags": ["a"]}})).unwrap();
        let mut out = Vec::new();
        write_bootstrap(&mut out, &bootstrap).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("_lists:"));
        assert_eq!(parse_bootstrap(&text).unwrap(), bootstrap);
    }
}
