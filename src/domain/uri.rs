//! Content URIs and site prefixes
//!
//! A URI comes in two forms:
//! - Relative (`/_components/foo/instances/bar`) - site-agnostic, used in chunks
//! - Absolute (`domain.com/_components/foo/instances/bar`) - carries the site prefix
//!
//! Conversion pivots on the first recognized type segment. Strings without
//! one pass through untouched, so arbitrary text inside content data is never
//! mistaken for an address.

use std::fmt;
use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde_json::Value;

/// Matches `/components`, `/_components`, `/pages`, ... followed by `/`, `.`, `@` or the end
static TYPE_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/_?(components|layouts|pages|uris|lists|users)(?:[/.@]|$)")
        .expect("type segment pattern is valid")
});

/// Extensions the content API understands as render/format selectors
const EXTENSIONS: &[&str] = &[".json", ".html", ".yaml", ".yml"];

/// Type of content a URI addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UriType {
    Component,
    Layout,
    Page,
    Uri,
    List,
    User,
}

impl UriType {
    /// All recognized types
    pub const ALL: [UriType; 6] = [
        UriType::Component,
        UriType::Layout,
        UriType::Page,
        UriType::Uri,
        UriType::List,
        UriType::User,
    ];

    /// Plural segment name without the leading underscore
    pub fn as_str(&self) -> &'static str {
        match self {
            UriType::Component => "components",
            UriType::Layout => "layouts",
            UriType::Page => "pages",
            UriType::Uri => "uris",
            UriType::List => "lists",
            UriType::User => "users",
        }
    }

    /// Segment used in generated URIs, e.g. `/_components`
    pub fn segment(&self) -> String {
        format!("/_{}", self.as_str())
    }

    /// Top-level key in a bootstrap document, e.g. `_components`
    pub fn bootstrap_key(&self) -> String {
        format!("_{}", self.as_str())
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Parses a bootstrap/object key (`_components` or `components`)
    pub fn from_key(key: &str) -> Option<Self> {
        Self::from_name(key.strip_prefix('_').unwrap_or(key))
    }

    /// Detects the type of a relative or absolute URI
    pub fn from_uri(uri: &str) -> Option<Self> {
        find_type(uri).map(|(_, t)| t)
    }

    /// Components and layouts are the only types reachable through `_ref`
    pub fn is_component_like(&self) -> bool {
        matches!(self, UriType::Component | UriType::Layout)
    }
}

impl fmt::Display for UriType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finds the first recognized type segment, returning its byte offset and type
pub fn find_type(uri: &str) -> Option<(usize, UriType)> {
    let caps = TYPE_SEGMENT.captures(uri)?;
    let start = caps.get(0)?.start();
    let kind = UriType::from_name(caps.get(1)?.as_str())?;
    Some((start, kind))
}

/// Returns true if the string contains a recognized type segment
pub fn is_addressable(uri: &str) -> bool {
    find_type(uri).is_some()
}

/// Removes the site prefix, returning the relative URI
///
/// Strings without a recognized segment are returned unchanged.
pub fn strip_prefix(uri: &str) -> &str {
    match find_type(uri) {
        Some((start, _)) => &uri[start..],
        None => uri,
    }
}

/// Applies `prefix` to a relative or absolute URI, replacing any existing prefix
///
/// Strings without a recognized segment are returned unchanged.
pub fn add_prefix(prefix: &str, uri: &str) -> String {
    match find_type(uri) {
        Some((start, _)) => format!("{}{}", prefix.trim_end_matches('/'), &uri[start..]),
        None => uri.to_string(),
    }
}

/// Returns the site prefix of an absolute URI (everything before the type segment)
pub fn get_prefix(uri: &str) -> Option<&str> {
    find_type(uri).map(|(start, _)| &uri[..start])
}

/// Returns true if the whole string is a content URI
///
/// Either relative (starts at the type segment) or a bare `host[/path]`
/// prefix followed by one. Text that merely mentions a path, such as an HTML
/// link or a sentence, is not a URI.
pub fn is_uri(s: &str) -> bool {
    let Some(prefix) = get_prefix(s) else {
        return false;
    };

    let plain = !s
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>'));
    plain && !prefix.contains("://") && !prefix.contains(['?', '#', '='])
}

/// Deep-applies a URI transform to every reference in `data`
///
/// Covers `_ref` values at any depth, top-level string values (a page's
/// `layout`), and strings inside top-level arrays (page areas). Top-level
/// strings are only rewritten when they are URIs as a whole; nested strings
/// that are not `_ref` values are left alone.
pub fn toggle_reference_prefixes<F>(data: &Value, f: &F) -> Value
where
    F: Fn(&str) -> String,
{
    match data {
        Value::String(s) => toggle_string(s, f),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), toggle_top_level(value, f)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| toggle_top_level(v, f)).collect()),
        other => other.clone(),
    }
}

fn toggle_top_level<F>(value: &Value, f: &F) -> Value
where
    F: Fn(&str) -> String,
{
    match value {
        Value::String(s) => toggle_string(s, f),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => toggle_string(s, f),
                    other => toggle_nested(other, f),
                })
                .collect(),
        ),
        other => toggle_nested(other, f),
    }
}

fn toggle_string<F>(s: &str, f: &F) -> Value
where
    F: Fn(&str) -> String,
{
    if is_uri(s) {
        Value::String(f(s))
    } else {
        Value::String(s.to_string())
    }
}

fn toggle_nested<F>(value: &Value, f: &F) -> Value
where
    F: Fn(&str) -> String,
{
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = match (key.as_str(), value) {
                        ("_ref", Value::String(s)) => Value::String(f(s)),
                        _ => toggle_nested(value, f),
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| toggle_nested(v, f)).collect()),
        other => other.clone(),
    }
}

/// Rewrites every reference in `data` to carry `prefix`
pub fn add_reference_prefixes(prefix: &str, data: &Value) -> Value {
    toggle_reference_prefixes(data, &|s: &str| add_prefix(prefix, s))
}

/// Strips the site prefix from every reference in `data`
pub fn strip_reference_prefixes(data: &Value) -> Value {
    toggle_reference_prefixes(data, &|s: &str| strip_prefix(s).to_string())
}

/// Removes a trailing render extension (`.json`, `.html`, ...)
pub fn strip_extension(uri: &str) -> &str {
    EXTENSIONS
        .iter()
        .find_map(|ext| uri.strip_suffix(ext))
        .unwrap_or(uri)
}

/// Splits off the `@version` suffix of a relative URI's last segment
fn split_version(uri: &str) -> (&str, Option<&str>) {
    let rel = strip_prefix(uri);
    let last_segment = rel.rfind('/').map(|i| i + 1).unwrap_or(0);
    match rel[last_segment..].find('@') {
        Some(at) => {
            let at = last_segment + at;
            (&rel[..at], Some(&rel[at + 1..]))
        }
        None => (rel, None),
    }
}

/// Returns the version of a URI (`published` for `.../foo@published`)
pub fn version(uri: &str) -> Option<&str> {
    split_version(uri).1
}

/// Returns true for `@published` URIs
pub fn is_published(uri: &str) -> bool {
    version(uri) == Some("published")
}

/// Returns the URI without its `@version` suffix
pub fn without_version(uri: &str) -> String {
    match find_type(uri) {
        Some((start, _)) => format!("{}{}", &uri[..start], split_version(uri).0),
        None => uri.to_string(),
    }
}

/// Returns the component (or layout) name of a URI
pub fn component_name(uri: &str) -> Option<&str> {
    let rel = strip_prefix(uri);
    let (_, kind) = find_type(rel)?;
    if !kind.is_component_like() {
        return None;
    }

    let rest = rel[1..].split_once('/')?.1;
    let end = rest.find(['/', '@', '.']).unwrap_or(rest.len());
    let name = &rest[..end];
    (!name.is_empty()).then_some(name)
}

/// Returns the instance id of a component instance URI, including any `@version`
pub fn instance_id(uri: &str) -> Option<&str> {
    let rel = strip_prefix(uri);
    let (_, kind) = find_type(rel)?;
    if !kind.is_component_like() {
        return None;
    }

    let (_, id) = rel.split_once("/instances/")?;
    let id = strip_extension(id);
    (!id.is_empty()).then_some(id)
}

/// Returns true if the URI addresses a component/layout instance (not default data)
pub fn is_instance(uri: &str) -> bool {
    instance_id(uri).is_some()
}

/// Returns the final path segment after the type segment (`/_pages/{id}` -> `id`)
pub fn entry_name(uri: &str) -> Option<&str> {
    let rel = strip_prefix(uri);
    find_type(rel)?;
    let rest = rel[1..].split_once('/')?.1;
    (!rest.is_empty()).then_some(rest)
}

/// Converts a protocol-less URI to a fetchable URL
pub fn uri_to_url(uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        uri.to_string()
    } else {
        format!("http://{}", uri)
    }
}

/// Converts a URL to a protocol-less URI
pub fn url_to_uri(url: &str) -> &str {
    url.strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url)
}

/// Base64 key used for `/_users/{key}`
pub fn encode_user(username: &str, provider: &str) -> String {
    STANDARD.encode(format!("{}@{}", username.to_lowercase(), provider))
}

/// Base64 key used for `/_uris/{key}` (hostname + path)
pub fn encode_uri_key(host_and_path: &str) -> String {
    STANDARD.encode(host_and_path)
}

/// Builds the relative user URI for a user record, if it has a username and provider
pub fn user_uri(user: &Value) -> Option<String> {
    let username = user.get("username")?.as_str()?;
    let provider = user.get("provider")?.as_str()?;
    Some(format!(
        "{}/{}",
        UriType::User.segment(),
        encode_user(username, provider)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn strip_prefix_from_absolute() {
        assert_eq!(
            strip_prefix("domain.com/_components/foo/instances/bar"),
            "/_components/foo/instances/bar"
        );
        assert_eq!(
            strip_prefix("http://site.com/blog/components/foo"),
            "/components/foo"
        );
        assert_eq!(strip_prefix("site.com/_lists"), "/_lists");
    }

    #[test]
    fn strip_prefix_leaves_plain_text() {
        let html = "<p>Visit <a href=\"http://foo.com/bar/baz\">here</a></p>";
        assert_eq!(strip_prefix(html), html);
        assert_eq!(strip_prefix("/componentsfoo"), "/componentsfoo");
    }

    #[test]
    fn add_prefix_replaces_existing() {
        assert_eq!(
            add_prefix("http://new.com", "http://old.com/_pages/index"),
            "http://new.com/_pages/index"
        );
        assert_eq!(add_prefix("new.com/", "/_uris/abc"), "new.com/_uris/abc");
        assert_eq!(add_prefix("new.com", "just text"), "just text");
    }

    #[test]
    fn detects_types() {
        assert_eq!(UriType::from_uri("/_layouts/l/instances/x"), Some(UriType::Layout));
        assert_eq!(UriType::from_uri("a.com/pages/x"), Some(UriType::Page));
        assert_eq!(UriType::from_uri("a.com/_users"), Some(UriType::User));
        assert_eq!(UriType::from_uri("a.com/other"), None);
        assert_eq!(get_prefix("a.com/site/_pages/x"), Some("a.com/site"));
    }

    #[test]
    fn component_parts() {
        let uri = "d.com/_components/article/instances/abc@published";
        assert_eq!(component_name(uri), Some("article"));
        assert_eq!(instance_id(uri), Some("abc@published"));
        assert_eq!(version(uri), Some("published"));
        assert!(is_published(uri));
        assert_eq!(without_version(uri), "d.com/_components/article/instances/abc");

        assert_eq!(component_name("/_components/foo"), Some("foo"));
        assert_eq!(component_name("/_components/foo.json"), Some("foo"));
        assert!(!is_instance("/_components/foo"));
        assert_eq!(component_name("/_pages/foo"), None);
        assert_eq!(entry_name("/_pages/foo@published"), Some("foo@published"));
    }

    #[test]
    fn toggles_refs_and_top_level_strings() {
        let data = json!({
            "layout": "old.com/_layouts/main/instances/x",
            "main": ["old.com/_components/a/instances/1"],
            "content": [{"_ref": "old.com/_components/b/instances/2", "title": "old.com/_pages/not-a-ref"}],
            "text": "<a href=\"/foo/bar\">link</a>",
            "count": 3
        });

        let rewritten = add_reference_prefixes("new.com", &data);
        assert_eq!(rewritten["layout"], "new.com/_layouts/main/instances/x");
        assert_eq!(rewritten["main"][0], "new.com/_components/a/instances/1");
        assert_eq!(rewritten["content"][0]["_ref"], "new.com/_components/b/instances/2");
        // nested plain strings are not references
        assert_eq!(rewritten["content"][0]["title"], "old.com/_pages/not-a-ref");
        assert_eq!(rewritten["text"], "<a href=\"/foo/bar\">link</a>");
        assert_eq!(rewritten["count"], 3);
    }

    #[test]
    fn is_uri_requires_the_whole_string() {
        assert!(is_uri("/_pages/index"));
        assert!(is_uri("site.com/blog/_components/a/instances/1@published"));
        assert!(is_uri("localhost:3001/_layouts/main"));

        assert!(!is_uri("<a href=\"https://site.com/pages/about\">about</a>"));
        assert!(!is_uri("read /lists/best first"));
        assert!(!is_uri("https://site.com/pages/about"));
        assert!(!is_uri("site.com/search?q=/pages/about"));
        assert!(!is_uri("/foo/bar"));
    }

    #[test]
    fn top_level_prose_keeps_its_paths() {
        let data = json!({
            "text": "See /pages/about for more",
            "tags": ["read /lists/best first", "old.com/_lists/best"]
        });

        let rewritten = add_reference_prefixes("new.com", &data);
        assert_eq!(rewritten["text"], "See /pages/about for more");
        assert_eq!(rewritten["tags"], json!(["read /lists/best first", "new.com/_lists/best"]));
    }

    #[test]
    fn toggles_bare_string_data() {
        let uri_data = json!("old.com/_pages/index");
        assert_eq!(strip_reference_prefixes(&uri_data), json!("/_pages/index"));
    }

    #[test]
    fn user_keys_are_lowercased() {
        assert_eq!(encode_user("Alice", "google"), STANDARD.encode("alice@google"));
        let user = json!({"username": "Alice", "provider": "google", "auth": "admin"});
        assert_eq!(
            user_uri(&user),
            Some(format!("/_users/{}", STANDARD.encode("alice@google")))
        );
        assert_eq!(user_uri(&json!({"username": "x"})), None);
    }

    #[test]
    fn url_conversion() {
        assert_eq!(uri_to_url("d.com/_pages/a"), "http://d.com/_pages/a");
        assert_eq!(uri_to_url("https://d.com/_pages/a"), "https://d.com/_pages/a");
        assert_eq!(url_to_uri("https://d.com/_pages/a"), "d.com/_pages/a");
        assert_eq!(strip_extension("/_pages/a.html"), "/_pages/a");
    }

    proptest! {
        #[test]
        fn prefix_round_trip(
            host in "[a-z]{1,12}\\.(com|org|net)",
            path in "(/[0-9]{1,8}){0,2}",
            kind in prop::sample::select(vec!["_components", "_layouts", "_pages", "_uris", "_lists", "_users"]),
            name in "[a-z0-9-]{1,16}",
        ) {
            let prefix = format!("{}{}", host, path);
            let uri = format!("/{}/{}", kind, name);
            let absolute = add_prefix(&prefix, &uri);
            prop_assert!(is_uri(&absolute));
            prop_assert_eq!(strip_prefix(&absolute), uri.as_str());
        }
    }
}
