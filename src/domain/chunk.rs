//! Chunks and dispatches
//!
//! Both are single-entry maps of `{uri: data}`:
//! - A chunk's key is relative (`/_components/foo`) and its references carry no prefix
//! - A dispatch's key is absolute (`domain.com/_components/foo`)
//!
//! The same [`Dispatch`] type holds either form; [`to_chunk`] and
//! [`from_chunk`] move between them.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::uri::{self, UriType};

#[derive(Debug, Error, PartialEq)]
pub enum ChunkError {
    #[error("Chunk must be an object, got {0}")]
    NotAnObject(String),

    #[error("Chunk must have exactly one key, found {0}")]
    KeyCount(usize),

    #[error("Chunk key must begin with '/': {0}")]
    NotRelative(String),

    #[error("Chunk key is not a recognized content type: {0}")]
    UnknownType(String),

    #[error("Invalid bootstrap: {0}")]
    InvalidBootstrap(String),
}

/// A single `{uri: data}` entry
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub uri: String,
    pub data: Value,
}

impl Dispatch {
    pub fn new(uri: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            uri: uri.into(),
            data: data.into(),
        }
    }

    /// Returns the content type of this entry's URI
    pub fn uri_type(&self) -> Option<UriType> {
        UriType::from_uri(&self.uri)
    }

    /// Returns true if the key is relative (chunk form)
    pub fn is_relative(&self) -> bool {
        self.uri.starts_with('/')
    }

    /// Converts to the `{uri: data}` JSON shape
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.uri.clone(), self.data.clone());
        Value::Object(map)
    }

    /// Parses the `{uri: data}` JSON shape
    pub fn from_value(value: Value) -> Result<Self, ChunkError> {
        let map = match value {
            Value::Object(map) => map,
            other => return Err(ChunkError::NotAnObject(type_name(&other).to_string())),
        };

        if map.len() != 1 {
            return Err(ChunkError::KeyCount(map.len()));
        }

        let (uri, data) = map
            .into_iter()
            .next()
            .ok_or(ChunkError::KeyCount(0))?;
        Ok(Self { uri, data })
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl Serialize for Dispatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.uri, &self.data)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Dispatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Dispatch::from_value(value).map_err(de::Error::custom)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Builds a chunk, stripping the prefix from `uri` and from every reference in `data`
pub fn to_chunk(uri: &str, data: &Value) -> Dispatch {
    Dispatch::new(
        uri::strip_prefix(uri),
        uri::strip_reference_prefixes(data),
    )
}

/// Builds a dispatch from a chunk by applying `prefix` to its key and references
pub fn from_chunk(prefix: &str, chunk: &Dispatch) -> Dispatch {
    Dispatch::new(
        uri::add_prefix(prefix, &chunk.uri),
        uri::add_reference_prefixes(prefix, &chunk.data),
    )
}

/// Checks that a relative key begins with `/` and a recognized type segment
pub fn validate_key(key: &str) -> Result<UriType, ChunkError> {
    if !key.starts_with('/') {
        return Err(ChunkError::NotRelative(key.to_string()));
    }

    match uri::find_type(key) {
        Some((0, kind)) => Ok(kind),
        _ => Err(ChunkError::UnknownType(key.to_string())),
    }
}

/// Validates an arbitrary JSON value as a chunk
pub fn validate(chunk: &Value) -> Result<Dispatch, ChunkError> {
    let dispatch = Dispatch::from_value(chunk.clone())?;
    validate_key(&dispatch.uri)?;
    Ok(dispatch)
}

/// Flattens a bootstrap-shaped object into chunks
///
/// - `components`/`layouts`: default data (if non-empty) then one chunk per instance
/// - `users`: an array of user records, keyed by base64 of `username@provider`
/// - anything else: one chunk per child key
pub fn parse_object(obj: &Value) -> Result<Vec<Dispatch>, ChunkError> {
    let map = obj
        .as_object()
        .ok_or_else(|| ChunkError::InvalidBootstrap("expected an object".to_string()))?;

    let mut chunks = Vec::new();

    for (key, value) in map {
        let kind = UriType::from_key(key);

        match kind {
            Some(kind) if kind.is_component_like() => {
                let components = value.as_object().ok_or_else(|| {
                    ChunkError::InvalidBootstrap(format!("'{}' must be an object", key))
                })?;

                for (name, component) in components {
                    chunks.extend(component_chunks(key, name, component)?);
                }
            }
            Some(UriType::User) => {
                let users = value.as_array().ok_or_else(|| {
                    ChunkError::InvalidBootstrap(format!("'{}' must be an array", key))
                })?;

                for user in users {
                    let username = user.get("username").and_then(Value::as_str);
                    let provider = user.get("provider").and_then(Value::as_str);
                    match (username, provider) {
                        (Some(username), Some(provider)) => chunks.push(Dispatch::new(
                            format!("/{}/{}", key, uri::encode_user(username, provider)),
                            user.clone(),
                        )),
                        _ => {
                            return Err(ChunkError::InvalidBootstrap(
                                "users need a username and provider".to_string(),
                            ))
                        }
                    }
                }
            }
            _ => {
                let entries = value.as_object().ok_or_else(|| {
                    ChunkError::InvalidBootstrap(format!("'{}' must be an object", key))
                })?;

                for (child, data) in entries {
                    chunks.push(Dispatch::new(
                        format!("/{}/{}", key, child.trim_start_matches('/')),
                        data.clone(),
                    ));
                }
            }
        }
    }

    Ok(chunks)
}

/// Splits one `{...defaults, instances: {...}}` entry into chunks
pub(crate) fn component_chunks(
    key: &str,
    name: &str,
    component: &Value,
) -> Result<Vec<Dispatch>, ChunkError> {
    let mut defaults = component
        .as_object()
        .cloned()
        .ok_or_else(|| ChunkError::InvalidBootstrap(format!("component '{}' must be an object", name)))?;
    let instances = defaults.remove("instances");

    let mut chunks = Vec::new();
    let base = format!("/{}/{}", key, name);

    if !defaults.is_empty() {
        chunks.push(Dispatch::new(base.clone(), Value::Object(defaults)));
    }

    match instances {
        Some(Value::Object(instances)) => {
            for (id, data) in instances {
                chunks.push(Dispatch::new(format!("{}/instances/{}", base, id), data));
            }
        }
        Some(Value::Null) | None => {}
        Some(_) => {
            return Err(ChunkError::InvalidBootstrap(format!(
                "instances of '{}' must be an object",
                name
            )))
        }
    }

    Ok(chunks)
}
