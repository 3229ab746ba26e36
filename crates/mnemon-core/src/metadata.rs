//! Typed metadata attached to a memory.
//!
//! A small set of reserved keys have fixed types and are validated; everything
//! else lives in an open extension map of JSON values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Keys with a fixed meaning and type.
pub const RESERVED_KEYS: [&str; 4] = ["source", "tags", "session_id", "pinned"];

const MAX_KEY_LEN: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Where the memory came from (tool, agent, import, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Pinned memories are never reported as pruning-eligible
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pinned: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Metadata {
    /// Build metadata from an arbitrary JSON value, validating reserved keys.
    ///
    /// `null` yields empty metadata; anything other than an object is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(Error::validation(format!(
                    "metadata must be an object, got {}",
                    json_type(&other)
                )));
            }
        };
        Self::from_map(map)
    }

    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        let mut metadata = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "source" => metadata.source = Some(expect_string(&key, value)?),
                "session_id" => metadata.session_id = Some(expect_string(&key, value)?),
                "pinned" => match value {
                    Value::Bool(b) => metadata.pinned = b,
                    other => return Err(wrong_type(&key, "a boolean", &other)),
                },
                "tags" => match value {
                    Value::Array(items) => {
                        metadata.tags = items
                            .into_iter()
                            .map(|item| expect_string("tags[]", item))
                            .collect::<Result<Vec<_>>>()?;
                    }
                    other => return Err(wrong_type(&key, "an array of strings", &other)),
                },
                _ => {
                    validate_key(&key)?;
                    metadata.extra.insert(key, value);
                }
            }
        }
        Ok(metadata)
    }

    /// Check extension keys of programmatically built metadata.
    pub fn validate(&self) -> Result<()> {
        for key in self.extra.keys() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(Error::validation(format!(
                    "metadata key '{}' is reserved and must use its typed field",
                    key
                )));
            }
            validate_key(key)?;
        }
        Ok(())
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Extension keys and exact-search field names share one grammar.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(Error::validation(format!(
            "metadata key must be 1-{} characters",
            MAX_KEY_LEN
        )));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(Error::validation(format!(
            "metadata key '{}' contains invalid characters",
            key
        )));
    }
    Ok(())
}

fn expect_string(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(wrong_type(key, "a string", &other)),
    }
}

fn wrong_type(key: &str, expected: &str, got: &Value) -> Error {
    Error::validation(format!(
        "metadata key '{}' must be {}, got {}",
        key,
        expected,
        json_type(got)
    ))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
