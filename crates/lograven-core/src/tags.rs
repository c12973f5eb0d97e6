//! Typed key/value bags for event tags and user context
//!
//! SDKs send `tags` and `userContext` as JSON objects. Only flat values are
//! accepted: strings, numbers, booleans and arrays of strings. Anything else
//! fails deserialization, which the ingestion pipeline reports as an invalid
//! payload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<String>),
}

pub type TagMap = BTreeMap<String, TagValue>;

impl TagValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(b) => write!(f, "{}", b),
            TagValue::Number(n) => write!(f, "{}", n),
            TagValue::String(s) => f.write_str(s),
            TagValue::List(items) => f.write_str(&items.join(",")),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::String(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::String(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Number(value.into())
    }
}
