use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::identity::LogId;
use crate::revision::Revision;

/// Reserved body field carrying the hex identity of the originating log.
pub const LOG_KEY_FIELD: &str = "_key";

/// Reserved body field carrying the sequence number within the originating log.
pub const LOG_SEQ_FIELD: &str = "_seq";

/// Key of a document in the store.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocKey(String);

impl DocKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocKey({})", self.0)
    }
}

impl From<&str> for DocKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<DerivedKey> for DocKey {
    fn from(key: DerivedKey) -> Self {
        Self(key.to_string())
    }
}

/// Document key derived from a log entry's position: `"<log-hex>@<seq>"`.
///
/// The mapping is a bijection: [`DerivedKey::parse`] accepts exactly the
/// strings that `Display` produces, so two entries collide only if they share
/// both log and sequence number.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DerivedKey {
    pub log: LogId,
    pub seq: u64,
}

impl DerivedKey {
    pub fn new(log: LogId, seq: u64) -> Self {
        Self { log, seq }
    }

    /// Parse the canonical `"<lowercase-hex>@<decimal>"` form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidDerivedKey(s.to_string());
        let (hex_part, seq_part) = s.rsplit_once('@').ok_or_else(invalid)?;
        let log = LogId::from_hex(hex_part).map_err(|_| invalid())?;
        let seq: u64 = seq_part.parse().map_err(|_| invalid())?;
        // Reject "+1", "007" and friends so the textual form stays unique.
        if seq.to_string() != seq_part {
            return Err(invalid());
        }
        Ok(Self { log, seq })
    }
}

impl fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.log.to_hex(), self.seq)
    }
}

impl FromStr for DerivedKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A keyed, revisioned JSON document.
///
/// Serializes as a flat JSON object: the key under `_id`, the revision (when
/// known) under `_rev`, and the body fields alongside them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub key: DocKey,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<Revision>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Document {
    /// New document without a revision.
    pub fn new(key: impl Into<DocKey>, body: Map<String, Value>) -> Self {
        Self {
            key: key.into(),
            rev: None,
            body,
        }
    }

    /// Build a document from a JSON object value; non-objects are rejected.
    pub fn from_value(key: impl Into<DocKey>, value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Object(body) => Ok(Self::new(key, body)),
            other => Err(TypeError::InvalidDocument(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn with_rev(mut self, rev: Revision) -> Self {
        self.rev = Some(rev);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Serialize to the flat JSON wire form.
    pub fn to_json(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Parse the flat JSON wire form.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(bytes).map_err(|e| TypeError::InvalidDocument(e.to_string()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
