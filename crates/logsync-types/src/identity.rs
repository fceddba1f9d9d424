use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Stable, unique identity of a log.
///
/// Logs are addressed by an opaque binary key (typically a public key or a
/// hash of one). The key is rendered as lowercase hex wherever it becomes
/// visible to the document store, so the hex form is part of the wire format
/// and must round-trip exactly.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogId {
    key: Vec<u8>,
}

impl LogId {
    /// Wrap raw key bytes. Empty keys are rejected.
    pub fn from_bytes(key: impl Into<Vec<u8>>) -> Result<Self, TypeError> {
        let key = key.into();
        if key.is_empty() {
            return Err(TypeError::EmptyLogId);
        }
        Ok(Self { key })
    }

    /// Derive a 32-byte identity from a human label.
    ///
    /// The same label always produces the same identity.
    pub fn derive(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"logsync-log-v1:");
        hasher.update(label.as_bytes());
        Self {
            key: hasher.finalize().as_bytes().to_vec(),
        }
    }

    /// Create a random 32-byte identity for tests and demos.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self {
            key: bytes.to_vec(),
        }
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Full lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.key)
    }

    /// Short identifier (first 4 bytes) for log lines.
    pub fn short_id(&self) -> String {
        let end = self.key.len().min(4);
        format!("log:{}", hex::encode(&self.key[..end]))
    }

    /// Parse a lowercase hex string.
    ///
    /// Uppercase digits are rejected so that every identity has exactly one
    /// textual form.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(TypeError::InvalidHex(format!("{s}: not lowercase")));
        }
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Debug for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogId({})", self.short_id())
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_id())
    }
}

impl TryFrom<String> for LogId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<LogId> for String {
    fn from(id: LogId) -> Self {
        id.to_hex()
    }
}
