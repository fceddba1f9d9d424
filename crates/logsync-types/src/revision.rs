use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;

/// Number of digest bytes kept in a revision token.
const DIGEST_BYTES: usize = 16;

/// Store-assigned revision token, rendered as `"<generation>-<digest>"`.
///
/// The generation counts edits along one history (starting at 1); the
/// digest is lowercase hex. Revisions order by generation first and digest
/// second, which gives every document a deterministic winning revision.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision {
    generation: u64,
    digest: String,
}

impl Revision {
    /// Compute the revision that follows `parent` for the given body.
    ///
    /// Fails if `parent` is already at the last representable generation.
    pub fn next(parent: Option<&Revision>, body: &Map<String, Value>) -> Result<Self, TypeError> {
        let generation = match parent {
            Some(p) => p.generation.checked_add(1).ok_or_else(|| {
                TypeError::InvalidRevision(format!("{p} has no successor generation"))
            })?,
            None => 1,
        };
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"logsync-rev-v1:");
        if let Some(parent) = parent {
            hasher.update(parent.to_string().as_bytes());
        }
        hasher.update(b":");
        // serde_json maps are key-sorted, so this encoding is canonical.
        hasher.update(Value::Object(body.clone()).to_string().as_bytes());
        let hash = hasher.finalize();
        Ok(Self {
            generation,
            digest: hex::encode(&hash.as_bytes()[..DIGEST_BYTES]),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl FromStr for Revision {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (generation, digest) = s
            .split_once('-')
            .ok_or_else(|| TypeError::InvalidRevision(s.to_string()))?;
        let generation: u64 = generation
            .parse()
            .map_err(|_| TypeError::InvalidRevision(s.to_string()))?;
        let valid_digest = !digest.is_empty()
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if generation == 0 || !valid_digest {
            return Err(TypeError::InvalidRevision(s.to_string()));
        }
        Ok(Self {
            generation,
            digest: digest.to_string(),
        })
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.digest)
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({self})")
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.generation
            .cmp(&other.generation)
            .then_with(|| self.digest.cmp(&other.digest))
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<String> for Revision {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Revision> for String {
    fn from(rev: Revision) -> Self {
        rev.to_string()
    }
}
