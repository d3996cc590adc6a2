//! Cache entries, partitions and stored values

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Named sub-store of the persistent tier. Each content class owns exactly
/// one partition; keys are unique within a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Partition {
    ApiResponses,
    Images,
    Components,
    /// Requests queued for later replay by the fetch wrapper
    BackgroundRequests,
}

impl Partition {
    pub const ALL: [Self; 4] =
        [Self::ApiResponses, Self::Images, Self::Components, Self::BackgroundRequests];

    /// Partitions holding cached content (excludes the request queue).
    pub const CONTENT: [Self; 3] = [Self::ApiResponses, Self::Images, Self::Components];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiResponses => "apiResponses",
            Self::Images => "images",
            Self::Components => "components",
            Self::BackgroundRequests => "backgroundRequests",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|partition| partition.as_str() == name)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory-tier key: a derived key scoped to its partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TierKey {
    pub partition: Partition,
    pub key: String,
}

impl TierKey {
    pub fn new(partition: Partition, key: impl Into<String>) -> Self {
        Self { partition, key: key.into() }
    }
}

/// A cached payload. The variant records the content class so it can be
/// stored and restored without guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum CachedValue {
    /// Structured API response
    Json { value: serde_json::Value },
    /// Raw bytes such as an image
    Binary { content_type: Option<String>, data: Vec<u8> },
    /// Serialized component state
    Opaque { value: serde_json::Value },
}

impl CachedValue {
    pub fn json(value: serde_json::Value) -> Self {
        Self::Json { value }
    }

    pub fn binary(data: Vec<u8>, content_type: Option<String>) -> Self {
        Self::Binary { content_type, data }
    }

    pub fn opaque(value: serde_json::Value) -> Self {
        Self::Opaque { value }
    }

    pub fn content_class(&self) -> &'static str {
        match self {
            Self::Json { .. } => "json",
            Self::Binary { .. } => "binary",
            Self::Opaque { .. } => "opaque",
        }
    }

    /// Approximate in-memory footprint in bytes.
    pub fn approximate_size(&self) -> usize {
        match self {
            Self::Json { value } | Self::Opaque { value } => approximate_json_size(value),
            Self::Binary { content_type, data } => {
                data.len() + content_type.as_ref().map_or(0, String::len)
            }
        }
    }
}

fn approximate_json_size(value: &serde_json::Value) -> usize {
    use serde_json::Value;
    match value {
        Value::Null | Value::Bool(_) => 8,
        Value::Number(_) => 16,
        Value::String(s) => s.len() + 24,
        Value::Array(items) => 24 + items.iter().map(approximate_json_size).sum::<usize>(),
        Value::Object(map) => {
            48 + map.iter().map(|(k, v)| k.len() + 24 + approximate_json_size(v)).sum::<usize>()
        }
    }
}

/// An entry as persisted: `{key, value, storedAt, ttl, version}` plus its
/// partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub partition: Partition,
    pub key: String,
    pub value: CachedValue,
    /// Wall-clock milliseconds since the UNIX epoch at insertion
    pub stored_at_ms: i64,
    pub ttl_ms: u64,
    /// Cache-format version the entry was written under
    pub version: u32,
}

impl StoredEntry {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn age_ms(&self, now_ms: i64) -> u64 {
        u64::try_from(now_ms.saturating_sub(self.stored_at_ms)).unwrap_or(0)
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining_ttl(&self, now_ms: i64) -> Duration {
        Duration::from_millis(self.ttl_ms.saturating_sub(self.age_ms(now_ms)))
    }
}

/// Returns `true` once more than `ttl` has elapsed since `stored_at`.
pub fn is_expired(entry: &StoredEntry, now_ms: i64) -> bool {
    entry.age_ms(now_ms) > entry.ttl_ms
}
