//! Core data models shared by every stream-harness component.
//!
//! These types describe what flows between a source adapter, the content
//! sniffer, the parsers, and the caller: raw stream handles before they are
//! opened, and tagged records after they are parsed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Change semantics offered by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateMethod {
    /// Each read is a full replacement of the previous one.
    BatchFullSet,
    /// Only records added since the last read are new.
    AppendOnlyLog,
    /// An unbounded live feed.
    Continuous,
}

impl UpdateMethod {
    pub const ALL: [UpdateMethod; 3] = [
        UpdateMethod::BatchFullSet,
        UpdateMethod::AppendOnlyLog,
        UpdateMethod::Continuous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMethod::BatchFullSet => "BATCH_FULL_SET",
            UpdateMethod::AppendOnlyLog => "APPEND_ONLY_LOG",
            UpdateMethod::Continuous => "CONTINUOUS",
        }
    }

    /// Short human label used in prompt menus.
    pub fn label(&self) -> &'static str {
        match self {
            UpdateMethod::BatchFullSet => "Replace everything on each read",
            UpdateMethod::AppendOnlyLog => "Only read records appended since the last read",
            UpdateMethod::Continuous => "Continuously stream new records",
        }
    }
}

impl fmt::Display for UpdateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UpdateMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown update method: {}", s))
    }
}

/// How trustworthy a handle's `last_updated_hash` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashStatus {
    /// Derived from the content or transport metadata (mtime, ETag, ...).
    #[default]
    Exact,
    /// The engine has no change tracking; the hash is the inspection time
    /// and changes on every inspection whether or not the data did.
    WallClockFallback,
    /// No change token is available at all.
    Unavailable,
}

/// One not-yet-opened byte stream produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStreamHandle {
    /// Unique within the source.
    pub uri: String,
    pub file_name: String,
    /// Handles sharing a key are grouped into one stream set.
    pub stream_set: String,
    pub file_size: Option<u64>,
    pub reported_mime_type: Option<String>,
    /// Opaque change token; compared for equality only.
    pub last_updated_hash: Option<String>,
    #[serde(default)]
    pub hash_status: HashStatus,
}

impl RawStreamHandle {
    pub fn new(uri: impl Into<String>, file_name: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            stream_set: uri.clone(),
            uri,
            file_name: file_name.into(),
            file_size: None,
            reported_mime_type: None,
            last_updated_hash: None,
            hash_status: HashStatus::Unavailable,
        }
    }

    pub fn in_set(mut self, stream_set: impl Into<String>) -> Self {
        self.stream_set = stream_set.into();
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.file_size = size;
        self
    }

    pub fn with_reported_mime(mut self, mime: Option<String>) -> Self {
        self.reported_mime_type = mime;
        self
    }

    pub fn with_hash(mut self, hash: Option<String>, status: HashStatus) -> Self {
        self.hash_status = if hash.is_some() {
            status
        } else {
            HashStatus::Unavailable
        };
        self.last_updated_hash = hash;
        self
    }
}

/// One parsed record tagged with the logical schema it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordContext {
    pub schema_slug: String,
    pub record: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl RecordContext {
    pub fn new(schema_slug: impl Into<String>, record: Value) -> Self {
        Self {
            schema_slug: schema_slug.into(),
            record,
            received_at: None,
        }
    }
}

/// Where a previous read of a stream stopped.
///
/// Byte transports always replay from the start; resumption skips the
/// records that were already delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeState {
    pub records_delivered: u64,
    #[serde(default)]
    pub last_updated_hash: Option<String>,
}
