//! Version stamps and change records.
//!
//! Every acknowledgement and notification carries a [`VersionStamp`], the
//! `(seq, timestamp)` pair identifying a point in one model's mutation history.
//! Timestamps travel as milliseconds since the Unix epoch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A point in a model's mutation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStamp {
    /// Model sequence number (0 before the first mutation).
    pub seq: u64,
    /// Wall-clock time the stamp was taken.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl VersionStamp {
    /// Create a stamp from its parts.
    pub fn new(seq: u64, timestamp: DateTime<Utc>) -> Self {
        Self { seq, timestamp }
    }
}

/// Kind of mutation recorded in a changelog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Entity was created. Payload is the full entity.
    Added,
    /// Entity was modified. Payload is the partial field diff.
    Updated,
    /// Entity was deleted. No payload.
    Removed,
}

impl ChangeKind {
    /// Lowercase name, used for metric labels and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed mutation of one entity.
///
/// Immutable once created; a changelog only ever drops records from its front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Sequence number assigned at append time.
    pub seq: u64,
    /// Wall-clock time of the append.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Primary-key value of the mutated entity.
    pub key: String,
    /// What happened.
    pub kind: ChangeKind,
    /// Full entity for `added`, partial diff for `updated`, absent for `removed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ChangeRecord {
    /// The version stamp this record was committed at.
    pub fn stamp(&self) -> VersionStamp {
        VersionStamp::new(self.seq, self.timestamp)
    }
}
