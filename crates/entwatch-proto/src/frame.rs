//! Client and server frames.
//!
//! Frames are tagged JSON objects. Decoding happens once at the transport
//! edge; everything behind it works with these enums and matches
//! exhaustively.

use crate::error::{ProtoError, Result};
use crate::version::{ChangeRecord, VersionStamp};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Watch one entity. `last_seq` asks for a delta instead of a snapshot.
    SubscribeEntity {
        /// Client-chosen correlation id, echoed in the response.
        #[serde(deserialize_with = "string_or_number")]
        request_id: String,
        /// Registered model name.
        model: String,
        /// Primary-key value of the entity.
        #[serde(deserialize_with = "string_or_number")]
        key: String,
        /// Last sequence number the client has applied, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seq: Option<u64>,
    },
    /// Stop watching. Unknown ids are ignored.
    UnsubscribeEntity {
        /// Id from a previous `subscribed` frame.
        subscription_id: String,
    },
}

impl ClientFrame {
    const TYPES: &'static [&'static str] = &["subscribe-entity", "unsubscribe-entity"];

    /// Decode a client frame from JSON text.
    pub fn decode(raw: &str) -> Result<Self> {
        decode_tagged(raw, Self::TYPES)
    }

    /// Encode this frame as JSON text.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// How a subscribe request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeMode {
    /// Current full value.
    Snapshot,
    /// Changes since the client's `lastSeq`.
    Delta,
}

impl SubscribeMode {
    /// Lowercase name, used for metric labels and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Delta => "delta",
        }
    }
}

/// Mode-specific part of a `subscribed` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SubscribeBody {
    /// Current value; `None` when the entity does not exist.
    Snapshot {
        /// The entity, serialized as `null` when absent.
        data: Option<Value>,
    },
    /// Retained changes for the entity with `seq > lastSeq`, ascending.
    Delta {
        /// The replayed records.
        changes: Vec<ChangeRecord>,
    },
}

impl SubscribeBody {
    /// The mode this body represents.
    pub fn mode(&self) -> SubscribeMode {
        match self {
            Self::Snapshot { .. } => SubscribeMode::Snapshot,
            Self::Delta { .. } => SubscribeMode::Delta,
        }
    }
}

/// Why a subscribe request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorReason {
    /// No model with that name is registered.
    ModelNotRegistered,
    /// The entity store could not be read.
    StoreUnavailable,
    /// The store refused the caller.
    NotAuthorized,
}

impl ErrorReason {
    /// Kebab-case name as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelNotRegistered => "model-not-registered",
            Self::StoreUnavailable => "store-unavailable",
            Self::NotAuthorized => "not-authorized",
        }
    }
}

/// Frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// Acknowledges a `subscribe-entity` request.
    Subscribed {
        /// Echo of the request id.
        request_id: String,
        /// Model name.
        model: String,
        /// Id to use for `unsubscribe-entity`.
        subscription_id: String,
        /// Snapshot or delta payload, flattened next to `mode`.
        #[serde(flatten)]
        body: SubscribeBody,
        /// Model version the payload reflects.
        version: VersionStamp,
    },
    /// Refuses a `subscribe-entity` request. No subscription exists.
    SubscriptionError {
        /// Echo of the request id.
        request_id: String,
        /// Model name from the request.
        model: String,
        /// Why the request was refused.
        reason: ErrorReason,
    },
    /// The watched entity was created.
    EntityAdded {
        /// Full entity.
        entity: Value,
        /// Stamp of the mutation.
        version: VersionStamp,
    },
    /// The watched entity was modified.
    EntityUpdated {
        /// The partial diff that was applied.
        change: Value,
        /// Stamp of the mutation.
        version: VersionStamp,
    },
    /// The watched entity was deleted.
    EntityRemoved {
        /// Primary-key value of the removed entity.
        id: String,
        /// Stamp of the mutation.
        version: VersionStamp,
    },
}

impl ServerFrame {
    const TYPES: &'static [&'static str] = &[
        "subscribed",
        "subscription-error",
        "entity-added",
        "entity-updated",
        "entity-removed",
    ];

    /// Frame type as it appears in the `type` tag.
    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::Subscribed { .. } => "subscribed",
            Self::SubscriptionError { .. } => "subscription-error",
            Self::EntityAdded { .. } => "entity-added",
            Self::EntityUpdated { .. } => "entity-updated",
            Self::EntityRemoved { .. } => "entity-removed",
        }
    }

    /// Version stamp carried by the frame, if any.
    pub fn version(&self) -> Option<VersionStamp> {
        match self {
            Self::Subscribed { version, .. }
            | Self::EntityAdded { version, .. }
            | Self::EntityUpdated { version, .. }
            | Self::EntityRemoved { version, .. } => Some(*version),
            Self::SubscriptionError { .. } => None,
        }
    }

    /// Decode a server frame from JSON text.
    pub fn decode(raw: &str) -> Result<Self> {
        decode_tagged(raw, Self::TYPES)
    }

    /// Encode this frame as JSON text.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decode a tagged frame, reporting unknown tags distinctly from bad JSON.
fn decode_tagged<T: serde::de::DeserializeOwned>(raw: &str, known: &[&str]) -> Result<T> {
    let value: Value = serde_json::from_str(raw)?;
    let frame_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtoError::MissingType)?;
    if !known.contains(&frame_type) {
        return Err(ProtoError::UnknownFrame(frame_type.to_string()));
    }
    Ok(serde_json::from_value(value)?)
}

/// Accept identifiers sent either as JSON strings or as integers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Int(n) => n.to_string(),
        Id::Uint(n) => n.to_string(),
    })
}
