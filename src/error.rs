//! Unified error handling for entwatchd.
//!
//! This module provides the error hierarchy for the sync core and its two
//! collaborator boundaries (entity store and client transport), with static
//! codes for metric labeling.

use entwatch_proto::ErrorReason;
use thiserror::Error;

// ============================================================================
// Sync Errors (SyncManager operations)
// ============================================================================

/// Errors returned by `SyncManager` operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A different model identity already owns this name. Registry unchanged.
    #[error("model name {name:?} is registered to {existing}, cannot register {requested}")]
    ModelNameConflict {
        name: String,
        existing: String,
        requested: String,
    },

    /// The manager was disposed; calling into it is a lifecycle bug.
    #[error("sync manager has been disposed")]
    Disposed,
}

impl SyncError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ModelNameConflict { .. } => "model_name_conflict",
            Self::Disposed => "disposed",
        }
    }
}

// ============================================================================
// Store Errors (entity store boundary)
// ============================================================================

/// Errors surfaced by an `EntityStore`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("caller is not authorized")]
    NotAuthorized,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl StoreError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotAuthorized => "not_authorized",
            Self::Unavailable(_) => "store_unavailable",
            Self::InvalidPayload(_) => "invalid_payload",
        }
    }

    /// Map to the reason reported in a `subscription-error` frame.
    pub fn to_reason(&self) -> ErrorReason {
        match self {
            Self::NotAuthorized => ErrorReason::NotAuthorized,
            Self::Unavailable(_) | Self::InvalidPayload(_) => ErrorReason::StoreUnavailable,
        }
    }
}

// ============================================================================
// Send Errors (client transport boundary)
// ============================================================================

/// Failure to queue a frame for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    /// The client's outbound queue is full (slow consumer).
    #[error("outbound queue full")]
    QueueFull,
}

impl SendError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::QueueFull => "queue_full",
        }
    }
}
