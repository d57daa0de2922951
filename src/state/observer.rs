//! Mutation observer seam between the entity store and the sync core.
//!
//! Stores call observers for every committed mutation. The `SyncManager`
//! attaches one observer at construction and detaches it at disposal.

use entwatch_proto::ChangeKind;
use serde_json::Value;

/// One committed add/update/remove of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEvent {
    /// Store collection the write landed in.
    pub collection: String,
    pub key: String,
    pub kind: ChangeKind,
    /// Full entity for `Added`, partial diff for `Updated`, `None` for `Removed`.
    pub payload: Option<Value>,
}

impl MutationEvent {
    pub fn added(collection: impl Into<String>, key: impl Into<String>, entity: Value) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            kind: ChangeKind::Added,
            payload: Some(entity),
        }
    }

    pub fn updated(collection: impl Into<String>, key: impl Into<String>, diff: Value) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            kind: ChangeKind::Updated,
            payload: Some(diff),
        }
    }

    pub fn removed(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            kind: ChangeKind::Removed,
            payload: None,
        }
    }
}

/// Handle returned by a store when an observer is attached.
pub type ObserverId = u64;

/// Receives committed mutations from an entity store.
///
/// Stores must call `on_mutation` synchronously, after the write is applied
/// and before the write guard for that entity's collection is released, so that
/// a reader that observes the new value also observes the appended seq.
pub trait MutationObserver: Send + Sync {
    fn on_mutation(&self, event: &MutationEvent);
}
