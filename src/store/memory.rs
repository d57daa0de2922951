//! In-memory entity store.
//!
//! Entities live in named collections, each behind its own `RwLock`.
//! Observers are called while the collection's write guard is held, so a
//! concurrent `get` either sees the value before the mutation or after the
//! observer ran.

use super::{CallerContext, EntityStore};
use crate::error::StoreError;
use crate::state::{MutationEvent, MutationObserver, ObserverId};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

type Entries = Arc<RwLock<HashMap<String, Value>>>;

#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Entries>,
    observers: RwLock<Vec<(ObserverId, Arc<dyn MutationObserver>)>>,
    next_observer: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self, collection: &str) -> Entries {
        Arc::clone(
            self.collections
                .entry(collection.to_string())
                .or_default()
                .value(),
        )
    }

    fn existing_entries(&self, collection: &str) -> Option<Entries> {
        self.collections.get(collection).map(|c| Arc::clone(c.value()))
    }

    /// Call every observer. The caller holds the collection's write guard.
    fn notify(&self, event: MutationEvent) {
        // Snapshot the list so an observer may detach itself.
        let observers: Vec<Arc<dyn MutationObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        trace!(collection = %event.collection, key = %event.key, kind = %event.kind, observers = observers.len(), "Mutation committed");
        for observer in observers {
            observer.on_mutation(&event);
        }
    }

    /// Insert or replace an entity. Returns the stored value.
    ///
    /// Replacing an existing key is reported as an update whose diff is the
    /// whole new value.
    pub fn insert(&self, collection: &str, key: &str, entity: Value) -> Value {
        let entries = self.entries(collection);
        let mut guard = entries.write();
        let existed = guard.insert(key.to_string(), entity.clone()).is_some();
        let event = if existed {
            MutationEvent::updated(collection, key, entity.clone())
        } else {
            MutationEvent::added(collection, key, entity.clone())
        };
        self.notify(event);
        entity
    }

    /// Shallow-merge `diff` into an existing object entity.
    ///
    /// Returns `Ok(None)` and fires nothing if the key does not exist.
    pub fn update(
        &self,
        collection: &str,
        key: &str,
        diff: Value,
    ) -> Result<Option<Value>, StoreError> {
        let Value::Object(fields) = &diff else {
            return Err(StoreError::InvalidPayload(
                "update diff must be a JSON object".to_string(),
            ));
        };
        let Some(entries) = self.existing_entries(collection) else {
            return Ok(None);
        };

        let mut guard = entries.write();
        let Some(current) = guard.get_mut(key) else {
            return Ok(None);
        };
        let Value::Object(target) = current else {
            return Err(StoreError::InvalidPayload(format!(
                "entity {collection}/{key} is not an object"
            )));
        };
        for (field, value) in fields {
            target.insert(field.clone(), value.clone());
        }
        let merged = current.clone();
        self.notify(MutationEvent::updated(collection, key, diff));
        Ok(Some(merged))
    }

    /// Delete an entity. Returns the removed value, `None` if absent.
    pub fn remove(&self, collection: &str, key: &str) -> Option<Value> {
        let entries = self.existing_entries(collection)?;
        let mut guard = entries.write();
        let removed = guard.remove(key)?;
        self.notify(MutationEvent::removed(collection, key));
        Some(removed)
    }

    /// Number of entities in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.existing_entries(collection)
            .map_or(0, |c| c.read().len())
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(
        &self,
        _ctx: &CallerContext,
        collection: &str,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self
            .existing_entries(collection)
            .and_then(|c| c.read().get(key).cloned()))
    }

    fn attach_observer(&self, observer: Arc<dyn MutationObserver>) -> ObserverId {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.observers.write().push((id, observer));
        id
    }

    fn detach_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entwatch_proto::ChangeKind;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<MutationEvent>>,
    }

    impl MutationObserver for Recorder {
        fn on_mutation(&self, event: &MutationEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn store_with_recorder() -> (MemoryStore, Arc<Recorder>) {
        let store = MemoryStore::new();
        let recorder = Arc::new(Recorder::default());
        store.attach_observer(recorder.clone());
        (store, recorder)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (store, recorder) = store_with_recorder();
        store.insert("Order", "1", json!({"id": "1", "name": "Alice"}));

        let ctx = CallerContext::default();
        let got = store.get(&ctx, "Order", "1").await.unwrap();
        assert_eq!(got, Some(json!({"id": "1", "name": "Alice"})));
        assert_eq!(store.get(&ctx, "Order", "2").await.unwrap(), None);
        assert_eq!(store.get(&ctx, "Invoice", "1").await.unwrap(), None);

        let events = recorder.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Added);
    }

    #[test]
    fn test_update_merges_and_reports_diff() {
        let (store, recorder) = store_with_recorder();
        store.insert("Order", "1", json!({"id": "1", "name": "Alice", "qty": 2}));
        let merged = store
            .update("Order", "1", json!({"name": "Bob"}))
            .unwrap()
            .unwrap();
        assert_eq!(merged, json!({"id": "1", "name": "Bob", "qty": 2}));

        let events = recorder.events.lock();
        assert_eq!(events[1].kind, ChangeKind::Updated);
        assert_eq!(events[1].payload, Some(json!({"name": "Bob"})));
    }

    #[test]
    fn test_missing_key_fires_nothing() {
        let (store, recorder) = store_with_recorder();
        assert_eq!(store.update("Order", "1", json!({"a": 1})).unwrap(), None);
        assert_eq!(store.remove("Order", "1"), None);
        assert!(recorder.events.lock().is_empty());
    }

    #[test]
    fn test_update_rejects_non_object_diff() {
        let (store, _) = store_with_recorder();
        store.insert("Order", "1", json!({"id": "1"}));
        let err = store.update("Order", "1", json!(5)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)));
    }

    #[test]
    fn test_replace_is_reported_as_update() {
        let (store, recorder) = store_with_recorder();
        store.insert("Order", "1", json!({"id": "1"}));
        store.insert("Order", "1", json!({"id": "1", "name": "Carol"}));
        let events = recorder.events.lock();
        assert_eq!(events[1].kind, ChangeKind::Updated);
        assert_eq!(events[1].payload, Some(json!({"id": "1", "name": "Carol"})));
    }

    #[test]
    fn test_remove_and_detach() {
        let (store, recorder) = store_with_recorder();
        store.insert("Order", "1", json!({"id": "1"}));
        assert_eq!(store.remove("Order", "1"), Some(json!({"id": "1"})));
        assert_eq!(store.len("Order"), 0);
        assert_eq!(recorder.events.lock()[1].kind, ChangeKind::Removed);

        assert!(store.detach_observer(0));
        assert!(!store.detach_observer(0));
        store.insert("Order", "2", json!({"id": "2"}));
        assert_eq!(recorder.events.lock().len(), 2);
    }
}
