//! Model registry.
//!
//! Maps a model name to its primary-key field, identity and changelog.
//! Each registration owns its changelog behind its own mutex, so mutations of
//! different models never contend.

use crate::error::SyncError;
use crate::state::changelog::Changelog;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What a model name is bound to. Two registrations are the same model iff
/// their identities are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelIdentity {
    /// Store collection backing the model.
    pub source: String,
    pub primary_key: String,
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.source, self.primary_key)
    }
}

/// Optional registration settings.
#[derive(Debug, Clone, Default)]
pub struct ModelOptions {
    /// Replay window; the registry default when `None`.
    pub retention: Option<Duration>,
    /// Store collection; the model name when `None`.
    pub source: Option<String>,
}

impl ModelOptions {
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// One registered model.
#[derive(Debug)]
pub struct ModelRegistration {
    name: String,
    identity: ModelIdentity,
    /// Sole owner of the model's seq. Held across append + fan-out.
    pub(crate) log: Mutex<Changelog>,
}

impl ModelRegistration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    /// Store collection the model reads from and listens to.
    pub fn source(&self) -> &str {
        &self.identity.source
    }

    /// Read-only snapshot of the registration. Expired records are pruned
    /// first so `changelog_length` only counts replayable records.
    pub fn info(&self) -> ModelInfo {
        let mut log = self.log.lock();
        log.prune();
        ModelInfo {
            primary_key_field: self.identity.primary_key.clone(),
            current_seq: log.current_seq(),
            changelog_length: log.len(),
            retention_ms: u64::try_from(log.retention().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Read-only view of one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub primary_key_field: String,
    pub current_seq: u64,
    pub changelog_length: usize,
    pub retention_ms: u64,
}

/// Registered models by name.
pub struct ModelRegistry {
    models: DashMap<String, Arc<ModelRegistration>>,
    default_retention: Duration,
}

impl ModelRegistry {
    pub fn new(default_retention: Duration) -> Self {
        Self {
            models: DashMap::new(),
            default_retention,
        }
    }

    /// Register a model. Returns `true` if a registration was created and
    /// `false` if an identical one already existed.
    pub fn register(
        &self,
        name: &str,
        primary_key: &str,
        options: ModelOptions,
    ) -> Result<bool, SyncError> {
        let identity = ModelIdentity {
            source: options.source.unwrap_or_else(|| name.to_string()),
            primary_key: primary_key.to_string(),
        };

        match self.models.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.identity == identity {
                    Ok(false)
                } else {
                    Err(SyncError::ModelNameConflict {
                        name: name.to_string(),
                        existing: existing.identity.to_string(),
                        requested: identity.to_string(),
                    })
                }
            }
            Entry::Vacant(slot) => {
                let retention = options.retention.unwrap_or(self.default_retention);
                slot.insert(Arc::new(ModelRegistration {
                    name: name.to_string(),
                    identity,
                    log: Mutex::new(Changelog::new(retention)),
                }));
                Ok(true)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelRegistration>> {
        self.models.get(name).map(|r| Arc::clone(r.value()))
    }

    /// Registrations backed by `collection`, ordered by model name.
    pub fn by_source(&self, collection: &str) -> Vec<Arc<ModelRegistration>> {
        let mut found: Vec<Arc<ModelRegistration>> = self
            .models
            .iter()
            .filter(|r| r.value().identity.source == collection)
            .map(|r| Arc::clone(r.value()))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Whether `registration` is still the live registration for its name.
    pub fn is_current(&self, registration: &Arc<ModelRegistration>) -> bool {
        self.models
            .get(registration.name())
            .is_some_and(|r| Arc::ptr_eq(r.value(), registration))
    }

    pub fn info(&self, name: &str) -> Option<ModelInfo> {
        self.get(name).map(|r| r.info())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<ModelRegistration>> {
        self.models.remove(name).map(|(_, r)| r)
    }

    /// Sorted names of all registered models.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Remove and return every registration.
    pub fn drain(&self) -> Vec<Arc<ModelRegistration>> {
        self.names()
            .iter()
            .filter_map(|name| self.remove(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entwatch_proto::ChangeKind;

    fn registry() -> ModelRegistry {
        ModelRegistry::new(Duration::from_secs(300))
    }

    #[test]
    fn test_register_creates_empty_registration() {
        let reg = registry();
        assert!(reg.register("Order", "id", ModelOptions::default()).unwrap());
        let info = reg.info("Order").unwrap();
        assert_eq!(info.primary_key_field, "id");
        assert_eq!(info.current_seq, 0);
        assert_eq!(info.changelog_length, 0);
        assert_eq!(info.retention_ms, 300_000);
    }

    #[test]
    fn test_reregistering_same_identity_is_noop() {
        let reg = registry();
        assert!(reg.register("Order", "id", ModelOptions::default()).unwrap());
        reg.get("Order")
            .unwrap()
            .log
            .lock()
            .append(ChangeKind::Added, "1", None);

        assert!(!reg.register("Order", "id", ModelOptions::default()).unwrap());
        assert_eq!(reg.info("Order").unwrap().current_seq, 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_conflicting_identity_fails_and_leaves_registry_unchanged() {
        let reg = registry();
        reg.register("Order", "id", ModelOptions::default()).unwrap();

        let err = reg
            .register("Order", "id", ModelOptions::default().with_source("legacy_orders"))
            .unwrap_err();
        match err {
            SyncError::ModelNameConflict { existing, requested, .. } => {
                assert_eq!(existing, "Order(id)");
                assert_eq!(requested, "legacy_orders(id)");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = reg.register("Order", "uuid", ModelOptions::default()).unwrap_err();
        assert!(matches!(err, SyncError::ModelNameConflict { .. }));
        assert_eq!(reg.get("Order").unwrap().identity().source, "Order");
    }

    #[test]
    fn test_missing_model_is_none() {
        let reg = registry();
        assert!(reg.info("Ghost").is_none());
        assert!(reg.get("Ghost").is_none());
    }

    #[test]
    fn test_remove_and_is_current() {
        let reg = registry();
        reg.register("Order", "id", ModelOptions::default()).unwrap();
        let old = reg.get("Order").unwrap();
        assert!(reg.is_current(&old));

        reg.remove("Order");
        assert!(!reg.is_current(&old));

        reg.register("Order", "id", ModelOptions::default()).unwrap();
        assert!(!reg.is_current(&old));
    }

    #[test]
    fn test_drain_empties_registry() {
        let reg = registry();
        reg.register("Order", "id", ModelOptions::default()).unwrap();
        reg.register("Invoice", "number", ModelOptions::default()).unwrap();
        let drained = reg.drain();
        assert_eq!(drained.len(), 2);
        assert!(reg.is_empty());
        assert!(!reg.is_current(&drained[0]));
    }

    #[test]
    fn test_by_source_finds_every_backed_model() {
        let reg = registry();
        reg.register("Order", "id", ModelOptions::default().with_source("orders"))
            .unwrap();
        reg.register("OrderAudit", "id", ModelOptions::default().with_source("orders"))
            .unwrap();
        reg.register("Invoice", "id", ModelOptions::default()).unwrap();

        let names: Vec<String> = reg
            .by_source("orders")
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["Order", "OrderAudit"]);
        assert_eq!(reg.by_source("Invoice").len(), 1);
        assert!(reg.by_source("Order").is_empty());
        assert_eq!(reg.get("Order").unwrap().source(), "orders");
    }

    #[test]
    fn test_custom_retention() {
        let reg = registry();
        reg.register(
            "Order",
            "id",
            ModelOptions::default().with_retention(Duration::from_millis(1500)),
        )
        .unwrap();
        assert_eq!(reg.info("Order").unwrap().retention_ms, 1500);
    }
}
