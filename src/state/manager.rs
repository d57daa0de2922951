//! Sync manager.
//!
//! Owns the model registry and the subscription table. Answers subscribe
//! requests with a snapshot or delta, appends every observed store mutation to
//! its model's changelog, and fans the change out to the matching
//! subscriptions.
//!
//! # Locking
//!
//! Per model, the changelog mutex is held across append and fan-out, and
//! across the final validate-insert-ack step of a subscribe. The subscription
//! table lock is only ever taken while holding at most one model lock, never
//! the other way around.

use crate::error::{SendError, SyncError};
use crate::metrics;
use crate::network::ClientHandle;
use crate::state::changelog::DeltaScope;
use crate::state::observer::{MutationEvent, MutationObserver, ObserverId};
use crate::state::registry::{ModelInfo, ModelOptions, ModelRegistration, ModelRegistry};
use crate::state::subscriptions::{
    Inserted, Subscription, SubscriptionId, SubscriptionTable, SubscriptionView,
};
use crate::state::ConnectionId;
use crate::store::{CallerContext, EntityStore};
use crate::telemetry::{SubscribeTimer, spans};
use entwatch_proto::{
    ChangeKind, ChangeRecord, ErrorReason, ServerFrame, SubscribeBody, SubscribeMode, VersionStamp,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Snapshot attempts between "still retrying" warnings.
const SNAPSHOT_RETRY_WARN_EVERY: u32 = 16;

/// Manager-wide settings.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Retention for models registered without one.
    pub default_retention: Duration,
    pub delta_scope: DeltaScope,
    /// Stale snapshot reads tolerated before a subscribe is refused with
    /// `store-unavailable`. 0 retries forever.
    pub snapshot_retry_limit: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            default_retention: Duration::from_secs(300),
            delta_scope: DeltaScope::Key,
            snapshot_retry_limit: 64,
        }
    }
}

/// What a subscribe request produced. Exactly one frame was pushed either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed {
        subscription_id: SubscriptionId,
        mode: SubscribeMode,
    },
    Rejected(ErrorReason),
}

impl SubscribeOutcome {
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            Self::Subscribed { subscription_id, .. } => Some(subscription_id),
            Self::Rejected(_) => None,
        }
    }
}

/// One subscriber that could not be notified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutFailure {
    pub subscription_id: SubscriptionId,
    pub connection_id: ConnectionId,
    pub error: SendError,
}

/// Result of fanning out one mutation to one model's subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub model: String,
    pub seq: u64,
    pub recipients: usize,
    pub delivered: usize,
    pub failures: Vec<FanoutFailure>,
}

/// Result of one snapshot commit attempt.
enum SnapshotCommit {
    Done(SubscribeOutcome),
    Stale,
}

/// Entity change synchronization engine.
pub struct SyncManager {
    this: Weak<SyncManager>,
    store: Arc<dyn EntityStore>,
    registry: ModelRegistry,
    subscriptions: SubscriptionTable,
    delta_scope: DeltaScope,
    snapshot_retry_limit: u32,
    observer: Mutex<Option<ObserverId>>,
    disposed: AtomicBool,
}

impl SyncManager {
    /// Create a manager and attach it to `store`'s mutation stream.
    pub fn new(store: Arc<dyn EntityStore>, options: SyncOptions) -> Arc<Self> {
        let manager = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            store: Arc::clone(&store),
            registry: ModelRegistry::new(options.default_retention),
            subscriptions: SubscriptionTable::new(),
            delta_scope: options.delta_scope,
            snapshot_retry_limit: options.snapshot_retry_limit,
            observer: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        let observer = Arc::new(ManagerObserver {
            manager: Arc::downgrade(&manager),
        });
        *manager.observer.lock() = Some(store.attach_observer(observer));
        manager
    }

    fn ensure_live(&self) -> Result<(), SyncError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(SyncError::Disposed);
        }
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------

    /// Register a model. Re-registering the same identity is a no-op that
    /// returns `Ok(false)`.
    pub fn register_model(
        &self,
        name: &str,
        primary_key: &str,
        options: ModelOptions,
    ) -> Result<bool, SyncError> {
        self.ensure_live()?;
        let created = self.registry.register(name, primary_key, options)?;
        if created {
            info!(model = %name, primary_key = %primary_key, "Model registered");
        }
        Ok(created)
    }

    /// Remove a model and every subscription on it.
    pub fn unregister_model(&self, name: &str) -> Result<bool, SyncError> {
        self.ensure_live()?;
        let Some(registration) = self.registry.remove(name) else {
            return Ok(false);
        };

        // Wait out any in-flight fan-out or subscribe commit for the model.
        let _log = registration.log.lock();
        let removed = self.subscriptions.remove_model(name);
        metrics::set_active_subscriptions(self.subscriptions.len());
        info!(model = %name, subscriptions = removed.len(), "Model unregistered");
        Ok(true)
    }

    /// Read-only view of a registration; `None` if unknown or disposed.
    pub fn model_info(&self, name: &str) -> Option<ModelInfo> {
        if self.is_disposed() {
            return None;
        }
        self.registry.info(name)
    }

    /// Store collection backing a model; `None` if unknown or disposed.
    pub fn model_source(&self, name: &str) -> Option<String> {
        if self.is_disposed() {
            return None;
        }
        self.registry.get(name).map(|r| r.source().to_string())
    }

    pub fn model_names(&self) -> Vec<String> {
        self.registry.names()
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Handle one `subscribe-entity` request.
    ///
    /// Pushes exactly one frame to `client`: `subscribed` (snapshot or delta)
    /// or `subscription-error`. Store failures are reported to the client, not
    /// returned; the only error is [`SyncError::Disposed`].
    pub async fn subscribe_entity(
        &self,
        client: &ClientHandle,
        ctx: &CallerContext,
        request_id: &str,
        model: &str,
        key: &str,
        last_seq: Option<u64>,
    ) -> Result<SubscribeOutcome, SyncError> {
        self.ensure_live()?;
        let mut timer = SubscribeTimer::start();

        let Some(registration) = self.registry.get(model) else {
            debug!(model = %model, "Subscribe to unregistered model");
            return Ok(self.reject(client, request_id, model, ErrorReason::ModelNotRegistered));
        };

        if let Some(last_seq) = last_seq {
            if let Some(outcome) =
                self.try_delta(&registration, client, request_id, key, last_seq)?
            {
                if let SubscribeOutcome::Subscribed { mode, .. } = &outcome {
                    timer.mode(mode.as_str());
                }
                return Ok(outcome);
            }
            debug!(model = %model, key = %key, last_seq, "Changelog gap, falling back to snapshot");
        }

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let seq_before = registration.log.lock().current_seq();

            let data = match self.store.get(ctx, registration.source(), key).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(model = %model, key = %key, error = %e, "Snapshot read failed");
                    return Ok(self.reject(client, request_id, model, e.to_reason()));
                }
            };

            match self.commit_snapshot(&registration, client, request_id, key, seq_before, data)? {
                SnapshotCommit::Done(outcome) => {
                    if let SubscribeOutcome::Subscribed { mode, .. } = &outcome {
                        timer.mode(mode.as_str());
                    }
                    return Ok(outcome);
                }
                SnapshotCommit::Stale => {
                    metrics::record_snapshot_retry();
                    if self.snapshot_retry_limit != 0 && attempts >= self.snapshot_retry_limit {
                        warn!(model = %model, key = %key, attempts, "Snapshot retry limit reached");
                        return Ok(self.reject(
                            client,
                            request_id,
                            model,
                            ErrorReason::StoreUnavailable,
                        ));
                    }
                    if attempts % SNAPSHOT_RETRY_WARN_EVERY == 0 {
                        warn!(model = %model, key = %key, attempts, "Snapshot still invalidated by concurrent commits");
                    }
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Answer with a delta if the changelog covers `(last_seq, current_seq]`.
    /// `Ok(None)` means a gap; the caller falls back to a snapshot.
    fn try_delta(
        &self,
        registration: &Arc<ModelRegistration>,
        client: &ClientHandle,
        request_id: &str,
        key: &str,
        last_seq: u64,
    ) -> Result<Option<SubscribeOutcome>, SyncError> {
        let mut log = registration.log.lock();
        log.prune();
        if !log.can_replay_from(last_seq) {
            return Ok(None);
        }
        let changes = log.changes_since(last_seq, key, self.delta_scope);
        let version = log.stamp();
        let outcome = self.commit(
            registration,
            client,
            request_id,
            key,
            SubscribeBody::Delta { changes },
            version,
        )?;
        Ok(Some(outcome))
    }

    /// Finish a snapshot subscribe if no mutation committed since `seq_before`.
    fn commit_snapshot(
        &self,
        registration: &Arc<ModelRegistration>,
        client: &ClientHandle,
        request_id: &str,
        key: &str,
        seq_before: u64,
        data: Option<Value>,
    ) -> Result<SnapshotCommit, SyncError> {
        let mut log = registration.log.lock();
        if log.current_seq() != seq_before {
            return Ok(SnapshotCommit::Stale);
        }
        let version = log.stamp();
        let outcome = self.commit(
            registration,
            client,
            request_id,
            key,
            SubscribeBody::Snapshot { data },
            version,
        )?;
        Ok(SnapshotCommit::Done(outcome))
    }

    /// Insert the subscription and push the ack. Caller holds the model lock.
    fn commit(
        &self,
        registration: &Arc<ModelRegistration>,
        client: &ClientHandle,
        request_id: &str,
        key: &str,
        body: SubscribeBody,
        version: VersionStamp,
    ) -> Result<SubscribeOutcome, SyncError> {
        self.ensure_live()?;
        let model = registration.name();
        if !self.registry.is_current(registration) {
            debug!(model = %model, "Model unregistered during subscribe");
            return Ok(self.reject(client, request_id, model, ErrorReason::ModelNotRegistered));
        }

        let subscription = Subscription::new(model, key, client.clone());
        let subscription_id = subscription.id.clone();
        if self.subscriptions.insert(subscription) == Inserted::FirstForConnection {
            self.attach_close_hook(client);
        }
        metrics::set_active_subscriptions(self.subscriptions.len());

        let mode = body.mode();
        let ack = ServerFrame::Subscribed {
            request_id: request_id.to_string(),
            model: model.to_string(),
            subscription_id: subscription_id.clone(),
            body,
            version,
        };
        if let Err(e) = client.send(ack) {
            warn!(connection_id = %client.id(), subscription_id = %subscription_id, error = %e, "Failed to send subscribe ack");
        }
        debug!(
            model = %model,
            key = %key,
            subscription_id = %subscription_id,
            mode = mode.as_str(),
            seq = version.seq,
            "Subscription created"
        );

        Ok(SubscribeOutcome::Subscribed {
            subscription_id,
            mode,
        })
    }

    /// Purge the connection's subscriptions when it closes.
    fn attach_close_hook(&self, client: &ClientHandle) {
        let manager = self.this.clone();
        let hook = client.on_close(move |connection_id| {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            if let Err(e) = manager.connection_closed(connection_id) {
                trace!(connection_id = %connection_id, error = %e, "Close hook ignored");
            }
        });
        match hook {
            Some(hook) => self.subscriptions.set_close_hook(client.id(), hook),
            None => {
                // Closed before the hook could be attached.
                let removed = self.subscriptions.remove_connection(client.id());
                debug!(connection_id = %client.id(), removed = removed.len(), "Connection already closed, subscriptions purged");
            }
        }
    }

    fn reject(
        &self,
        client: &ClientHandle,
        request_id: &str,
        model: &str,
        reason: ErrorReason,
    ) -> SubscribeOutcome {
        let frame = ServerFrame::SubscriptionError {
            request_id: request_id.to_string(),
            model: model.to_string(),
            reason,
        };
        if let Err(e) = client.send(frame) {
            warn!(connection_id = %client.id(), error = %e, "Failed to send subscription error");
        }
        SubscribeOutcome::Rejected(reason)
    }

    /// Remove a subscription. Unknown ids are `Ok(false)`.
    pub fn unsubscribe(&self, subscription_id: &str) -> Result<bool, SyncError> {
        self.ensure_live()?;
        let removed = self.subscriptions.remove(subscription_id);
        if let Some(sub) = &removed {
            debug!(subscription_id = %sub.id, model = %sub.model, key = %sub.key, "Unsubscribed");
            metrics::set_active_subscriptions(self.subscriptions.len());
        }
        Ok(removed.is_some())
    }

    /// Remove every subscription owned by a connection. Safe to call repeatedly.
    pub fn connection_closed(&self, connection_id: &str) -> Result<usize, SyncError> {
        self.ensure_live()?;
        let removed = self.subscriptions.remove_connection(connection_id);
        if !removed.is_empty() {
            debug!(connection_id = %connection_id, removed = removed.len(), "Connection subscriptions purged");
            metrics::set_active_subscriptions(self.subscriptions.len());
        }
        Ok(removed.len())
    }

    pub fn active_subscriptions(&self) -> Vec<SubscriptionView> {
        self.subscriptions.views()
    }

    pub fn active_subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn subscriptions_for_connection(&self, connection_id: &str) -> usize {
        self.subscriptions.count_for_connection(connection_id)
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    /// Append a committed mutation to every model backed by its collection
    /// and notify the entity's subscribers.
    ///
    /// Returns one report per model; empty when no registered model reads
    /// from the collection. Per-subscriber send failures are logged and
    /// reported, never returned as errors.
    pub fn apply_mutation(&self, event: &MutationEvent) -> Result<Vec<FanoutReport>, SyncError> {
        self.ensure_live()?;
        let registrations = self.registry.by_source(&event.collection);
        if registrations.is_empty() {
            trace!(collection = %event.collection, "Mutation on unregistered collection ignored");
        }
        Ok(registrations
            .iter()
            .filter_map(|registration| self.fan_out(registration, event))
            .collect())
    }

    /// Append + fan-out for one model, under its changelog lock.
    fn fan_out(
        &self,
        registration: &Arc<ModelRegistration>,
        event: &MutationEvent,
    ) -> Option<FanoutReport> {
        let model = registration.name();
        let _span = spans::mutation(model, &event.key, event.kind.as_str()).entered();

        let mut log = registration.log.lock();
        if !self.registry.is_current(registration) {
            return None;
        }
        let record = log.append(event.kind, event.key.clone(), event.payload.clone());
        metrics::record_mutation(model, event.kind.as_str());

        let frame = notification(&record);
        let mut delivered = 0;
        let mut failures = Vec::new();
        let recipients = self
            .subscriptions
            .for_each_matching(model, &event.key, |sub| {
                match sub.client.send(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(error) => {
                        warn!(
                            subscription_id = %sub.id,
                            connection_id = %sub.client.id(),
                            model = %sub.model,
                            key = %sub.key,
                            error = %error,
                            "Failed to deliver notification"
                        );
                        metrics::record_notification_failure(error.error_code());
                        failures.push(FanoutFailure {
                            subscription_id: sub.id.clone(),
                            connection_id: sub.client.id().clone(),
                            error,
                        });
                    }
                }
            });
        drop(log);

        metrics::record_fanout(recipients, delivered);
        trace!(seq = record.seq, recipients, delivered, "Mutation fanned out");
        Some(FanoutReport {
            model: model.to_string(),
            seq: record.seq,
            recipients,
            delivered,
            failures,
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Tear everything down. A second call returns `Err(Disposed)`.
    ///
    /// Subscribers are not notified. Close hooks are detached and the store
    /// observer is removed.
    pub fn dispose(&self) -> Result<(), SyncError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Err(SyncError::Disposed);
        }
        self.detach_observer();

        let registrations = self.registry.drain();
        for registration in &registrations {
            // Barrier against a subscribe commit that already passed its checks.
            drop(registration.log.lock());
        }

        let (subscriptions, hooks) = self.subscriptions.drain();
        for (client, hook) in hooks {
            client.remove_close_hook(hook);
        }
        metrics::set_active_subscriptions(0);
        info!(
            models = registrations.len(),
            subscriptions = subscriptions.len(),
            "Sync manager disposed"
        );
        Ok(())
    }

    fn detach_observer(&self) {
        if let Some(id) = self.observer.lock().take() {
            self.store.detach_observer(id);
        }
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        self.detach_observer();
    }
}

/// Build the push frame for one change record.
fn notification(record: &ChangeRecord) -> ServerFrame {
    let version = record.stamp();
    match record.kind {
        ChangeKind::Added => ServerFrame::EntityAdded {
            entity: record.payload.clone().unwrap_or(Value::Null),
            version,
        },
        ChangeKind::Updated => ServerFrame::EntityUpdated {
            change: record.payload.clone().unwrap_or(Value::Null),
            version,
        },
        ChangeKind::Removed => ServerFrame::EntityRemoved {
            id: record.key.clone(),
            version,
        },
    }
}

/// Store observer that forwards into a manager without keeping it alive.
struct ManagerObserver {
    manager: Weak<SyncManager>,
}

impl MutationObserver for ManagerObserver {
    fn on_mutation(&self, event: &MutationEvent) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        if let Err(e) = manager.apply_mutation(event) {
            trace!(collection = %event.collection, error = %e, "Mutation not applied");
        }
    }
}
