//! Subscription table.
//!
//! Holds every active subscription, indexed three ways:
//! - by id, for unsubscribe
//! - by (model, key), for fan-out
//! - by connection, for teardown
//!
//! All three indexes live behind one lock so multi-subscription removals
//! (connection close, model removal, disposal) are never partially visible.

use crate::network::{ClientHandle, CloseHookId};
use crate::state::ConnectionId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

/// Unique identifier for a subscription (UUID v4 string).
pub type SubscriptionId = String;

/// One active watch on one entity.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub model: String,
    pub key: String,
    /// Push handle; the subscription does not own the connection.
    pub client: ClientHandle,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(model: impl Into<String>, key: impl Into<String>, client: ClientHandle) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.into(),
            key: key.into(),
            client,
            created_at: Utc::now(),
        }
    }

    pub fn view(&self) -> SubscriptionView {
        SubscriptionView {
            id: self.id.clone(),
            model: self.model.clone(),
            key: self.key.clone(),
            connection_id: self.client.id().clone(),
        }
    }
}

/// Serializable, handle-free view of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    pub id: SubscriptionId,
    pub model: String,
    pub key: String,
    pub connection_id: ConnectionId,
}

/// A connection that has had at least one subscription.
struct ConnectionEntry {
    client: ClientHandle,
    close_hook: Option<CloseHookId>,
    subscriptions: Vec<SubscriptionId>,
}

#[derive(Default)]
struct TableInner {
    by_id: HashMap<SubscriptionId, Subscription>,
    by_entity: HashMap<(String, String), Vec<SubscriptionId>>,
    by_connection: HashMap<ConnectionId, ConnectionEntry>,
}

impl TableInner {
    /// The single removal path shared by every trigger.
    fn remove(&mut self, id: &str) -> Option<Subscription> {
        let sub = self.by_id.remove(id)?;

        let entity = (sub.model.clone(), sub.key.clone());
        if let Some(ids) = self.by_entity.get_mut(&entity) {
            ids.retain(|s| s != id);
            if ids.is_empty() {
                self.by_entity.remove(&entity);
            }
        }
        if let Some(entry) = self.by_connection.get_mut(sub.client.id()) {
            entry.subscriptions.retain(|s| s != id);
        }
        Some(sub)
    }
}

/// Result of inserting a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// First subscription ever on this connection; a close hook must be attached.
    FirstForConnection,
    /// The connection is already tracked.
    Existing,
}

/// The set of active subscriptions.
#[derive(Default)]
pub struct SubscriptionTable {
    inner: RwLock<TableInner>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sub: Subscription) -> Inserted {
        let mut inner = self.inner.write();
        let conn_id = sub.client.id().clone();

        inner
            .by_entity
            .entry((sub.model.clone(), sub.key.clone()))
            .or_default()
            .push(sub.id.clone());

        let inserted = match inner.by_connection.get_mut(&conn_id) {
            Some(entry) => {
                entry.subscriptions.push(sub.id.clone());
                Inserted::Existing
            }
            None => {
                inner.by_connection.insert(
                    conn_id,
                    ConnectionEntry {
                        client: sub.client.clone(),
                        close_hook: None,
                        subscriptions: vec![sub.id.clone()],
                    },
                );
                Inserted::FirstForConnection
            }
        };

        inner.by_id.insert(sub.id.clone(), sub);
        inserted
    }

    /// Remember the close hook attached for a connection.
    pub fn set_close_hook(&self, conn_id: &str, hook: CloseHookId) {
        if let Some(entry) = self.inner.write().by_connection.get_mut(conn_id) {
            entry.close_hook = Some(hook);
        }
    }

    pub fn remove(&self, id: &str) -> Option<Subscription> {
        self.inner.write().remove(id)
    }

    /// Remove every subscription of a connection and forget the connection.
    pub fn remove_connection(&self, conn_id: &str) -> Vec<Subscription> {
        let mut inner = self.inner.write();
        let Some(entry) = inner.by_connection.remove(conn_id) else {
            return Vec::new();
        };
        entry
            .subscriptions
            .iter()
            .filter_map(|id| inner.remove(id))
            .collect()
    }

    /// Remove every subscription on a model.
    pub fn remove_model(&self, model: &str) -> Vec<Subscription> {
        let mut inner = self.inner.write();
        let ids: Vec<SubscriptionId> = inner
            .by_entity
            .iter()
            .filter(|((m, _), _)| m == model)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect();
        ids.iter().filter_map(|id| inner.remove(id)).collect()
    }

    /// Remove everything. Returns the removed subscriptions and the close
    /// hooks that were attached, so the caller can detach them.
    pub fn drain(&self) -> (Vec<Subscription>, Vec<(ClientHandle, CloseHookId)>) {
        let mut inner = self.inner.write();
        let TableInner {
            by_id,
            by_connection,
            ..
        } = std::mem::take(&mut *inner);

        let hooks = by_connection
            .into_values()
            .filter_map(|entry| entry.close_hook.map(|hook| (entry.client, hook)))
            .collect();
        (by_id.into_values().collect(), hooks)
    }

    /// Run `f` for each subscription on `(model, key)` while holding the read
    /// lock, so no subscription can be removed mid-delivery.
    pub fn for_each_matching<F>(&self, model: &str, key: &str, mut f: F) -> usize
    where
        F: FnMut(&Subscription),
    {
        let inner = self.inner.read();
        let Some(ids) = inner.by_entity.get(&(model.to_string(), key.to_string())) else {
            return 0;
        };
        let mut visited = 0;
        for sub in ids.iter().filter_map(|id| inner.by_id.get(id)) {
            f(sub);
            visited += 1;
        }
        visited
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_for_connection(&self, conn_id: &str) -> usize {
        self.inner
            .read()
            .by_connection
            .get(conn_id)
            .map_or(0, |e| e.subscriptions.len())
    }

    /// Views of all subscriptions, ordered by creation time.
    pub fn views(&self) -> Vec<SubscriptionView> {
        let inner = self.inner.read();
        let mut subs: Vec<&Subscription> = inner.by_id.values().collect();
        subs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        subs.into_iter().map(Subscription::view).collect()
    }
}
