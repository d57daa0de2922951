//! Entity store abstraction.
//!
//! The sync core never owns entities. It reads current values through
//! [`EntityStore::get`] and learns about commits through a
//! [`MutationObserver`] attached at construction.

use crate::error::StoreError;
use crate::state::{ConnectionId, MutationObserver, ObserverId};
use async_trait::async_trait;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;

pub mod memory;

pub use memory::MemoryStore;

/// Who is asking. Opaque to the sync core; forwarded to the store so it can
/// make authorization decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub connection_id: Option<ConnectionId>,
    pub remote_addr: Option<SocketAddr>,
    /// Credential presented at handshake, if any.
    pub principal: Option<String>,
}

impl CallerContext {
    pub fn for_connection(connection_id: impl Into<ConnectionId>, remote_addr: SocketAddr) -> Self {
        Self {
            connection_id: Some(connection_id.into()),
            remote_addr: Some(remote_addr),
            principal: None,
        }
    }

    pub fn with_principal(mut self, principal: Option<String>) -> Self {
        self.principal = principal;
        self
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Current value of one entity in `collection`, `None` if it does not
    /// exist.
    async fn get(
        &self,
        ctx: &CallerContext,
        collection: &str,
        key: &str,
    ) -> Result<Option<Value>, StoreError>;

    /// Start delivering committed mutations to `observer`.
    ///
    /// Implementations must invoke the observer synchronously while the
    /// committing write is still exclusive, as documented on
    /// [`MutationObserver`].
    fn attach_observer(&self, observer: Arc<dyn MutationObserver>) -> ObserverId;

    /// Stop delivering to an observer. Returns `false` if it was not attached.
    fn detach_observer(&self, id: ObserverId) -> bool;
}
