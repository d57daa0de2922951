//! Client handle - the push side of one connection.
//!
//! A `ClientHandle` is what the sync core holds for a connection: it can queue
//! frames for delivery and register close hooks, but it never owns the socket.
//! The connection task drains the queue and calls [`ClientHandle::close`] on
//! teardown, which runs every registered hook exactly once.

use crate::error::SendError;
use crate::state::ConnectionId;
use entwatch_proto::ServerFrame;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Id of a registered close hook.
pub type CloseHookId = u64;

type CloseHook = Box<dyn FnOnce(&ConnectionId) + Send>;

struct CloseState {
    closed: bool,
    next_hook: CloseHookId,
    hooks: Vec<(CloseHookId, CloseHook)>,
}

struct ClientInner {
    id: ConnectionId,
    tx: mpsc::Sender<ServerFrame>,
    state: Mutex<CloseState>,
}

/// Cheaply cloneable push handle for one client connection.
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<ClientInner>,
}

impl ClientHandle {
    /// Create a handle with a bounded outbound queue.
    ///
    /// The receiver is drained by the connection's write loop.
    pub fn new(id: impl Into<ConnectionId>, capacity: usize) -> (Self, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            inner: Arc::new(ClientInner {
                id: id.into(),
                tx,
                state: Mutex::new(CloseState {
                    closed: false,
                    next_hook: 0,
                    hooks: Vec::new(),
                }),
            }),
        };
        (handle, rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.inner.id
    }

    /// Queue a frame without waiting.
    pub fn send(&self, frame: ServerFrame) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        self.inner.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Register a hook to run when the connection closes.
    ///
    /// Returns `None` if the connection is already closed; the hook is dropped
    /// without running and the caller must clean up itself.
    pub fn on_close<F>(&self, hook: F) -> Option<CloseHookId>
    where
        F: FnOnce(&ConnectionId) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.closed {
            return None;
        }
        let id = state.next_hook;
        state.next_hook += 1;
        state.hooks.push((id, Box::new(hook)));
        Some(id)
    }

    /// Detach a hook. Returns `false` if it already ran or was never set.
    pub fn remove_close_hook(&self, hook: CloseHookId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.hooks.len();
        state.hooks.retain(|(id, _)| *id != hook);
        state.hooks.len() != before
    }

    /// Mark the connection closed and run its hooks.
    ///
    /// Only the first call runs hooks; later and re-entrant calls return `false`.
    pub fn close(&self) -> bool {
        let hooks = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            std::mem::take(&mut state.hooks)
        };
        for (_, hook) in hooks {
            hook(&self.inner.id);
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Number of hooks waiting for close.
    pub fn close_hook_count(&self) -> usize {
        self.inner.state.lock().hooks.len()
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
