//! entwatchd - per-entity change synchronization over WebSocket.
//!
//! Clients subscribe to a single entity (model name + primary key), receive a
//! snapshot or a delta replayed from the model's changelog, and then a live
//! stream of add/update/remove notifications for exactly that entity.

pub mod config;
pub mod daemon;
pub mod error;
pub mod http;
pub mod metrics;
pub mod network;
pub mod state;
pub mod store;
pub mod telemetry;

pub use daemon::Daemon;
pub use error::{SendError, StoreError, SyncError};
pub use network::ClientHandle;
pub use state::{
    DeltaScope, ModelInfo, ModelOptions, MutationEvent, SubscribeOutcome, SyncManager,
    SyncOptions,
};
pub use store::{CallerContext, EntityStore, MemoryStore};
