//! Sync core state.
//!
//! Version clocks and changelogs per model, the model registry, the
//! subscription table and the `SyncManager` that ties them together.

pub mod changelog;
pub mod clock;
pub mod manager;
pub mod observer;
pub mod registry;
pub mod subscriptions;
mod uid;

pub use changelog::{Changelog, DeltaScope};
pub use clock::VersionClock;
pub use manager::{FanoutFailure, FanoutReport, SubscribeOutcome, SyncManager, SyncOptions};
pub use observer::{MutationEvent, MutationObserver, ObserverId};
pub use registry::{ModelIdentity, ModelInfo, ModelOptions, ModelRegistration, ModelRegistry};
pub use subscriptions::{Subscription, SubscriptionId, SubscriptionTable, SubscriptionView};
pub use uid::{ConnectionId, ConnectionIdGenerator};
