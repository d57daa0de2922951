//! # entwatch-proto
//!
//! Wire types for the entwatch entity change-synchronization protocol.
//!
//! Clients hold one persistent connection, subscribe to single entities
//! (model name + primary-key value) and receive an initial value followed by
//! a live stream of add/update/remove notifications for exactly that entity.
//!
//! ## Frames
//!
//! All frames are JSON objects tagged by a `type` field:
//!
//! - [`ClientFrame`]: `subscribe-entity`, `unsubscribe-entity`
//! - [`ServerFrame`]: `subscribed`, `subscription-error`, `entity-added`,
//!   `entity-updated`, `entity-removed`
//!
//! ## Quick Start
//!
//! ```rust
//! use entwatch_proto::ClientFrame;
//!
//! let raw = r#"{"type":"subscribe-entity","requestId":"r1","model":"Order","key":"1"}"#;
//! let frame = ClientFrame::decode(raw).expect("valid frame");
//! assert!(matches!(frame, ClientFrame::SubscribeEntity { last_seq: None, .. }));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod frame;
pub mod version;

pub use error::{ProtoError, Result};
pub use frame::{ClientFrame, ErrorReason, ServerFrame, SubscribeBody, SubscribeMode};
pub use version::{ChangeKind, ChangeRecord, VersionStamp};
