//! Network module.
//!
//! Contains the Gateway (WebSocket listener), the per-client Connection loop
//! and the ClientHandle the sync core pushes through.

mod client;
mod connection;
mod gateway;

pub use client::{ClientHandle, CloseHookId};
pub use connection::Connection;
pub use gateway::{ConnectionLimits, Gateway};
