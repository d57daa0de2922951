//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, ConfigError)
//! - [`listen`]: WebSocket listener configuration (ListenConfig)
//! - [`sync`]: Sync engine tuning and model blocks (SyncConfig, ModelBlock)
//! - [`validation`]: Startup checks that collect every problem at once

mod defaults;
mod listen;
mod sync;
mod types;
pub mod validation;

pub use listen::ListenConfig;
pub use sync::{ModelBlock, SyncConfig};
pub use types::{Config, ConfigError, ServerConfig};
pub use validation::{ValidationError, validate};
