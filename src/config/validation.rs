//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use thiserror::Error;

/// Smallest inbound frame limit that still fits a subscribe request.
const MIN_FRAME_BYTES: usize = 256;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("server.node_id must be exactly 3 characters, got {0}")]
    InvalidNodeId(usize),
    #[error("server.node_id must match [A-Z0-9]{{3}}, got '{0}'")]
    InvalidNodeIdFormat(String),
    #[error("server.metrics_port {0} collides with listen.address")]
    PortConflict(u16),
    #[error("sync.outbound_queue must be at least 1")]
    EmptyOutboundQueue,
    #[error("sync.max_frame_bytes must be at least 256, got {0}")]
    FrameLimitTooSmall(usize),
    #[error("models[{0}].name is required")]
    MissingModelName(usize),
    #[error("model '{0}' has an empty primary_key")]
    MissingPrimaryKey(String),
    #[error("model '{0}' is declared more than once")]
    DuplicateModel(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    let node_id = &config.server.node_id;
    if node_id.len() != 3 {
        errors.push(ValidationError::InvalidNodeId(node_id.len()));
    } else if !node_id
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        errors.push(ValidationError::InvalidNodeIdFormat(node_id.clone()));
    }

    let metrics_port = config.server.metrics_port;
    if metrics_port != 0 && metrics_port == config.listen.address.port() {
        errors.push(ValidationError::PortConflict(metrics_port));
    }

    if config.sync.outbound_queue == 0 {
        errors.push(ValidationError::EmptyOutboundQueue);
    }
    if config.sync.max_frame_bytes < MIN_FRAME_BYTES {
        errors.push(ValidationError::FrameLimitTooSmall(config.sync.max_frame_bytes));
    }

    let mut seen = HashSet::new();
    for (i, model) in config.models.iter().enumerate() {
        if model.name.is_empty() {
            errors.push(ValidationError::MissingModelName(i));
            continue;
        }
        if model.primary_key.is_empty() {
            errors.push(ValidationError::MissingPrimaryKey(model.name.clone()));
        }
        if !seen.insert(model.name.as_str()) {
            errors.push(ValidationError::DuplicateModel(model.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
