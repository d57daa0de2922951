//! Error types for frame encoding and decoding.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtoError`].
pub type Result<T, E = ProtoError> = std::result::Result<T, E>;

/// Errors raised at the wire boundary.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The payload was not valid JSON or did not match the frame shape.
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame carried no `type` tag.
    #[error("frame has no type tag")]
    MissingType,

    /// The `type` tag names a frame this side does not understand.
    #[error("unknown frame type: {0}")]
    UnknownFrame(String),
}

impl ProtoError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Json(_) => "invalid_json",
            Self::MissingType => "missing_type",
            Self::UnknownFrame(_) => "unknown_frame",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ProtoError::MissingType.error_code(), "missing_type");
        assert_eq!(
            ProtoError::UnknownFrame("x".into()).error_code(),
            "unknown_frame"
        );
    }
}
