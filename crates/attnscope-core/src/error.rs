//! Error types for tensor decoding, projection and metadata.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = core::result::Result<T, CoreError>;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Layer bytes do not match the expected tensor size.
    #[error("corrupt layer data: expected {expected} bytes, got {actual}")]
    CorruptLayerData { expected: usize, actual: usize },

    /// Caller passed an out-of-range index.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// `meta.json` parsed but is internally inconsistent.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Palette name is not registered.
    #[error("unknown palette: {0}")]
    UnknownPalette(String),

    /// JSON decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a corrupt layer data error.
    pub fn corrupt(expected: usize, actual: usize) -> Self {
        CoreError::CorruptLayerData { expected, actual }
    }

    /// Create a precondition violation error.
    pub fn precondition(message: impl Into<String>) -> Self {
        CoreError::PreconditionViolation(message.into())
    }

    /// Create an invalid metadata error.
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        CoreError::InvalidMetadata(message.into())
    }

    /// Get error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::CorruptLayerData { .. } => "corrupt_layer_data",
            CoreError::PreconditionViolation(_) => "precondition_violation",
            CoreError::InvalidMetadata(_) => "invalid_metadata",
            CoreError::UnknownPalette(_) => "unknown_palette",
            CoreError::Json(_) => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_display() {
        let err = CoreError::corrupt(18, 17);
        let msg = err.to_string();
        assert!(msg.contains("18"));
        assert!(msg.contains("17"));
        assert_eq!(err.category(), "corrupt_layer_data");
    }

    #[test]
    fn test_precondition_display() {
        let err = CoreError::precondition("token 9 out of range");
        assert!(err.to_string().contains("token 9"));
    }
}
