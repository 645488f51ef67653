//! Error types for layer loading

use attnscope_core::CoreError;
use thiserror::Error;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur while fetching, decoding or caching a layer.
///
/// `Clone` so a single failed load can be handed to every caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Retrieving a layer resource failed
    #[error("failed to fetch layer {layer}: {source}")]
    Fetch {
        layer: usize,
        #[source]
        source: Box<CacheError>,
    },

    /// Layer bytes do not match the expected tensor size
    #[error("corrupt data for layer {layer}: expected {expected} bytes, got {actual}")]
    CorruptLayerData {
        layer: usize,
        expected: usize,
        actual: usize,
    },

    /// HTTP request failed
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Network connection failed
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Request timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Resource missing on disk or server
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// All retries exhausted
    #[error("All retries exhausted: {0}")]
    RetriesExhausted(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Decode worker is gone or dropped a reply
    #[error("Decode worker unavailable: {0}")]
    Worker(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Metadata or decode failure from the core crate
    #[error("{0}")]
    Core(String),
}

impl CacheError {
    /// Wrap a source error with the layer it was fetching.
    pub fn fetch(layer: usize, source: CacheError) -> Self {
        CacheError::Fetch {
            layer,
            source: Box::new(source),
        }
    }

    /// Attach a layer index to a core decode error.
    pub fn from_core(layer: usize, error: CoreError) -> Self {
        match error {
            CoreError::CorruptLayerData { expected, actual } => CacheError::CorruptLayerData {
                layer,
                expected,
                actual,
            },
            other => CacheError::Core(other.to_string()),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            CacheError::Fetch { source, .. } => source.is_retryable(),
            CacheError::Connection(_) => true,
            CacheError::Timeout(_) => true,
            CacheError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Whether this is a failure to retrieve bytes (as opposed to bad bytes).
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, CacheError::Fetch { .. })
    }

    /// Whether the bytes arrived but did not fit the layer shape.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, CacheError::CorruptLayerData { .. })
    }
}

/// Timeouts are mapped by `HttpSource`, which knows the configured limit.
impl From<reqwest::Error> for CacheError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            CacheError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            CacheError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            CacheError::Connection(e.to_string())
        }
    }
}

impl From<CoreError> for CacheError {
    fn from(e: CoreError) -> Self {
        CacheError::Core(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CacheError::Timeout(100).is_retryable());
        assert!(CacheError::Http {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!CacheError::Http {
            status: 404,
            message: String::new()
        }
        .is_retryable());
        assert!(!CacheError::NotFound("x".into()).is_retryable());
        assert!(CacheError::fetch(2, CacheError::Connection("reset".into())).is_retryable());
    }

    #[test]
    fn test_fetch_display_includes_layer() {
        let err = CacheError::fetch(7, CacheError::NotFound("attn_layer_07.bin".into()));
        let msg = err.to_string();
        assert!(msg.contains("layer 7"));
        assert!(msg.contains("attn_layer_07.bin"));
        assert!(err.is_fetch_failure());
    }

    #[test]
    fn test_core_corrupt_keeps_layer() {
        let err = CacheError::from_core(3, CoreError::corrupt(18, 16));
        assert!(err.is_corrupt());
        assert!(err.to_string().contains("layer 3"));
    }
}
