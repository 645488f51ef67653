//! Viewer error type

use attnscope_cache::CacheError;
use attnscope_core::CoreError;
use thiserror::Error;

/// Result type for viewer operations
pub type Result<T> = std::result::Result<T, ViewerError>;

/// Errors surfaced at the viewer boundary.
#[derive(Error, Debug)]
pub enum ViewerError {
    /// Decode, projection or metadata error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Fetch, cache or worker error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Requested dataset does not exist
    #[error("No dataset named '{0}'")]
    NoDataset(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ViewerError {
    /// Short error category for logs.
    pub fn category(&self) -> &'static str {
        match self {
            ViewerError::Core(e) => e.category(),
            ViewerError::Cache(_) => "cache",
            ViewerError::NoDataset(_) => "dataset",
            ViewerError::Config(_) => "config",
            ViewerError::Io(_) => "io",
        }
    }
}
