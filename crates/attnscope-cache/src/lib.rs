//! # attnscope cache
//!
//! Asynchronous loading of decoded attention layers.
//!
//! ```text
//! LayerCache::load_layer(n)
//!     ├─ resident?   → return shared tensor, mark most recently used
//!     ├─ in flight?  → await the same load
//!     └─ otherwise   → DecodeWorker ─ LayerSource::fetch_layer ─ LayerDecoder
//!                            │
//!                            └─ insert, evicting the least recently used layer
//! ```
//!
//! Sources are pluggable through [`LayerSource`]: [`FsSource`] reads a
//! dataset directory and [`HttpSource`] fetches from a static file server
//! with retry and backoff.

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod source;
pub mod worker;

pub use cache::{CacheStats, LayerCache};
pub use config::{CacheConfig, HttpConfig, RetryConfig, DEFAULT_CAPACITY};
pub use error::{CacheError, Result};
pub use http::HttpSource;
pub use source::{FsSource, LayerSource};
pub use worker::{DecodeWorker, LoadLayer};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        CacheConfig, CacheError, FsSource, HttpSource, LayerCache, LayerSource, Result,
    };
}
