//! # attnscope
//!
//! Attention viewer for vision-language models: opens extracted datasets,
//! keeps a small cache of decoded layers, and turns a selected token into a
//! colored per-token strip plus an image-grid heatmap.
//!
//! ## Quick Start
//!
//! ```ignore
//! use attnscope::{Dataset, ViewSession, ViewerConfig};
//!
//! let config = ViewerConfig::default().with_data_root("data");
//! let dataset = Dataset::open(&config, "sample1").await?;
//! let mut session = ViewSession::new(dataset, config.cache.clone(), &config.defaults)?;
//!
//! session.select_token(Some(42))?;
//! session.show_layer(12).await?;
//! if let Some(frame) = session.render()? {
//!     println!("{:?}", frame.top_k(5));
//! }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod overlay;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ViewDefaults, ViewerConfig};
pub use dataset::{discover_datasets, Dataset, ROOT_DATASET};
pub use error::{Result, ViewerError};
pub use overlay::GridOverlay;
pub use session::{Frame, LayerReady, ViewSession, ViewState};

/// Prelude for common imports
pub mod prelude {
    pub use super::{Dataset, Frame, Result, ViewSession, ViewerConfig, ViewerError};
    pub use attnscope_core::{AggMode, Direction, HeadSelection, Palette};
}
