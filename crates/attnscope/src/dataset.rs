//! Dataset discovery and opening

use crate::{Result, ViewerConfig, ViewerError};
use attnscope_cache::{CacheError, FsSource, HttpSource, LayerSource};
use attnscope_core::{DatasetMeta, META_FILE_NAME};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Identifier of the dataset stored directly in the data root.
pub const ROOT_DATASET: &str = ".";

/// List datasets under `root`.
///
/// `"."` comes first when `root` itself holds a `meta.json`, followed by the
/// sorted names of direct subdirectories that hold one.
pub fn discover_datasets(root: impl AsRef<Path>) -> Result<Vec<String>> {
    let root = root.as_ref();
    let mut found = Vec::new();

    if root.join(META_FILE_NAME).is_file() {
        found.push(ROOT_DATASET.to_string());
    }

    let mut subdirs = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if entry.path().join(META_FILE_NAME).is_file() {
            if let Some(name) = entry.file_name().to_str() {
                subdirs.push(name.to_string());
            }
        }
    }
    subdirs.sort();
    found.extend(subdirs);

    debug!("Discovered {} datasets under {}", found.len(), root.display());
    Ok(found)
}

/// An opened dataset: validated metadata plus the source its layers come from.
#[derive(Clone)]
pub struct Dataset {
    id: String,
    meta: Arc<DatasetMeta>,
    source: Arc<dyn LayerSource>,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("id", &self.id)
            .field("source", &self.source.describe())
            .field("model", &self.meta.model)
            .finish()
    }
}

impl Dataset {
    /// Open dataset `id` from the configured HTTP base URL or data root.
    pub async fn open(config: &ViewerConfig, id: &str) -> Result<Self> {
        let source: Arc<dyn LayerSource> = match &config.base_url {
            Some(url) => Arc::new(HttpSource::for_dataset(url, id, config.http.clone())?),
            None => Arc::new(FsSource::for_dataset(&config.data_root, id)),
        };
        Self::from_source(id, source).await
    }

    /// Open a dataset from an explicit source.
    pub async fn from_source(id: &str, source: Arc<dyn LayerSource>) -> Result<Self> {
        let bytes = source.fetch_meta().await.map_err(|e| match e {
            CacheError::NotFound(_) => ViewerError::NoDataset(id.to_string()),
            other => other.into(),
        })?;
        let meta = DatasetMeta::from_slice(&bytes)?;

        info!(
            "Opened dataset '{}' from {}: {} layers, {} heads, seq_len {}",
            id,
            source.describe(),
            meta.num_layers,
            meta.num_heads,
            meta.seq_len
        );

        Ok(Self {
            id: id.to_string(),
            meta: Arc::new(meta),
            source,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub(crate) fn meta_arc(&self) -> Arc<DatasetMeta> {
        Arc::clone(&self.meta)
    }

    pub fn source(&self) -> Arc<dyn LayerSource> {
        Arc::clone(&self.source)
    }
}
