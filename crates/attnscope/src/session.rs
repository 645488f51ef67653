//! Interactive view session
//!
//! A [`ViewSession`] owns the current view settings and the tensor being
//! displayed. Layer loads complete asynchronously and come back as
//! [`LayerReady`] events; a result is installed only if its layer is still
//! the one the user asked for, so fast scrubbing never shows an older layer
//! on top of a newer request.

use crate::{Dataset, GridOverlay, Result, ViewDefaults, ViewerError};
use attnscope_cache::{CacheConfig, CacheError, LayerCache};
use attnscope_core::{
    normalize_and_map, project, AggMode, CoreError, DatasetMeta, Direction, HeadSelection,
    LayerTensor, Palette,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Current view settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    layer: usize,
    head: HeadSelection,
    agg: AggMode,
    direction: Direction,
    palette: Palette,
    opacity: f32,
    selected: Option<usize>,
}

impl ViewState {
    /// Layer 0, nothing selected, everything else from `defaults`.
    pub fn new(defaults: &ViewDefaults) -> Self {
        Self {
            layer: 0,
            head: defaults.head,
            agg: defaults.agg,
            direction: defaults.direction,
            palette: defaults.palette,
            opacity: clamp_opacity(defaults.opacity),
            selected: None,
        }
    }

    /// Layer the user most recently asked for.
    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn head(&self) -> HeadSelection {
        self.head
    }

    pub fn agg(&self) -> AggMode {
        self.agg
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }
}

fn clamp_opacity(opacity: f32) -> f32 {
    if opacity.is_nan() {
        0.0
    } else {
        opacity.clamp(0.0, 1.0)
    }
}

/// Outcome of a layer load started by [`ViewSession::request_layer`].
#[derive(Debug, Clone)]
pub struct LayerReady {
    pub layer: usize,
    pub result: std::result::Result<LayerTensor, CacheError>,
}

/// Everything needed to draw one view.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub layer: usize,
    pub selected: usize,
    /// Projected attention, one weight per token
    pub vector: Vec<f32>,
    /// Packed RGBA per token, normalized over the whole vector
    pub token_rgba: Vec<u8>,
    /// Image-grid heatmap, if the dataset has an image
    pub overlay: Option<GridOverlay>,
}

impl Frame {
    /// Color of token `index`.
    pub fn token_color(&self, index: usize) -> Option<[u8; 4]> {
        let px = self.token_rgba.get(index * 4..index * 4 + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// The `k` highest-weighted tokens, strongest first. NaN weights are skipped.
    pub fn top_k(&self, k: usize) -> Vec<(usize, f32)> {
        let mut ranked: Vec<(usize, f32)> = self
            .vector
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }
}

/// View state, layer cache and the tensor currently on screen.
pub struct ViewSession {
    dataset: Dataset,
    meta: Arc<DatasetMeta>,
    cache: LayerCache,
    state: ViewState,
    tensor: Option<LayerTensor>,
    events_tx: mpsc::UnboundedSender<LayerReady>,
    events_rx: mpsc::UnboundedReceiver<LayerReady>,
}

impl std::fmt::Debug for ViewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewSession")
            .field("dataset", &self.dataset.id())
            .field("state", &self.state)
            .field("installed", &self.installed_layer())
            .finish()
    }
}

impl ViewSession {
    /// Start a session over `dataset`. Must be called within a tokio runtime.
    ///
    /// A default head outside the dataset's head count is rejected, as with
    /// [`ViewSession::set_head`].
    pub fn new(dataset: Dataset, cache: CacheConfig, defaults: &ViewDefaults) -> Result<Self> {
        let meta = dataset.meta_arc();
        if let HeadSelection::Single(h) = defaults.head {
            if h >= meta.num_heads {
                return Err(CoreError::precondition(format!(
                    "default head {h} out of range for {} heads",
                    meta.num_heads
                ))
                .into());
            }
        }
        let cache = LayerCache::new(dataset.source(), meta.shape(), cache)?;
        let state = ViewState::new(defaults);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            dataset,
            meta,
            cache,
            state,
            tensor: None,
            events_tx,
            events_rx,
        })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn cache(&self) -> &LayerCache {
        &self.cache
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Layer of the installed tensor, if any.
    pub fn installed_layer(&self) -> Option<usize> {
        self.tensor.as_ref().map(LayerTensor::layer)
    }

    /// Make `layer` the desired layer and start loading it.
    ///
    /// The outcome arrives through [`next_event`](Self::next_event). The
    /// neighbouring layers are prefetched.
    pub fn request_layer(&mut self, layer: usize) -> Result<()> {
        self.meta.check_layer(layer)?;
        self.state.layer = layer;
        debug!("Requesting layer {}", layer);

        let cache = self.cache.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = cache.load_layer(layer).await;
            // The receiver lives as long as the session.
            let _ = events.send(LayerReady { layer, result });
        });

        self.cache.prefetch(layer, self.meta.num_layers);
        Ok(())
    }

    /// Wait for the next finished load.
    pub async fn next_event(&mut self) -> Option<LayerReady> {
        self.events_rx.recv().await
    }

    /// Install a finished load if it is still wanted.
    ///
    /// Returns `Ok(true)` when the tensor was installed and `Ok(false)` when
    /// the result belonged to a layer the user has since moved away from.
    /// A failure for the desired layer is returned as an error.
    pub fn apply(&mut self, ready: LayerReady) -> Result<bool> {
        if ready.layer != self.state.layer {
            debug!(
                "Discarding stale layer {} (want {})",
                ready.layer, self.state.layer
            );
            return Ok(false);
        }

        let tensor = ready.result?;
        self.tensor = Some(tensor);
        Ok(true)
    }

    /// Request `layer` and wait until it is installed or fails.
    pub async fn show_layer(&mut self, layer: usize) -> Result<()> {
        self.request_layer(layer)?;
        while let Some(ready) = self.next_event().await {
            if self.apply(ready)? {
                info!("Showing layer {}", layer);
                return Ok(());
            }
        }
        Err(ViewerError::Cache(CacheError::Worker(
            "event channel closed".into(),
        )))
    }

    /// Select a head, or `HeadSelection::Aggregated` for all heads.
    pub fn set_head(&mut self, head: HeadSelection) -> Result<()> {
        if let HeadSelection::Single(h) = head {
            if h >= self.meta.num_heads {
                return Err(CoreError::precondition(format!(
                    "head {h} out of range for {} heads",
                    self.meta.num_heads
                ))
                .into());
            }
        }
        self.state.head = head;
        Ok(())
    }

    pub fn set_agg(&mut self, agg: AggMode) {
        self.state.agg = agg;
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.state.direction = direction;
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.state.palette = palette;
    }

    /// Set overlay opacity, clamped to `[0, 1]`.
    pub fn set_opacity(&mut self, opacity: f32) {
        self.state.opacity = clamp_opacity(opacity);
    }

    /// Select a token, or clear the selection with `None`.
    pub fn select_token(&mut self, token: Option<usize>) -> Result<()> {
        if let Some(t) = token {
            self.meta.check_token(t)?;
        }
        self.state.selected = token;
        Ok(())
    }

    /// Build the frame for the current state.
    ///
    /// `None` when no token is selected or the desired layer is not
    /// installed yet.
    pub fn render(&self) -> Result<Option<Frame>> {
        let Some(selected) = self.state.selected else {
            return Ok(None);
        };
        let Some(tensor) = self
            .tensor
            .as_ref()
            .filter(|t| t.layer() == self.state.layer)
        else {
            return Ok(None);
        };

        let vector = project(
            tensor,
            selected,
            self.state.direction,
            self.state.head,
            self.state.agg,
        )?;
        let lut = self.state.palette.lut();
        let token_rgba = normalize_and_map(&vector, lut, self.state.opacity);
        let overlay = GridOverlay::build(&vector, &self.meta, lut, self.state.opacity)?;

        Ok(Some(Frame {
            layer: tensor.layer(),
            selected,
            vector,
            token_rgba,
            overlay,
        }))
    }
}
