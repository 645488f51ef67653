//! Bounded least-recently-used cache of decoded layers
//!
//! At most `capacity` layers are resident. Concurrent requests for a layer
//! that is still loading share one in-flight load. A failed load is dropped
//! from the in-flight table and cached nowhere, so the next request retries.

use crate::{CacheConfig, CacheError, DecodeWorker, LayerSource, Result};
use attnscope_core::{LayerTensor, TensorShape};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

type PendingLoad = Shared<BoxFuture<'static, Result<LayerTensor>>>;

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served from resident layers
    pub hits: u64,
    /// Requests that started a new load
    pub misses: u64,
    /// Requests that joined an in-flight load
    pub joined: u64,
    /// Layers evicted to make room
    pub evictions: u64,
    /// Loads that ended in an error
    pub failures: u64,
    /// Layers currently resident
    pub resident: usize,
}

impl CacheStats {
    /// Fraction of requests answered without starting a load.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.joined;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.joined) as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    layer: usize,
    tensor: LayerTensor,
    last_access: u64,
}

#[derive(Default)]
struct CacheState {
    /// Resident layers in insertion order.
    resident: Vec<CacheEntry>,
    pending: HashMap<usize, PendingLoad>,
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn insert(&mut self, tensor: LayerTensor, capacity: usize) -> Vec<usize> {
        let layer = tensor.layer();
        let last_access = self.tick();

        if let Some(entry) = self.resident.iter_mut().find(|e| e.layer == layer) {
            entry.tensor = tensor;
            entry.last_access = last_access;
            return Vec::new();
        }

        let mut evicted = Vec::new();
        while self.resident.len() >= capacity {
            // Ties go to the earliest entry.
            let mut oldest = 0;
            for (i, entry) in self.resident.iter().enumerate() {
                if entry.last_access < self.resident[oldest].last_access {
                    oldest = i;
                }
            }
            evicted.push(self.resident.remove(oldest).layer);
        }

        self.resident.push(CacheEntry {
            layer,
            tensor,
            last_access,
        });
        evicted
    }
}

struct Inner {
    config: CacheConfig,
    worker: DecodeWorker,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    joined: AtomicU64,
    evictions: AtomicU64,
    failures: AtomicU64,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, layer: usize, result: &Result<LayerTensor>) {
        let mut state = self.state();
        state.pending.remove(&layer);

        match result {
            Ok(tensor) => {
                let evicted = state.insert(tensor.clone(), self.config.capacity);
                drop(state);
                for old in &evicted {
                    debug!("Evicted layer {}", old);
                }
                self.evictions
                    .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                drop(state);
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Layer {} failed to load: {}", layer, e);
            }
        }
    }
}

/// Await a load task. A task that panicked or was cancelled never reached
/// `complete`, so its pending entry is dropped here to let the layer be retried.
async fn settle(
    inner: Arc<Inner>,
    layer: usize,
    handle: JoinHandle<Result<LayerTensor>>,
) -> Result<LayerTensor> {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            inner.state().pending.remove(&layer);
            inner.failures.fetch_add(1, Ordering::Relaxed);
            warn!("Load task for layer {} ended abnormally: {}", layer, e);
            Err(CacheError::Worker(e.to_string()))
        }
    }
}

/// Shared handle to a layer cache. Cloning is cheap and every clone sees the
/// same resident set.
#[derive(Clone)]
pub struct LayerCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LayerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerCache")
            .field("capacity", &self.inner.config.capacity)
            .field("resident", &self.resident_layers())
            .finish()
    }
}

impl LayerCache {
    /// Create a cache over `source`, spawning its decode worker on the
    /// current tokio runtime.
    pub fn new(
        source: Arc<dyn LayerSource>,
        shape: TensorShape,
        config: CacheConfig,
    ) -> Result<Self> {
        if config.capacity == 0 {
            return Err(CacheError::Configuration(
                "cache capacity must be at least 1".into(),
            ));
        }

        info!(
            "Layer cache over {} (capacity {})",
            source.describe(),
            config.capacity
        );
        let worker = DecodeWorker::spawn(source, shape, &config);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                worker,
                state: Mutex::new(CacheState::default()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                joined: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    /// Get a decoded layer, loading it if needed.
    ///
    /// A resident layer is returned immediately and marked most recently
    /// used. A layer already loading is awaited rather than fetched twice.
    pub async fn load_layer(&self, layer: usize) -> Result<LayerTensor> {
        let pending = {
            let mut state = self.inner.state();
            let now = state.tick();

            if let Some(entry) = state.resident.iter_mut().find(|e| e.layer == layer) {
                entry.last_access = now;
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                trace!("Cache hit: layer {}", layer);
                return Ok(entry.tensor.clone());
            }

            if let Some(pending) = state.pending.get(&layer).cloned() {
                self.inner.joined.fetch_add(1, Ordering::Relaxed);
                trace!("Joining in-flight load: layer {}", layer);
                pending
            } else {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache miss: layer {}", layer);
                let pending = self.start_load(layer);
                state.pending.insert(layer, pending.clone());
                pending
            }
        };

        pending.await
    }

    fn start_load(&self, layer: usize) -> PendingLoad {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let result = inner.worker.load(layer).await;
            inner.complete(layer, &result);
            result
        });

        settle(Arc::clone(&self.inner), layer, handle).boxed().shared()
    }

    /// Warm the neighbours of `current` in the background.
    ///
    /// Loads `current - 1` and `current + 1` when they fall within
    /// `0..total_layers`. Failures are logged and otherwise ignored.
    pub fn prefetch(&self, current: usize, total_layers: usize) {
        let neighbours = [current.checked_sub(1), current.checked_add(1)];
        for layer in neighbours.into_iter().flatten() {
            if layer >= total_layers {
                continue;
            }
            let cache = self.clone();
            tokio::spawn(async move {
                if let Err(e) = cache.load_layer(layer).await {
                    debug!("Prefetch of layer {} failed: {}", layer, e);
                }
            });
        }
    }

    /// Whether `layer` is decoded and resident.
    pub fn is_resident(&self, layer: usize) -> bool {
        self.inner.state().resident.iter().any(|e| e.layer == layer)
    }

    /// Whether a load for `layer` is in flight.
    pub fn is_pending(&self, layer: usize) -> bool {
        self.inner.state().pending.contains_key(&layer)
    }

    /// Resident layer indices, in insertion order.
    pub fn resident_layers(&self) -> Vec<usize> {
        self.inner.state().resident.iter().map(|e| e.layer).collect()
    }

    /// Drop every resident layer. In-flight loads are left running.
    pub fn clear(&self) {
        let mut state = self.inner.state();
        let dropped = state.resident.len();
        state.resident.clear();
        debug!("Cleared {} resident layers", dropped);
    }

    pub fn stats(&self) -> CacheStats {
        let resident = self.inner.state().resident.len();
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            joined: self.inner.joined.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
            resident,
        }
    }
}
