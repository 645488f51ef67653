//! Background fetch-and-decode worker
//!
//! Requests arrive on a bounded channel and each one is answered on its own
//! oneshot. Decoding runs on the blocking pool so the async executor is never
//! stalled by a large layer.

use crate::{CacheConfig, CacheError, LayerSource, Result};
use attnscope_core::{LayerDecoder, LayerTensor, TensorShape};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

/// A single load request.
#[derive(Debug)]
pub struct LoadLayer {
    pub layer: usize,
    pub reply: oneshot::Sender<Result<LayerTensor>>,
}

/// Handle to a running decode worker.
#[derive(Debug, Clone)]
pub struct DecodeWorker {
    tx: mpsc::Sender<LoadLayer>,
}

impl DecodeWorker {
    /// Start a worker on the current tokio runtime.
    pub fn spawn(source: Arc<dyn LayerSource>, shape: TensorShape, config: &CacheConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.worker_queue_depth.max(1));
        let decoder = LayerDecoder::new(config.parallel_decode_min_elements);

        info!(
            "Decode worker started for {} ({} heads, seq_len {})",
            source.describe(),
            shape.num_heads,
            shape.seq_len
        );
        tokio::spawn(Self::run(rx, source, shape, decoder));

        Self { tx }
    }

    async fn run(
        mut rx: mpsc::Receiver<LoadLayer>,
        source: Arc<dyn LayerSource>,
        shape: TensorShape,
        decoder: LayerDecoder,
    ) {
        while let Some(job) = rx.recv().await {
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                let result = load(source.as_ref(), job.layer, shape, decoder).await;
                if job.reply.send(result).is_err() {
                    trace!("Requester for layer {} went away", job.layer);
                }
            });
        }
        debug!("Decode worker channel closed");
    }

    /// Fetch and decode one layer.
    pub async fn load(&self, layer: usize) -> Result<LayerTensor> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LoadLayer { layer, reply })
            .await
            .map_err(|_| CacheError::Worker("request channel closed".into()))?;
        rx.await
            .map_err(|_| CacheError::Worker(format!("no reply for layer {layer}")))?
    }
}

async fn load(
    source: &dyn LayerSource,
    layer: usize,
    shape: TensorShape,
    decoder: LayerDecoder,
) -> Result<LayerTensor> {
    let start = Instant::now();
    let bytes = source
        .fetch_layer(layer)
        .await
        .map_err(|e| CacheError::fetch(layer, e))?;

    let expected = shape.byte_len();
    if bytes.len() != expected {
        return Err(CacheError::CorruptLayerData {
            layer,
            expected,
            actual: bytes.len(),
        });
    }

    let tensor = tokio::task::spawn_blocking(move || decoder.decode(layer, shape, &bytes))
        .await
        .map_err(|e| CacheError::Worker(e.to_string()))?
        .map_err(|e| CacheError::from_core(layer, e))?;

    debug!(
        "Layer {} ready: {} bytes in {:?}",
        layer,
        tensor.memory_bytes(),
        start.elapsed()
    );
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use attnscope_core::encode_f16_le;
    use bytes::Bytes;

    struct FixedSource {
        shape: TensorShape,
    }

    #[async_trait]
    impl LayerSource for FixedSource {
        async fn fetch_layer(&self, layer: usize) -> Result<Bytes> {
            match layer {
                0 => {
                    let values: Vec<f32> = (0..self.shape.element_count()).map(|i| i as f32).collect();
                    Ok(Bytes::from(encode_f16_le(&values)))
                }
                1 => Ok(Bytes::from_static(&[0u8; 3])),
                _ => Err(CacheError::NotFound(format!("layer {layer}"))),
            }
        }

        async fn fetch_meta(&self) -> Result<Bytes> {
            Ok(Bytes::from_static(b"{}"))
        }

        fn describe(&self) -> String {
            "fixed".into()
        }
    }

    fn worker() -> DecodeWorker {
        let shape = TensorShape::new(2, 3);
        DecodeWorker::spawn(Arc::new(FixedSource { shape }), shape, &CacheConfig::default())
    }

    #[tokio::test]
    async fn test_load_decodes_layer() {
        let tensor = worker().load(0).await.unwrap();
        assert_eq!(tensor.layer(), 0);
        assert_eq!(tensor.num_heads(), 2);
        assert_eq!(tensor.at(1, 2, 2), 17.0);
    }

    #[tokio::test]
    async fn test_load_rejects_short_buffer() {
        let err = worker().load(1).await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::CorruptLayerData {
                layer: 1,
                expected: 36,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_load_wraps_fetch_failure() {
        let err = worker().load(5).await.unwrap_err();
        assert!(err.is_fetch_failure());
        assert!(err.to_string().contains("layer 5"));
    }
}
