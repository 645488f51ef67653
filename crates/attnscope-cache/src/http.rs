//! HTTP layer source for datasets served over the network

use crate::{CacheError, HttpConfig, LayerSource, Result};
use async_trait::async_trait;
use attnscope_core::{layer_file_name, META_FILE_NAME};
use bytes::Bytes;
use reqwest::{header, Client, Response, StatusCode};
use tracing::{debug, warn};

/// Dataset served under a base URL (`<base>/attn_layer_NN.bin`, `<base>/meta.json`).
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: String,
    config: HttpConfig,
}

impl HttpSource {
    /// Create a source rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, config: HttpConfig) -> Result<Self> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CacheError::InvalidUrl(base_url));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| CacheError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        })
    }

    /// Source for dataset `id` under a server root (`"."` is the root itself).
    pub fn for_dataset(root_url: &str, id: &str, config: HttpConfig) -> Result<Self> {
        if id == "." {
            Self::new(root_url, config)
        } else {
            Self::new(
                format!("{}/{}", root_url.trim_end_matches('/'), id.trim_matches('/')),
                config,
            )
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of a resource under the base.
    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.trim_start_matches('/'))
    }

    async fn fetch(&self, name: &str) -> Result<Bytes> {
        let url = self.url_for(name);
        debug!("Fetching: {}", url);
        self.fetch_with_retry(&url).await
    }

    /// Fetch with exponential backoff on retryable errors
    async fn fetch_with_retry(&self, url: &str) -> Result<Bytes> {
        let retry = &self.config.retry;
        let mut last_error = CacheError::Connection("No attempts made".into());

        for attempt in 0..=retry.max_retries {
            if attempt > 0 {
                let backoff = retry.backoff(attempt);
                debug!("Retry attempt {} after {:?}", attempt, backoff);
                tokio::time::sleep(backoff).await;
            }

            match self.fetch_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!("Request failed (attempt {}): {}", attempt + 1, e);
                    last_error = e;
                }
            }
        }

        if retry.max_retries == 0 {
            return Err(last_error);
        }
        Err(CacheError::RetriesExhausted(last_error.to_string()))
    }

    async fn fetch_once(&self, url: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/octet-stream, application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.handle_response(url, response).await
    }

    /// Timeouts report the configured limit rather than a fixed one.
    fn transport_error(&self, e: reqwest::Error) -> CacheError {
        if e.is_timeout() {
            CacheError::Timeout(self.config.timeout_ms)
        } else {
            e.into()
        }
    }

    async fn handle_response(&self, url: &str, response: Response) -> Result<Bytes> {
        match response.status() {
            StatusCode::OK => response.bytes().await.map_err(|e| self.transport_error(e)),
            StatusCode::NOT_FOUND => Err(CacheError::NotFound(url.to_string())),
            status => Err(CacheError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl LayerSource for HttpSource {
    async fn fetch_layer(&self, layer: usize) -> Result<Bytes> {
        self.fetch(&layer_file_name(layer)).await
    }

    async fn fetch_meta(&self) -> Result<Bytes> {
        self.fetch(META_FILE_NAME).await
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
