//! The composed read pipeline and the typed catalog operations.
//!
//! Every read follows the same path: build the target URL, derive the
//! request key, acquire a cancel handle (interactive clients only; a new
//! request for a key supersedes and cancels the one in flight), then hand
//! the deduplicator a producer that runs the retry policy around the
//! transport call and releases the handle on settlement. Server-side
//! clients skip cancellation entirely and get pure deduplication.

use crate::backoff::Backoff;
use crate::cancel::{CancelHandle, CancelReason, CancellationRegistry};
use crate::config::{ClientConfig, Context};
use crate::dedupe::RequestDeduplicator;
use crate::error::{ApiError, ConfigError};
use crate::key::request_key;
use crate::model::{Product, SortOrder};
use crate::retry::RetryPolicy;
use crate::transport::{Fetch, HttpTransport};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Resilient client for the FakeStore catalog API.
pub struct FakeStoreClient {
    transport: Arc<dyn Fetch>,
    dedupe: RequestDeduplicator<Value>,
    cancels: Option<Arc<CancellationRegistry>>,
    retry: RetryPolicy,
    base_url: Url,
}

impl fmt::Debug for FakeStoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeStoreClient")
            .field("base_url", &self.base_url.as_str())
            .field("cancellation", &self.cancels.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl FakeStoreClient {
    /// Build a client over the real HTTP transport.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(config.request_timeout)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build atop a caller-supplied transport. Tests inject scripted fakes
    /// through here.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Fetch>,
    ) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.base_url).map_err(|err| ConfigError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: err.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl {
                url: config.base_url.clone(),
                reason: "URL cannot serve as a base".to_string(),
            });
        }

        let backoff = Backoff::exponential(config.initial_delay)
            .with_multiplier(config.backoff_multiplier)?
            .with_max(config.max_delay)?;
        let retry = RetryPolicy::builder().max_retries(config.max_retries).backoff(backoff).build();

        Ok(Self {
            transport,
            dedupe: RequestDeduplicator::with_max_age(config.pending_max_age),
            cancels: match config.context {
                Context::Interactive => Some(Arc::new(CancellationRegistry::new())),
                Context::Server => None,
            },
            retry,
            base_url,
        })
    }

    /// List products (`GET /products`), optionally limited.
    pub async fn products(&self, limit: Option<u32>) -> Result<Vec<Product>, ApiError> {
        let mut params = Vec::new();
        if let Some(limit) = limit {
            params.push(("limit", json!(limit)));
        }
        self.read("/products", &params).await
    }

    /// Fetch a single product (`GET /products/{id}`).
    pub async fn product(&self, id: u64) -> Result<Product, ApiError> {
        self.read(&format!("/products/{id}"), &[]).await
    }

    /// List category names (`GET /products/categories`).
    pub async fn categories(&self) -> Result<Vec<String>, ApiError> {
        self.read("/products/categories", &[]).await
    }

    /// List products in one category (`GET /products/category/{name}`).
    pub async fn products_in_category(&self, category: &str) -> Result<Vec<Product>, ApiError> {
        self.read(&format!("/products/category/{category}"), &[]).await
    }

    /// List products sorted by id (`GET /products?sort=`), optionally
    /// limited.
    pub async fn products_sorted(
        &self,
        order: SortOrder,
        limit: Option<u32>,
    ) -> Result<Vec<Product>, ApiError> {
        let mut params = vec![("sort", json!(order.as_str()))];
        if let Some(limit) = limit {
            params.push(("limit", json!(limit)));
        }
        self.read("/products", &params).await
    }

    /// Search products by title, description, or category. The upstream has
    /// no search endpoint, so this fetches the full listing through the
    /// pipeline and filters locally.
    pub async fn search_products(&self, query: &str) -> Result<Vec<Product>, ApiError> {
        let products: Vec<Product> = self.read("/products", &[]).await?;
        let needle = query.to_lowercase();
        Ok(products
            .into_iter()
            .filter(|product| {
                product.title.to_lowercase().contains(&needle)
                    || product.description.to_lowercase().contains(&needle)
                    || product.category.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// Cancel every in-flight request. Interactive callers do this on
    /// navigation or teardown; for server clients it is a no-op.
    pub fn cancel_all(&self) {
        if let Some(registry) = &self.cancels {
            registry.cancel_all(CancelReason::Shutdown);
        }
    }

    /// Number of in-flight deduplicated requests (diagnostics).
    pub fn pending_requests(&self) -> usize {
        self.dedupe.len()
    }

    /// Number of live cancel handles (diagnostics; zero for server clients).
    pub fn live_cancel_handles(&self) -> usize {
        self.cancels.as_ref().map(|registry| registry.len()).unwrap_or(0)
    }

    async fn read<T>(&self, path: &str, params: &[(&str, Value)]) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let key = request_key(path, params);
        let url = self.build_url(path, params);

        // Interactive: take ownership of the key, cancelling whatever was in
        // flight under it. The evict keeps this call from joining the very
        // execution it just cancelled.
        let handle: Option<CancelHandle> = self.cancels.as_ref().map(|registry| {
            let handle = registry.acquire(&key);
            self.dedupe.evict(&key);
            handle
        });

        let value = {
            let transport = Arc::clone(&self.transport);
            let retry = self.retry.clone();
            let registry = self.cancels.clone();
            let producer_key = key.clone();
            self.dedupe
                .join(&key, move || async move {
                    let result =
                        retry.run(|| transport.fetch(&url, handle.as_ref())).await;
                    if let (Some(registry), Some(handle)) = (&registry, &handle) {
                        registry.release_handle(&producer_key, handle);
                    }
                    result
                })
                .await?
        };

        serde_json::from_value(value).map_err(|err| ApiError::decode(err.to_string()))
    }

    fn build_url(&self, path: &str, params: &[(&str, Value)]) -> String {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().expect("base URL validated at build");
            segments.pop_if_empty();
            for segment in path.split('/').filter(|segment| !segment.is_empty()) {
                segments.push(segment);
            }
        }
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in params {
                match value {
                    Value::String(text) => pairs.append_pair(name, text),
                    other => pairs.append_pair(name, &other.to_string()),
                };
            }
        }
        url.into()
    }
}
