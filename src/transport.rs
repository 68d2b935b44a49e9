//! HTTP execution for the pipeline.
//!
//! [`Fetch`] is the seam between the reliability layers and actual I/O: the
//! retrier calls it once per attempt, and tests script it with fakes. The
//! production implementation is a thin reqwest wrapper with a fixed
//! per-attempt timeout and cooperative cancellation: the attempt races the
//! cancel handle's signal, and losing the race drops the request future,
//! which aborts the underlying connection.

use crate::cancel::CancelHandle;
use crate::error::{ApiError, ConfigError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// One GET attempt against the upstream.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch `url` and decode the JSON body, observing `cancel`
    /// cooperatively when present.
    async fn fetch(&self, url: &str, cancel: Option<&CancelHandle>) -> Result<Value, ApiError>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ConfigError::HttpClient { source })?;
        Ok(Self { client, timeout })
    }

    async fn attempt(&self, url: &str) -> Result<Value, ApiError> {
        let started = Instant::now();
        debug!(url, "GET");

        let response =
            self.client.get(url).send().await.map_err(|err| self.classify(err, started))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), body });
        }

        response.json::<Value>().await.map_err(|err| {
            if err.is_timeout() {
                ApiError::Timeout { elapsed: started.elapsed(), limit: self.timeout }
            } else if err.is_decode() {
                ApiError::decode(err.to_string())
            } else {
                ApiError::network_caused_by("failed reading response body", err)
            }
        })
    }

    fn classify(&self, err: reqwest::Error, started: Instant) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout { elapsed: started.elapsed(), limit: self.timeout }
        } else {
            ApiError::network_caused_by(err.to_string(), err)
        }
    }
}

#[async_trait]
impl Fetch for HttpTransport {
    async fn fetch(&self, url: &str, cancel: Option<&CancelHandle>) -> Result<Value, ApiError> {
        match cancel {
            None => self.attempt(url).await,
            Some(handle) => {
                // Biased so an already-cancelled handle wins without the
                // attempt ever being polled.
                tokio::select! {
                    biased;
                    reason = handle.cancelled() => Err(ApiError::cancelled(reason)),
                    result = self.attempt(url) => result,
                }
            }
        }
    }
}
