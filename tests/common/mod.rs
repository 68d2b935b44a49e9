//! Shared helpers for the integration tests: a scripted transport and
//! sample upstream payloads.

#![allow(dead_code)]

use async_trait::async_trait;
use fakestore_client::{ApiError, CancelHandle, ClientConfig, Fetch};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome of one scripted transport attempt.
pub enum Script {
    Ok(Value),
    /// Resolve successfully after a delay (leaves a cancellation window).
    OkAfter(Duration, Value),
    Err(ApiError),
    /// Never resolve; only cancellation can end the attempt.
    Hang,
}

/// Transport double that plays back a fixed script, one entry per attempt,
/// while observing cancellation exactly like the real transport does.
pub struct FakeTransport {
    scripts: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
    cancellations: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn scripted(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            calls: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        })
    }

    /// Number of attempts the pipeline made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of attempts that ended by observing cancellation.
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    /// Every URL fetched, in order.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for FakeTransport {
    async fn fetch(&self, url: &str, cancel: Option<&CancelHandle>) -> Result<Value, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        let script =
            self.scripts.lock().unwrap().pop_front().expect("transport script exhausted");

        let work = async move {
            match script {
                Script::Ok(value) => Ok(value),
                Script::OkAfter(delay, value) => {
                    tokio::time::sleep(delay).await;
                    Ok(value)
                }
                Script::Err(err) => Err(err),
                Script::Hang => futures::future::pending::<Result<Value, ApiError>>().await,
            }
        };

        match cancel {
            None => work.await,
            Some(handle) => {
                tokio::select! {
                    biased;
                    reason = handle.cancelled() => {
                        self.cancellations.fetch_add(1, Ordering::SeqCst);
                        Err(ApiError::cancelled(reason))
                    }
                    result = work => result,
                }
            }
        }
    }
}

/// Production defaults with retry delays shrunk so tests finish quickly.
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        ..ClientConfig::default()
    }
}

pub fn product_json(id: u64) -> Value {
    json!({
        "id": id,
        "title": format!("Product {id}"),
        "price": 9.99,
        "description": format!("Description for product {id}"),
        "category": "electronics",
        "image": format!("https://fakestoreapi.com/img/{id}.jpg"),
        "rating": { "rate": 4.1, "count": 37 }
    })
}

pub fn products_json(ids: &[u64]) -> Value {
    Value::Array(ids.iter().copied().map(product_json).collect())
}
