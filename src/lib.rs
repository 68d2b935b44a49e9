#![forbid(unsafe_code)]

//! Resilient client for the FakeStore catalog API.
//!
//! Every outbound read goes through one pipeline built from three
//! cooperating pieces:
//!
//! - **Deduplication**: concurrent identical requests collapse into a
//!   single execution; all callers share the outcome.
//! - **Cancellation**: in interactive contexts, a new request for a key
//!   cancels the one already in flight, so stale responses can never
//!   overwrite fresh ones. Server-side clients skip this entirely.
//! - **Retry with backoff**: transient failures (network errors, 5xx,
//!   request timeout) are retried with exponentially growing, capped
//!   delays; cancellations and other client errors never are.
//!
//! ## Quick start
//!
//! ```no_run
//! use fakestore_client::{ClientConfig, FakeStoreClient, SortOrder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FakeStoreClient::new(ClientConfig::from_env()?)?;
//!
//!     let products = client.products_sorted(SortOrder::Ascending, Some(20)).await?;
//!     println!("fetched {} products", products.len());
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod cancel;
pub mod client;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod key;
pub mod model;
pub mod prelude;
pub mod retry;
pub mod sleeper;
pub mod transport;

// Re-exports
pub use backoff::{Backoff, BackoffError, Jitter};
pub use cancel::{CancelHandle, CancelReason, CancellationRegistry};
pub use client::FakeStoreClient;
pub use config::{ClientConfig, Context, DEFAULT_BASE_URL};
pub use dedupe::RequestDeduplicator;
pub use error::{ApiError, ConfigError};
pub use key::request_key;
pub use model::{Product, Rating, SortOrder};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use transport::{Fetch, HttpTransport};
