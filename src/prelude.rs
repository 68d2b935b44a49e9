//! Convenient re-exports for common client types.
pub use crate::{
    backoff::{Backoff, BackoffError, Jitter},
    cancel::{CancelHandle, CancelReason, CancellationRegistry},
    client::FakeStoreClient,
    config::{ClientConfig, Context},
    error::{ApiError, ConfigError},
    model::{Product, Rating, SortOrder},
    retry::{RetryPolicy, RetryPolicyBuilder},
    transport::Fetch,
};
