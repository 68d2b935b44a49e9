//! Error taxonomy for the request pipeline.
//!
//! Four classes matter to callers:
//! - cancellation: the request was deliberately abandoned; never retried,
//!   never wrapped, so "abandoned" stays distinguishable from "failed";
//! - network-class failures (no response, per-attempt timeout): retryable,
//!   wrapped with an attempt count once the retry budget is spent;
//! - server errors (5xx) and request timeout (408): retryable, propagated
//!   unchanged after exhaustion;
//! - everything else (other 4xx, undecodable bodies): permanent, propagated
//!   immediately.
//!
//! Errors are `Clone` (sources are `Arc`-wrapped) because a deduplicated
//! request hands the same outcome to every joined caller.

use crate::cancel::CancelReason;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure of a catalog API call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The request was deliberately abandoned.
    #[error("request cancelled: {reason}")]
    Cancelled {
        reason: CancelReason,
    },

    /// No response reached us at all (DNS, connection, broken transport).
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    /// A single attempt ran past the transport timeout.
    #[error("request timed out after {elapsed:?} (limit {limit:?})")]
    Timeout {
        elapsed: Duration,
        limit: Duration,
    },

    /// The upstream answered with a non-success status.
    #[error("upstream returned HTTP {status}")]
    Status {
        status: u16,
        body: String,
    },

    /// Terminal wrapper for network-class failures once the retry budget is
    /// spent. Carries the attempt count and the last underlying error.
    #[error("network error after {attempts} attempts; check your connection and try again")]
    NetworkExhausted {
        attempts: usize,
        #[source]
        source: Arc<ApiError>,
    },

    /// The response body did not match the expected shape.
    #[error("could not decode response body: {message}")]
    Decode {
        message: String,
    },
}

impl ApiError {
    pub fn cancelled(reason: CancelReason) -> Self {
        ApiError::Cancelled { reason }
    }

    pub fn network(message: impl Into<String>) -> Self {
        ApiError::Network { message: message.into(), source: None }
    }

    pub fn network_caused_by<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let source: Arc<dyn std::error::Error + Send + Sync> = Arc::new(source);
        ApiError::Network { message: message.into(), source: Some(source) }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        ApiError::Decode { message: message.into() }
    }

    /// Wrap a network-class failure after `attempts` tries.
    pub fn exhausted(attempts: usize, last: ApiError) -> Self {
        ApiError::NetworkExhausted { attempts, source: Arc::new(last) }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled { .. })
    }

    /// "No response received" failures: raw network errors and per-attempt
    /// timeouts. These get the attempt-counting wrapper on exhaustion.
    pub fn is_network_class(&self) -> bool {
        matches!(self, ApiError::Network { .. } | ApiError::Timeout { .. })
    }

    /// Default retryability classification: network-class failures plus
    /// server errors (5xx) and request timeout (408). Cancellations and all
    /// other statuses are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network { .. } | ApiError::Timeout { .. } => true,
            ApiError::Status { status, .. } => (500..600).contains(status) || *status == 408,
            ApiError::Cancelled { .. }
            | ApiError::NetworkExhausted { .. }
            | ApiError::Decode { .. } => false,
        }
    }

    /// HTTP status, when the upstream produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The cancellation reason, when this is a cancellation.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            ApiError::Cancelled { reason } => Some(*reason),
            _ => None,
        }
    }
}

/// Invalid configuration supplied at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl {
        url: String,
        reason: String,
    },

    #[error("invalid retry configuration")]
    Retry {
        #[from]
        source: crate::backoff::BackoffError,
    },

    #[error("could not construct HTTP client")]
    HttpClient {
        #[source]
        source: reqwest::Error,
    },
}
