//! Bounded retry with exponential backoff.
//!
//! Semantics:
//! - `max_retries` counts retries beyond the initial attempt, so a policy
//!   with `max_retries = 3` makes at most 4 attempts.
//! - Cancellations short-circuit: they are returned unchanged on first sight,
//!   whatever the remaining budget.
//! - The retryability predicate decides whether a failure is worth another
//!   attempt; the default is [`ApiError::is_retryable`].
//! - On final failure, network-class errors are wrapped in
//!   [`ApiError::NetworkExhausted`] with the attempt count; everything else
//!   propagates unchanged.
//! - Delays come from [`Backoff`] (optionally jittered) and are applied via
//!   the injected [`Sleeper`], never by busy-waiting.

use crate::backoff::{Backoff, Jitter};
use crate::error::ApiError;
use crate::sleeper::{Sleeper, TokioSleeper};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_MAX_RETRIES: usize = 3;

/// Retry policy for transport calls.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    retryable: Arc<dyn Fn(&ApiError) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    give_up_after: Option<Duration>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("give_up_after", &self.give_up_after)
            .field("retryable", &"<predicate>")
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Total attempts this policy may make (initial try plus retries).
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Run `operation` until it succeeds, fails permanently, or the budget is
    /// spent.
    pub async fn run<T, Fut, Op>(&self, mut operation: Op) -> Result<T, ApiError>
    where
        T: Send,
        Fut: Future<Output = Result<T, ApiError>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let started = Instant::now();

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    let budget_spent =
                        attempt == self.max_retries || self.deadline_passed(started);
                    if budget_spent || !(self.retryable)(&err) {
                        return Err(Self::shape_final(err, attempt + 1));
                    }

                    let delay = self.jitter.apply(self.backoff.delay(attempt));
                    debug!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts(),
                        ?delay,
                        error = %err,
                        "retrying request"
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }

        unreachable!("the final loop iteration always returns")
    }

    fn deadline_passed(&self, started: Instant) -> bool {
        self.give_up_after.is_some_and(|deadline| started.elapsed() >= deadline)
    }

    /// Final error shaping: cancellations never reach here (short-circuited
    /// above); network-class failures get the attempt-counting wrapper; the
    /// rest propagate verbatim.
    fn shape_final(err: ApiError, attempts: usize) -> ApiError {
        if err.is_network_class() {
            ApiError::exhausted(attempts, err)
        } else {
            err
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder {
    max_retries: usize,
    backoff: Backoff,
    jitter: Jitter,
    retryable: Arc<dyn Fn(&ApiError) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    give_up_after: Option<Duration>,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
            jitter: Jitter::None,
            retryable: Arc::new(ApiError::is_retryable),
            sleeper: Arc::new(TokioSleeper),
            give_up_after: None,
        }
    }

    /// Retries beyond the initial attempt. Zero means a single attempt.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the retryability classification.
    pub fn retryable_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ApiError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    /// Swap the sleeper (tests use instant or tracking sleepers).
    pub fn sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Bound the total wall-clock time spent across attempts. Off by
    /// default; the per-attempt transport timeout still applies either way.
    pub fn give_up_after(mut self, deadline: Duration) -> Self {
        self.give_up_after = Some(deadline);
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.backoff,
            jitter: self.jitter,
            retryable: self.retryable,
            sleeper: self.sleeper,
            give_up_after: self.give_up_after,
        }
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelReason;
    use crate::sleeper::{InstantSleeper, TrackingSleeper};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting<T, F>(counter: Arc<AtomicUsize>, f: F) -> impl FnMut() -> std::future::Ready<Result<T, ApiError>> + Send
    where
        F: Fn(usize) -> Result<T, ApiError> + Send,
        T: Send,
    {
        move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(f(attempt))
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt_runs_once() {
        let policy = RetryPolicy::builder().sleeper(InstantSleeper).build();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = policy.run(counting(calls.clone(), |_| Ok(7))).await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let policy = RetryPolicy::builder().max_retries(5).sleeper(InstantSleeper).build();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = policy
            .run(counting(calls.clone(), |attempt| {
                if attempt < 2 {
                    Err(ApiError::network("connection reset"))
                } else {
                    Ok("payload")
                }
            }))
            .await;

        assert_eq!(result.unwrap(), "payload");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn network_exhaustion_wraps_with_attempt_count() {
        let policy = RetryPolicy::builder().max_retries(3).sleeper(InstantSleeper).build();
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> =
            policy.run(counting(calls.clone(), |_| Err(ApiError::network("unreachable")))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 4, "initial attempt plus three retries");
        match result.unwrap_err() {
            ApiError::NetworkExhausted { attempts, source } => {
                assert_eq!(attempts, 4);
                assert!(source.is_network_class());
            }
            other => panic!("expected NetworkExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_exhaust_unwrapped() {
        let policy = RetryPolicy::builder().max_retries(2).sleeper(InstantSleeper).build();
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> = policy
            .run(counting(calls.clone(), |_| {
                Err(ApiError::Status { status: 503, body: String::new() })
            }))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 5xx is retried but never wrapped; callers see the original status.
        assert_eq!(result.unwrap_err().status(), Some(503));
    }

    #[tokio::test]
    async fn non_retryable_error_short_circuits_without_sleeping() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::builder().max_retries(5).sleeper(sleeper.clone()).build();
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> = policy
            .run(counting(calls.clone(), |_| {
                Err(ApiError::Status { status: 404, body: String::new() })
            }))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.recorded().is_empty(), "no delay may precede a permanent failure");
        assert_eq!(result.unwrap_err().status(), Some(404));
    }

    #[tokio::test]
    async fn cancellation_is_returned_verbatim_without_retry() {
        let policy = RetryPolicy::builder().max_retries(10).sleeper(InstantSleeper).build();
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> = policy
            .run(counting(calls.clone(), |_| {
                Err(ApiError::cancelled(CancelReason::Superseded))
            }))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().cancel_reason(), Some(CancelReason::Superseded));
    }

    #[tokio::test]
    async fn default_delays_double_then_cap() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::builder().max_retries(5).sleeper(sleeper.clone()).build();

        let _: Result<(), _> =
            policy.run(|| std::future::ready(Err(ApiError::network("down")))).await;

        assert_eq!(
            sleeper.recorded(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(8000),
                Duration::from_millis(10000),
            ]
        );
    }

    #[tokio::test]
    async fn custom_predicate_stops_retries() {
        let policy = RetryPolicy::builder()
            .max_retries(5)
            .retryable_if(|_| false)
            .sleeper(InstantSleeper)
            .build();
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> =
            policy.run(counting(calls.clone(), |_| Err(ApiError::network("down")))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Network-class failures are wrapped even when stopped by predicate.
        assert!(matches!(result.unwrap_err(), ApiError::NetworkExhausted { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn elapsed_deadline_stops_further_attempts() {
        let policy = RetryPolicy::builder()
            .max_retries(10)
            .give_up_after(Duration::ZERO)
            .sleeper(InstantSleeper)
            .build();
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> =
            policy.run(counting(calls.clone(), |_| Err(ApiError::network("down")))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), ApiError::NetworkExhausted { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let policy = RetryPolicy::builder().max_retries(0).sleeper(InstantSleeper).build();
        let calls = Arc::new(AtomicUsize::new(0));

        let result: Result<(), _> =
            policy.run(counting(calls.clone(), |_| Err(ApiError::network("down")))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.is_err());
        assert_eq!(policy.max_attempts(), 1);
    }
}
