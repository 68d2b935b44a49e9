//! Delay computation for retries: exponential growth with a cap, plus
//! optional jitter.
//!
//! Retry indices are 0-based: the first retry waits the initial delay, the
//! second waits `initial * multiplier`, and so on, never exceeding the cap.
//! Arithmetic saturates instead of overflowing, so absurd retry counts
//! degrade to the cap rather than panicking.

use rand::Rng;
use std::time::Duration;
use thiserror::Error;

/// Ceiling applied when a computation would overflow.
const OVERFLOW_CEILING: Duration = Duration::from_secs(24 * 60 * 60);

const DEFAULT_INITIAL: Duration = Duration::from_secs(1);
const DEFAULT_MULTIPLIER: u32 = 2;
const DEFAULT_MAX: Duration = Duration::from_secs(10);

/// Invalid backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackoffError {
    #[error("backoff multiplier must be at least 1 (got {0})")]
    MultiplierTooSmall(u32),
    #[error("max delay ({max:?}) must be at least the initial delay ({initial:?})")]
    MaxBelowInitial { initial: Duration, max: Duration },
}

/// Exponential backoff: `initial * multiplier^retry`, capped at `max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    multiplier: u32,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { initial: DEFAULT_INITIAL, multiplier: DEFAULT_MULTIPLIER, max: DEFAULT_MAX }
    }
}

impl Backoff {
    /// Doubling backoff starting at `initial`, capped at the default maximum.
    pub fn exponential(initial: Duration) -> Self {
        Self { initial, ..Self::default() }
    }

    /// Override the growth factor. A multiplier of 1 yields a constant delay.
    pub fn with_multiplier(mut self, multiplier: u32) -> Result<Self, BackoffError> {
        if multiplier == 0 {
            return Err(BackoffError::MultiplierTooSmall(multiplier));
        }
        self.multiplier = multiplier;
        Ok(self)
    }

    /// Override the delay cap.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max < self.initial {
            return Err(BackoffError::MaxBelowInitial { initial: self.initial, max });
        }
        self.max = max;
        Ok(self)
    }

    /// Delay before retry number `retry` (0-based: the first retry waits the
    /// initial delay).
    pub fn delay(&self, retry: usize) -> Duration {
        let exponent = u32::try_from(retry).unwrap_or(u32::MAX);
        let factor = u128::from(self.multiplier).saturating_pow(exponent);
        let nanos = self.initial.as_nanos().saturating_mul(factor);
        let computed = if nanos > OVERFLOW_CEILING.as_nanos() {
            OVERFLOW_CEILING
        } else {
            Duration::from_nanos(nanos as u64)
        };
        computed.min(self.max)
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

/// Randomization applied on top of a computed delay, to spread retries from
/// many clients hitting the same upstream.
///
/// The default is `None` so delay sequences stay deterministic; turn on
/// `Full` or `Equal` when a fleet of clients shares the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Jitter {
    /// Use the exact computed delay.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Uniform in `[delay/2, delay]`, keeping a floor while adding spread.
    Equal,
}

impl Jitter {
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with(delay, &mut rand::rng())
    }

    /// Apply with a caller-supplied RNG (deterministic in tests).
    pub fn apply_with<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return delay;
        }
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(rng.random_range(0..=millis)),
            Jitter::Equal => Duration::from_millis(rng.random_range(millis / 2..=millis)),
        }
    }
}
