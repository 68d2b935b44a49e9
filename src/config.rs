//! Client configuration with environment overrides.
//!
//! Every knob has a production default; `from_env` layers overrides from
//! `FAKESTORE_*` variables on top and fails loudly on values it cannot
//! parse rather than silently falling back.

use crate::error::ConfigError;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://fakestoreapi.com";

const ENV_BASE_URL: &str = "FAKESTORE_BASE_URL";
const ENV_TIMEOUT_MS: &str = "FAKESTORE_TIMEOUT_MS";
const ENV_MAX_RETRIES: &str = "FAKESTORE_MAX_RETRIES";
const ENV_RETRY_INITIAL_MS: &str = "FAKESTORE_RETRY_INITIAL_MS";
const ENV_RETRY_MAX_MS: &str = "FAKESTORE_RETRY_MAX_MS";

/// Which kind of caller the client serves.
///
/// Interactive callers issue requests from user actions, so a newer request
/// for the same key supersedes (cancels) the older one. Server-side callers
/// fetch in parallel for unrelated purposes and must never cancel each
/// other, so that variant skips the cancellation registry entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Context {
    #[default]
    Interactive,
    Server,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Per-attempt transport timeout.
    pub request_timeout: Duration,
    /// Retries beyond the initial attempt.
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: u32,
    /// How long an abandoned pending-request entry may linger.
    pub pending_max_age: Duration,
    pub context: Context,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2,
            pending_max_age: Duration::from_secs(5 * 60),
            context: Context::Interactive,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `FAKESTORE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), but reading from an arbitrary
    /// lookup. Tests feed maps through here instead of mutating the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_BASE_URL) {
            Url::parse(&url).map_err(|err| ConfigError::InvalidBaseUrl {
                url: url.clone(),
                reason: err.to_string(),
            })?;
            config.base_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            config.request_timeout = Duration::from_millis(parse_var(ENV_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = parse_var(ENV_MAX_RETRIES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETRY_INITIAL_MS) {
            config.initial_delay = Duration::from_millis(parse_var(ENV_RETRY_INITIAL_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_RETRY_MAX_MS) {
            config.max_delay = Duration::from_millis(parse_var(ENV_RETRY_MAX_MS, &raw)?);
        }
        Ok(config)
    }

    pub fn interactive(mut self) -> Self {
        self.context = Context::Interactive;
        self
    }

    pub fn server(mut self) -> Self {
        self.context = Context::Server;
        self
    }
}

fn parse_var<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|err: T::Err| ConfigError::InvalidVar {
        name,
        value: raw.to_string(),
        reason: err.to_string(),
    })
}
