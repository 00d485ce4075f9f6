//! Dispatcher tunables.
//!
//! Every field is optional in JSON; missing fields take the defaults below.
//! Both snake_case and camelCase field names are accepted.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::TransportError;
use crate::policy::{RateState, RateWindow};

const ENV_PREFIX: &str = "CHAINBALANCE_";

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Starting cursor position.
    #[serde(alias = "initialServiceIndex")]
    pub initial_service_index: usize,
    /// Saved per-endpoint counters. Ignored unless one entry per endpoint.
    #[serde(alias = "initialServicesStats")]
    pub initial_services_stats: Option<Vec<RateState>>,
    /// Delay before retrying a failed invocation. Zero disables retries for
    /// recognised errors in named-method calls.
    #[serde(alias = "retryOnErrorDelayInMillis")]
    pub retry_on_error_delay_in_millis: u64,
    /// Poll interval while waiting for an endpoint's window to reopen.
    #[serde(alias = "retryOnRateLimitInSeconds")]
    pub retry_on_rate_limit_in_seconds: f64,
    /// Raw per-window request cap, before the safety factor.
    #[serde(alias = "maxRequestsPerNode")]
    pub max_requests_per_node: u64,
    /// Raw window length in minutes, before the safety factor.
    #[serde(alias = "maxDurationOfMaxRequestsPerNodeInMinutes")]
    pub max_duration_of_max_requests_per_node_in_minutes: f64,
    /// Divisor applied to both the cap and the window.
    #[serde(alias = "rateLimitFactor")]
    pub rate_limit_factor: f64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            initial_service_index: 0,
            initial_services_stats: None,
            retry_on_error_delay_in_millis: 1000,
            retry_on_rate_limit_in_seconds: 3.0,
            max_requests_per_node: 10_000,
            max_duration_of_max_requests_per_node_in_minutes: 5.0,
            rate_limit_factor: 5.0,
        }
    }
}

impl DispatcherConfig {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, TransportError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| TransportError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Apply `CHAINBALANCE_*` environment overrides on top of `self`.
    ///
    /// Recognised variables are the upper-cased field names, e.g.
    /// `CHAINBALANCE_RATE_LIMIT_FACTOR`.
    pub fn with_env_overrides(self) -> Result<Self, TransportError> {
        self.with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, TransportError> {
        if let Some(v) = lookup("INITIAL_SERVICE_INDEX") {
            self.initial_service_index = parse_var("INITIAL_SERVICE_INDEX", &v)?;
        }
        if let Some(v) = lookup("RETRY_ON_ERROR_DELAY_IN_MILLIS") {
            self.retry_on_error_delay_in_millis = parse_var("RETRY_ON_ERROR_DELAY_IN_MILLIS", &v)?;
        }
        if let Some(v) = lookup("RETRY_ON_RATE_LIMIT_IN_SECONDS") {
            self.retry_on_rate_limit_in_seconds = parse_var("RETRY_ON_RATE_LIMIT_IN_SECONDS", &v)?;
        }
        if let Some(v) = lookup("MAX_REQUESTS_PER_NODE") {
            self.max_requests_per_node = parse_var("MAX_REQUESTS_PER_NODE", &v)?;
        }
        if let Some(v) = lookup("MAX_DURATION_OF_MAX_REQUESTS_PER_NODE_IN_MINUTES") {
            self.max_duration_of_max_requests_per_node_in_minutes =
                parse_var("MAX_DURATION_OF_MAX_REQUESTS_PER_NODE_IN_MINUTES", &v)?;
        }
        if let Some(v) = lookup("RATE_LIMIT_FACTOR") {
            self.rate_limit_factor = parse_var("RATE_LIMIT_FACTOR", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the dispatcher cannot run with.
    pub fn validate(&self) -> Result<(), TransportError> {
        if !(self.rate_limit_factor.is_finite() && self.rate_limit_factor > 0.0) {
            return Err(TransportError::Config(format!(
                "rate_limit_factor must be positive, got {}",
                self.rate_limit_factor
            )));
        }
        match Duration::try_from_secs_f64(self.retry_on_rate_limit_in_seconds) {
            Ok(interval) if !interval.is_zero() => {}
            _ => {
                return Err(TransportError::Config(format!(
                    "retry_on_rate_limit_in_seconds must be a positive duration, got {}",
                    self.retry_on_rate_limit_in_seconds
                )));
            }
        }
        if !(self.max_duration_of_max_requests_per_node_in_minutes.is_finite()
            && self.max_duration_of_max_requests_per_node_in_minutes >= 0.0)
        {
            return Err(TransportError::Config(
                "max_duration_of_max_requests_per_node_in_minutes must be non-negative".into(),
            ));
        }
        Ok(())
    }

    pub fn with_initial_service_index(mut self, index: usize) -> Self {
        self.initial_service_index = index;
        self
    }

    pub fn with_initial_services_stats(mut self, stats: Vec<RateState>) -> Self {
        self.initial_services_stats = Some(stats);
        self
    }

    /// Sub-millisecond delays round up, so only `Duration::ZERO` disables
    /// retries for recognised errors.
    pub fn with_retry_on_error_delay(mut self, delay: Duration) -> Self {
        self.retry_on_error_delay_in_millis =
            u64::try_from(delay.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX);
        self
    }

    pub fn with_retry_on_rate_limit(mut self, interval: Duration) -> Self {
        self.retry_on_rate_limit_in_seconds = interval.as_secs_f64();
        self
    }

    pub fn with_max_requests_per_node(mut self, max: u64) -> Self {
        self.max_requests_per_node = max;
        self
    }

    pub fn with_max_duration_in_minutes(mut self, minutes: f64) -> Self {
        self.max_duration_of_max_requests_per_node_in_minutes = minutes;
        self
    }

    pub fn with_rate_limit_factor(mut self, factor: f64) -> Self {
        self.rate_limit_factor = factor;
        self
    }

    /// Cap and window after dividing by the safety factor.
    pub fn effective_window(&self) -> RateWindow {
        RateWindow::scaled(
            self.max_requests_per_node,
            self.max_duration_of_max_requests_per_node_in_minutes,
            self.rate_limit_factor,
        )
    }

    pub fn error_retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_on_error_delay_in_millis)
    }

    /// Out-of-range values saturate; [`validate`](Self::validate) rejects them.
    pub fn rate_limit_poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_on_rate_limit_in_seconds).unwrap_or(Duration::MAX)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, TransportError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| TransportError::Config(format!("{ENV_PREFIX}{key}={value:?}: {e}")))
}
