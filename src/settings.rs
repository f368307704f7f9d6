//! Reporting configuration and environment variable handling.
//!
//! Settings are an ordinary value handed to [`crate::ErrorReporter`]; nothing
//! is cached globally. [`ReportingSettings::from_env`] offers zero-config
//! loading with sensible defaults.

use crate::retry::RetryPolicy;
use std::time::Duration;

/// What to discard when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued reports to make room.
    #[default]
    DropOldest,
    /// Keep the queue as is and discard the incoming reports.
    DropNewest,
}

impl OverflowPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().replace('-', "_").as_str() {
            "drop_oldest" | "oldest" => Some(OverflowPolicy::DropOldest),
            "drop_newest" | "newest" => Some(OverflowPolicy::DropNewest),
            _ => None,
        }
    }
}

/// Configuration for the report queue and dispatcher.
#[derive(Debug, Clone)]
pub struct ReportingSettings {
    /// Whether reports are queued and flushed at all.
    pub enabled: bool,
    /// Reporting endpoint. `None` turns delivery into a successful no-op.
    pub endpoint: Option<String>,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    /// Queue length that triggers an immediate flush.
    pub batch_size: usize,
    /// Period of the background flush.
    pub flush_interval: Duration,
    /// Upper bound on queued reports.
    pub max_queue_size: usize,
    pub overflow: OverflowPolicy,
    /// Per-request timeout of the HTTP sink.
    pub request_timeout: Duration,
    /// Retry policy applied to each batch delivery.
    pub delivery_policy: RetryPolicy,
    pub app_version: String,
    pub platform: String,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key: None,
            batch_size: 10,
            flush_interval: Duration::from_secs(30),
            max_queue_size: 1000,
            overflow: OverflowPolicy::DropOldest,
            request_timeout: Duration::from_secs(10),
            delivery_policy: RetryPolicy::api_call(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
        }
    }
}

impl ReportingSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `GUTSENSE_ERROR_REPORTING_ENABLED` | `false` | Queue and flush reports |
    /// | `GUTSENSE_ERROR_REPORTING_ENDPOINT` | - | Reporting URL |
    /// | `GUTSENSE_ERROR_REPORTING_API_KEY` | - | Bearer token |
    /// | `GUTSENSE_ERROR_BATCH_SIZE` | `10` | Immediate flush threshold |
    /// | `GUTSENSE_ERROR_FLUSH_INTERVAL_MS` | `30000` | Periodic flush |
    /// | `GUTSENSE_ERROR_MAX_QUEUE_SIZE` | `1000` | Queue bound |
    /// | `GUTSENSE_ERROR_OVERFLOW` | `drop_oldest` | `drop_oldest` / `drop_newest` |
    /// | `GUTSENSE_ERROR_MAX_RETRIES` | `3` | Delivery attempts per flush |
    /// | `GUTSENSE_ERROR_MAX_RETRY_DELAY_MS` | `10000` | Delivery backoff cap |
    /// | `GUTSENSE_APP_VERSION` | crate version | Payload metadata |
    /// | `GUTSENSE_PLATFORM` | target OS | Payload metadata |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Unparseable values keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str| text(key).and_then(|v| v.parse::<u64>().ok());

        let enabled = text("GUTSENSE_ERROR_REPORTING_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(defaults.enabled);

        let mut delivery_policy = defaults.delivery_policy.clone();
        if let Some(attempts) = number("GUTSENSE_ERROR_MAX_RETRIES") {
            delivery_policy.max_attempts = (attempts as usize).max(1);
        }
        if let Some(ms) = number("GUTSENSE_ERROR_MAX_RETRY_DELAY_MS") {
            delivery_policy.max_delay = Duration::from_millis(ms);
        }

        Self {
            enabled,
            endpoint: text("GUTSENSE_ERROR_REPORTING_ENDPOINT"),
            api_key: text("GUTSENSE_ERROR_REPORTING_API_KEY"),
            batch_size: number("GUTSENSE_ERROR_BATCH_SIZE")
                .map(|n| (n as usize).max(1))
                .unwrap_or(defaults.batch_size),
            flush_interval: number("GUTSENSE_ERROR_FLUSH_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_interval),
            max_queue_size: number("GUTSENSE_ERROR_MAX_QUEUE_SIZE")
                .map(|n| (n as usize).max(1))
                .unwrap_or(defaults.max_queue_size),
            overflow: text("GUTSENSE_ERROR_OVERFLOW")
                .and_then(|v| OverflowPolicy::parse(&v))
                .unwrap_or(defaults.overflow),
            request_timeout: defaults.request_timeout,
            delivery_policy,
            app_version: text("GUTSENSE_APP_VERSION").unwrap_or(defaults.app_version),
            platform: text("GUTSENSE_PLATFORM").unwrap_or(defaults.platform),
        }
    }

    /// Enable or disable reporting.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the reporting endpoint URL.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the bearer token sent with each batch.
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the queue length that triggers a flush (at least 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the period of the background flush.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the queue bound (at least 1).
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size.max(1);
        self
    }

    /// Set which report is dropped when the queue is full.
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Set the HTTP timeout for one delivery attempt.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry policy used to deliver a batch.
    pub fn with_delivery_policy(mut self, policy: RetryPolicy) -> Self {
        self.delivery_policy = policy;
        self
    }

    /// Set the app version sent in payload metadata.
    pub fn with_app_version<S: Into<String>>(mut self, version: S) -> Self {
        self.app_version = version.into();
        self
    }

    /// Set the platform sent in payload metadata.
    pub fn with_platform<S: Into<String>>(mut self, platform: S) -> Self {
        self.platform = platform.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_reporting_settings_default() {
        let settings = ReportingSettings::default();
        assert!(!settings.enabled);
        assert!(settings.endpoint.is_none());
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.flush_interval, Duration::from_secs(30));
        assert_eq!(settings.max_queue_size, 1000);
        assert_eq!(settings.overflow, OverflowPolicy::DropOldest);
        assert_eq!(settings.delivery_policy.max_attempts, 3);
    }

    #[test]
    fn test_from_lookup_should_parse_all_variables() {
        let settings = ReportingSettings::from_lookup(lookup(&[
            ("GUTSENSE_ERROR_REPORTING_ENABLED", "TRUE"),
            ("GUTSENSE_ERROR_REPORTING_ENDPOINT", "https://errors.example.com/v1"),
            ("GUTSENSE_ERROR_REPORTING_API_KEY", "secret"),
            ("GUTSENSE_ERROR_BATCH_SIZE", "25"),
            ("GUTSENSE_ERROR_FLUSH_INTERVAL_MS", "5000"),
            ("GUTSENSE_ERROR_MAX_QUEUE_SIZE", "50"),
            ("GUTSENSE_ERROR_OVERFLOW", "drop-newest"),
            ("GUTSENSE_ERROR_MAX_RETRIES", "5"),
            ("GUTSENSE_ERROR_MAX_RETRY_DELAY_MS", "2000"),
            ("GUTSENSE_APP_VERSION", "2.4.0"),
            ("GUTSENSE_PLATFORM", "ios"),
        ]));

        assert!(settings.enabled);
        assert_eq!(settings.endpoint.as_deref(), Some("https://errors.example.com/v1"));
        assert_eq!(settings.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.flush_interval, Duration::from_secs(5));
        assert_eq!(settings.max_queue_size, 50);
        assert_eq!(settings.overflow, OverflowPolicy::DropNewest);
        assert_eq!(settings.delivery_policy.max_attempts, 5);
        assert_eq!(settings.delivery_policy.max_delay, Duration::from_secs(2));
        assert_eq!(settings.app_version, "2.4.0");
        assert_eq!(settings.platform, "ios");
    }

    #[test]
    fn test_from_lookup_should_fall_back_on_invalid_values() {
        let settings = ReportingSettings::from_lookup(lookup(&[
            ("GUTSENSE_ERROR_BATCH_SIZE", "lots"),
            ("GUTSENSE_ERROR_FLUSH_INTERVAL_MS", "0"),
            ("GUTSENSE_ERROR_REPORTING_ENDPOINT", "   "),
            ("GUTSENSE_ERROR_OVERFLOW", "sideways"),
        ]));

        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.flush_interval, Duration::from_secs(30));
        assert!(settings.endpoint.is_none());
        assert_eq!(settings.overflow, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_builder_should_clamp_sizes() {
        let settings = ReportingSettings::new()
            .with_enabled(true)
            .with_batch_size(0)
            .with_max_queue_size(0);
        assert!(settings.enabled);
        assert_eq!(settings.batch_size, 1);
        assert_eq!(settings.max_queue_size, 1);
    }
}
