//! Configuration for the gateway, the resilience layers, and the providers.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

const fn non_zero(n: u32) -> NonZeroU32 {
    match NonZeroU32::new(n) {
        Some(v) => v,
        None => panic!("value must be non-zero"),
    }
}

// ---------------------------------------------------------------------------
// ResilienceConfig
// ---------------------------------------------------------------------------

/// Rate limiter, circuit breaker, and timeout settings for one named operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResilienceConfig {
    /// Token refill rate.
    pub rate_limit_per_second: NonZeroU32,
    /// Token bucket capacity.
    pub burst: NonZeroU32,
    /// Consecutive failures that trip the breaker.
    pub breaker_failure_threshold: u32,
    /// Time the breaker stays open before admitting a trial call.
    pub breaker_cooldown: Duration,
    /// Concurrent trial calls admitted while half-open; this many successes close it.
    pub half_open_max_calls: u32,
    /// Upper bound for a single call, further capped by the caller's deadline.
    pub call_timeout: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_second: non_zero(1),
            burst: non_zero(100),
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(10),
            half_open_max_calls: 1,
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl ResilienceConfig {
    /// Returns a copy with every field set in `patch` replaced.
    #[must_use]
    pub fn patched(&self, patch: &ResilienceOverride) -> Self {
        Self {
            rate_limit_per_second: patch
                .rate_limit_per_second
                .unwrap_or(self.rate_limit_per_second),
            burst: patch.burst.unwrap_or(self.burst),
            breaker_failure_threshold: patch
                .breaker_failure_threshold
                .unwrap_or(self.breaker_failure_threshold),
            breaker_cooldown: patch
                .breaker_cooldown_ms
                .map_or(self.breaker_cooldown, Duration::from_millis),
            half_open_max_calls: patch.half_open_max_calls.unwrap_or(self.half_open_max_calls),
            call_timeout: patch
                .call_timeout_ms
                .map_or(self.call_timeout, Duration::from_millis),
        }
    }

    fn validate(&self, operation: &str) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.breaker_failure_threshold > 0,
            "{operation}: breakerFailureThreshold must be at least 1"
        );
        anyhow::ensure!(
            self.half_open_max_calls > 0,
            "{operation}: halfOpenMaxCalls must be at least 1"
        );
        anyhow::ensure!(
            !self.call_timeout.is_zero(),
            "{operation}: callTimeoutMs must be positive"
        );
        Ok(())
    }
}

/// Partial [`ResilienceConfig`] as written in a settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResilienceOverride {
    pub rate_limit_per_second: Option<NonZeroU32>,
    pub burst: Option<NonZeroU32>,
    pub breaker_failure_threshold: Option<u32>,
    pub breaker_cooldown_ms: Option<u64>,
    pub half_open_max_calls: Option<u32>,
    pub call_timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// ResilienceSettings
// ---------------------------------------------------------------------------

/// Defaults plus per-operation overrides.
///
/// File format:
///
/// ```json
/// {
///   "defaults": { "burst": 50 },
///   "operations": { "books.find": { "breakerFailureThreshold": 3, "callTimeoutMs": 2000 } }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResilienceSettings {
    pub defaults: ResilienceConfig,
    pub overrides: HashMap<String, ResilienceOverride>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default)]
    defaults: ResilienceOverride,
    #[serde(default)]
    operations: HashMap<String, ResilienceOverride>,
}

impl ResilienceSettings {
    /// Effective config for `operation`.
    #[must_use]
    pub fn for_operation(&self, operation: &str) -> ResilienceConfig {
        match self.overrides.get(operation) {
            Some(patch) => self.defaults.patched(patch),
            None => self.defaults.clone(),
        }
    }

    /// Parses settings from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, unknown keys, or values that
    /// would produce an unusable breaker or timeout.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let file: SettingsFile =
            serde_json::from_str(text).context("invalid resilience settings")?;
        let settings = Self {
            defaults: ResilienceConfig::default().patched(&file.defaults),
            overrides: file.operations,
        };
        settings.defaults.validate("defaults")?;
        for operation in settings.overrides.keys() {
            settings.for_operation(operation).validate(operation)?;
        }
        Ok(settings)
    }

    /// Reads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails [`Self::from_json`].
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// GatewayConfig / ProviderConfig
// ---------------------------------------------------------------------------

/// Gateway composition settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the book provider service.
    pub book_backend: String,
    /// Base URL of the album provider service.
    pub album_backend: String,
    /// Deadline for one whole fan-out operation.
    pub search_timeout: Duration,
    /// Connection establishment budget for each backend call.
    pub connect_timeout: Duration,
    pub resilience: ResilienceSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            book_backend: "http://127.0.0.1:8081".to_string(),
            album_backend: "http://127.0.0.1:8082".to_string(),
            search_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(1),
            resilience: ResilienceSettings::default(),
        }
    }
}

/// Settings for one upstream search API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_endpoint: String,
    /// Maximum records requested from the upstream API.
    pub result_limit: u32,
}

impl ProviderConfig {
    pub const DEFAULT_RESULT_LIMIT: u32 = 5;
    pub const GOOGLE_BOOKS_ENDPOINT: &'static str = "https://www.googleapis.com/books/v1/volumes";
    pub const ITUNES_ENDPOINT: &'static str = "https://itunes.apple.com/search";

    #[must_use]
    pub fn google_books() -> Self {
        Self {
            api_endpoint: Self::GOOGLE_BOOKS_ENDPOINT.to_string(),
            result_limit: Self::DEFAULT_RESULT_LIMIT,
        }
    }

    #[must_use]
    pub fn itunes() -> Self {
        Self {
            api_endpoint: Self::ITUNES_ENDPOINT.to_string(),
            result_limit: Self::DEFAULT_RESULT_LIMIT,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
