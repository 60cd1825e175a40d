use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Bounded exponential backoff for page fetches.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based: the wait after the first failure is `attempt = 1`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// Subscription-plan switches that change what bulk actions allow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlanFeatures {
    pub multi_delete: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub page_size: u32,
    pub near_top_threshold_px: f64,
    /// After a jump, auto-pagination stays off until the user scrolls below this.
    pub require_scroll_threshold_px: f64,
    /// Fraction of a message that must be on screen to count as seen.
    pub visibility_threshold: f64,
    pub retry: RetryPolicy,
    pub features: PlanFeatures,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            near_top_threshold_px: 80.0,
            require_scroll_threshold_px: 200.0,
            visibility_threshold: 0.5,
            retry: RetryPolicy::default(),
            features: PlanFeatures::default(),
        }
    }
}

impl TimelineConfig {
    /// Read `PARLEY_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            page_size: read(&lookup, "PARLEY_PAGE_SIZE", defaults.page_size)?,
            near_top_threshold_px: read(&lookup, "PARLEY_NEAR_TOP_PX", defaults.near_top_threshold_px)?,
            require_scroll_threshold_px: read(
                &lookup,
                "PARLEY_REQUIRE_SCROLL_PX",
                defaults.require_scroll_threshold_px,
            )?,
            visibility_threshold: read(
                &lookup,
                "PARLEY_VISIBILITY_THRESHOLD",
                defaults.visibility_threshold,
            )?,
            retry: RetryPolicy {
                max_attempts: read(&lookup, "PARLEY_FETCH_ATTEMPTS", defaults.retry.max_attempts)?,
                base_delay_ms: read(
                    &lookup,
                    "PARLEY_FETCH_BASE_DELAY_MS",
                    defaults.retry.base_delay_ms,
                )?,
                max_delay_ms: read(
                    &lookup,
                    "PARLEY_FETCH_MAX_DELAY_MS",
                    defaults.retry.max_delay_ms,
                )?,
            },
            features: PlanFeatures {
                multi_delete: read(&lookup, "PARLEY_MULTI_DELETE", defaults.features.multi_delete)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::OutOfRange {
                var: "page_size",
                expected: "at least 1",
            });
        }
        if !(self.visibility_threshold > 0.0 && self.visibility_threshold <= 1.0) {
            return Err(ConfigError::OutOfRange {
                var: "visibility_threshold",
                expected: "in (0, 1]",
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                var: "retry.max_attempts",
                expected: "at least 1",
            });
        }
        Ok(())
    }
}

fn read<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}
