// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Backoff between reconnection attempts.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for automatic reconnection.
///
/// Attempts are numbered from zero. With the defaults the delays are
/// 1, 2, 4, 8 and 16 seconds, after which [`should_retry`] returns false
/// and the session gives up.
///
/// [`should_retry`]: ReconnectionPolicy::should_retry
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use virtual_ir_light::transport::ReconnectionPolicy;
///
/// let policy = ReconnectionPolicy::default();
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
/// assert!(!policy.should_retry(5));
///
/// let policy = ReconnectionPolicy::new()
///     .with_max_retries(10)
///     .with_initial_delay(Duration::from_millis(500))
///     .with_max_delay(Duration::from_secs(30));
/// assert!(policy.should_retry(9));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectionPolicy {
    /// Maximum number of attempts before giving up (None = infinite).
    pub max_retries: Option<u32>,
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,
}

impl ReconnectionPolicy {
    /// Creates a reconnection policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of attempts.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Retries forever.
    #[must_use]
    pub fn with_infinite_retries(mut self) -> Self {
        self.max_retries = None;
        self
    }

    /// Sets the delay before the first attempt.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the upper bound on any single delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay before a given attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        // Millisecond delays stay far below f64 precision limits
        #[allow(clippy::cast_precision_loss)]
        let delay_ms = self.initial_delay.as_millis() as f64 * multiplier;
        let max_ms = self.max_delay.as_millis();

        // Non-finite or negative products saturate to the cap
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay_ms = if delay_ms.is_finite() && delay_ms >= 0.0 {
            (delay_ms as u128).min(max_ms)
        } else {
            max_ms
        };

        Duration::from_millis(u64::try_from(delay_ms).unwrap_or(u64::MAX))
    }

    /// Returns true if another attempt should be made.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_retries.is_none_or(|max| attempt < max)
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            max_retries: Some(5),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

/// Settings-file form of [`ReconnectionPolicy`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Delay before the first attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Multiplier applied per attempt.
    pub multiplier: f64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Attempts before giving up; `null` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 60_000,
            max_attempts: Some(5),
        }
    }
}

impl From<ReconnectSettings> for ReconnectionPolicy {
    fn from(settings: ReconnectSettings) -> Self {
        Self {
            max_retries: settings.max_attempts,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.multiplier,
        }
    }
}
