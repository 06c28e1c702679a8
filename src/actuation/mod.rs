// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remote actuation of the physical light.
//!
//! The physical light only understands four opaque scripts: on, off, one
//! step up and one step down. An [`Actuator`] runs one of them a number of
//! times with pacing between calls. There is no feedback channel; success
//! only means the automation service accepted every call.
//!
//! # Implementations
//!
//! - [`HomeAssistantGateway`]: POSTs to the Home Assistant script service

use std::future::Future;
use std::time::Duration;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{HomeAssistantConfig, HomeAssistantGateway};

use crate::error::ActuationError;
use crate::types::{Level, ScriptBindings, ScriptRef};

/// Runs remote scripts against the physical light.
///
/// A batch of `repeat` calls is not atomic: if call `k` fails, calls
/// `1..k` already happened physically. Implementations report the batch
/// as failed and the engine does not commit the transition.
pub trait Actuator: Send + Sync {
    /// Runs `script` `repeat` times, pacing between calls.
    ///
    /// # Errors
    ///
    /// Returns `ActuationError` if any call in the batch fails.
    fn execute(
        &self,
        script: &ScriptRef,
        repeat: u32,
    ) -> impl Future<Output = Result<(), ActuationError>> + Send;
}

/// Direction of a brightness step batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards brighter levels.
    Up,
    /// Towards dimmer levels.
    Down,
}

impl Direction {
    /// Returns the direction and step count to go from `from` to `to`.
    ///
    /// Returns `None` when both levels are equal.
    #[must_use]
    pub fn between(from: Level, to: Level) -> Option<(Self, u32)> {
        match to.cmp(&from) {
            std::cmp::Ordering::Greater => Some((Self::Up, u32::from(to - from))),
            std::cmp::Ordering::Less => Some((Self::Down, u32::from(from - to))),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Returns the script that moves one step in this direction.
    #[must_use]
    pub fn script(self, scripts: &ScriptBindings) -> &ScriptRef {
        match self {
            Self::Up => &scripts.brightness_up_service,
            Self::Down => &scripts.brightness_down_service,
        }
    }
}

/// Timing rules around step batches.
///
/// After a successful multi-step batch the engine waits
/// `min(steps * settle_per_step, settle_cap)` before committing, so a
/// large jump never blocks for longer than the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Wait after each remote call (receiver debounce window).
    pub step_interval: Duration,
    /// Settle time added per step after a batch.
    pub settle_per_step: Duration,
    /// Upper bound on the settle time.
    pub settle_cap: Duration,
}

impl Pacing {
    /// Default wait between remote calls.
    pub const DEFAULT_STEP_INTERVAL: Duration = Duration::from_millis(500);
    /// Default upper bound on the settle time.
    pub const DEFAULT_SETTLE_CAP: Duration = Duration::from_secs(3);

    /// No waiting at all.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            step_interval: Duration::ZERO,
            settle_per_step: Duration::ZERO,
            settle_cap: Duration::ZERO,
        }
    }

    /// Returns the settle time after a batch of `steps` calls.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use virtual_ir_light::actuation::Pacing;
    ///
    /// let pacing = Pacing::default();
    /// assert_eq!(pacing.settle_time(2), Duration::from_secs(1));
    /// assert_eq!(pacing.settle_time(20), Duration::from_secs(3));
    /// ```
    #[must_use]
    pub fn settle_time(&self, steps: u32) -> Duration {
        self.settle_per_step
            .saturating_mul(steps)
            .min(self.settle_cap)
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            step_interval: Self::DEFAULT_STEP_INTERVAL,
            settle_per_step: Self::DEFAULT_STEP_INTERVAL,
            settle_cap: Self::DEFAULT_SETTLE_CAP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripts() -> ScriptBindings {
        ScriptBindings {
            on_service: ScriptRef::new("script.on"),
            off_service: ScriptRef::new("script.off"),
            brightness_up_service: ScriptRef::new("script.up"),
            brightness_down_service: ScriptRef::new("script.down"),
        }
    }

    #[test]
    fn direction_between_levels() {
        assert_eq!(Direction::between(2, 5), Some((Direction::Up, 3)));
        assert_eq!(Direction::between(4, 1), Some((Direction::Down, 3)));
        assert_eq!(Direction::between(3, 3), None);
    }

    #[test]
    fn direction_selects_step_script() {
        let scripts = scripts();
        assert_eq!(Direction::Up.script(&scripts).as_str(), "script.up");
        assert_eq!(Direction::Down.script(&scripts).as_str(), "script.down");
    }

    #[test]
    fn settle_time_is_capped() {
        let pacing = Pacing::default();
        assert_eq!(pacing.settle_time(1), Duration::from_millis(500));
        assert_eq!(pacing.settle_time(6), Duration::from_secs(3));
        assert_eq!(pacing.settle_time(250), Duration::from_secs(3));
        assert_eq!(pacing.settle_time(u32::MAX), Duration::from_secs(3));
    }

    #[test]
    fn immediate_pacing_never_waits() {
        assert_eq!(Pacing::immediate().settle_time(10), Duration::ZERO);
    }
}
