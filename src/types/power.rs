// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Power-related types for the virtual light.
//!
//! [`PowerState`] is what travels on the wire and what a command may
//! request. [`LightState`] is what the engine records, which adds the
//! boot-time `Unknown` state before the first observation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

/// A requested or reported on/off state.
///
/// # Examples
///
/// ```
/// use virtual_ir_light::types::PowerState;
///
/// assert_eq!("on".parse::<PowerState>().unwrap(), PowerState::On);
/// assert_eq!(PowerState::Off.as_str(), "OFF");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    /// Light is off.
    Off,
    /// Light is on.
    On,
}

impl PowerState {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OFF" => Ok(Self::Off),
            "ON" => Ok(Self::On),
            _ => Err(PayloadError::InvalidState(s.to_string())),
        }
    }
}

impl From<bool> for PowerState {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

/// The state the engine records for a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LightState {
    /// Nothing observed since boot.
    #[default]
    Unknown,
    /// Light is off.
    Off,
    /// Light is on.
    On,
}

impl LightState {
    /// Returns true only when the light is known to be on.
    #[must_use]
    pub const fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }

    /// Returns the state as reported on the wire.
    ///
    /// `Unknown` is reported as `OFF`.
    #[must_use]
    pub const fn reported(&self) -> PowerState {
        match self {
            Self::On => PowerState::On,
            Self::Off | Self::Unknown => PowerState::Off,
        }
    }
}

impl From<PowerState> for LightState {
    fn from(value: PowerState) -> Self {
        match value {
            PowerState::Off => Self::Off,
            PowerState::On => Self::On,
        }
    }
}

impl PartialEq<PowerState> for LightState {
    fn eq(&self, other: &PowerState) -> bool {
        *self == Self::from(*other)
    }
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Off => write!(f, "OFF"),
            Self::On => write!(f, "ON"),
        }
    }
}
