// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoding of inbound messages.
//!
//! Two payload shapes arrive on the transport:
//!
//! - sensor topics carry a bare decimal lux value, e.g. `42.37`
//! - command topics carry `{"state": "on", "brightness": 3}` where both
//!   fields are optional and `state` is case-insensitive

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PayloadError;
use crate::types::{Level, PowerState};

/// Parses a sensor reading.
///
/// The value is rounded to one decimal place.
///
/// # Errors
///
/// Returns `PayloadError` if the payload is not UTF-8, not a decimal
/// number, or not finite.
///
/// # Examples
///
/// ```
/// use virtual_ir_light::transport::payload::parse_reading;
///
/// assert_eq!(parse_reading(b" 42.37\n").unwrap(), 42.4);
/// assert!(parse_reading(b"bright").is_err());
/// ```
pub fn parse_reading(payload: &[u8]) -> Result<f64, PayloadError> {
    let text = std::str::from_utf8(payload).map_err(|_| PayloadError::InvalidUtf8)?;
    let text = text.trim();

    let value: f64 = text
        .parse()
        .map_err(|_| PayloadError::NotNumeric(text.to_string()))?;
    if !value.is_finite() {
        return Err(PayloadError::NonFinite);
    }

    Ok((value * 10.0).round() / 10.0)
}

/// A structured command for a light.
///
/// # Examples
///
/// ```
/// use virtual_ir_light::transport::payload::LightCommand;
/// use virtual_ir_light::types::PowerState;
///
/// let command = LightCommand::parse(br#"{"state": "on", "brightness": 3}"#).unwrap();
/// assert_eq!(command.state, Some(PowerState::On));
/// assert_eq!(command.brightness, Some(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightCommand {
    /// Requested on/off state.
    #[serde(
        default,
        deserialize_with = "deserialize_state",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<PowerState>,

    /// Requested brightness level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<Level>,

    /// Restricts the command to one light.
    #[serde(rename = "lightId", default, skip_serializing_if = "Option::is_none")]
    pub light_id: Option<String>,
}

impl LightCommand {
    /// Creates an empty command.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the requested state.
    #[must_use]
    pub fn with_state(mut self, state: PowerState) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the requested brightness.
    #[must_use]
    pub fn with_brightness(mut self, level: Level) -> Self {
        self.brightness = Some(level);
        self
    }

    /// Addresses the command to a single light.
    #[must_use]
    pub fn for_light(mut self, id: impl Into<String>) -> Self {
        self.light_id = Some(id.into());
        self
    }

    /// Returns true when neither state nor brightness is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.brightness.is_none()
    }

    /// Decodes a command payload.
    ///
    /// # Errors
    ///
    /// Returns `PayloadError::EmptyCommand` when the object carries neither
    /// `state` nor `brightness`, and other `PayloadError` variants when the
    /// payload is not a valid command object.
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        let text = std::str::from_utf8(payload).map_err(|_| PayloadError::InvalidUtf8)?;
        let command: Self = serde_json::from_str(text)?;
        if command.is_empty() {
            return Err(PayloadError::EmptyCommand);
        }
        Ok(command)
    }
}

fn deserialize_state<'de, D>(deserializer: D) -> Result<Option<PowerState>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| raw.parse().map_err(serde::de::Error::custom))
        .transpose()
}
