// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the virtual light bridge.
//!
//! The hierarchy mirrors the four failure domains of the bridge:
//! configuration loading, the publish/subscribe transport, remote
//! actuation and inbound payload decoding. Only
//! [`TransportError::ReconnectExhausted`] is fatal; everything else is
//! caught at the message-dispatch boundary and logged.

use std::sync::Arc;

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connect, publish or subscribe failure on the transport.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The automation service did not carry out a command.
    #[error("actuation error: {0}")]
    Actuation(#[from] ActuationError),

    /// An inbound message could not be decoded.
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),
}

/// Errors detected while loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("cannot read settings: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON for the expected layout.
    #[error("invalid settings document: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is absent.
    #[error("missing field: {0}")]
    MissingField(String),

    /// A quantization table has no ranges.
    #[error("quantization table is empty")]
    EmptyQuantizationTable,

    /// A quantization range has `min > max` or a NaN bound.
    #[error("invalid range for level {level}: [{min}, {max})")]
    InvalidRange {
        /// Level the range maps to.
        level: u8,
        /// Inclusive lower bound.
        min: f64,
        /// Exclusive upper bound.
        max: f64,
    },

    /// A quantization key is not an integer level in `0..=255`.
    #[error("invalid level key: {0}")]
    InvalidLevel(String),

    /// A quantization table could not be decoded.
    #[error("invalid quantization table in `{field}`: {source}")]
    InvalidTable {
        /// Settings key holding the table.
        field: String,
        /// Decoding failure, shared by every light falling back to the table.
        source: Arc<serde_json::Error>,
    },

    /// No light survived validation.
    #[error("no usable light configured")]
    NoLights,

    /// Two lights share the same id.
    #[error("duplicate light id: {0}")]
    DuplicateLight(String),

    /// A schedule entry could not be parsed.
    #[error("invalid schedule entry: {0}")]
    InvalidSchedule(String),
}

/// Errors raised by the publish/subscribe transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Every reconnection attempt failed; the session needs a manual restart.
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// Errors raised while driving the remote automation service.
#[derive(Debug, Error)]
pub enum ActuationError {
    /// HTTP request failed before a status was received.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service rejected the call with status {status}")]
    Rejected {
        /// HTTP status code returned.
        status: u16,
    },

    /// The script reference is empty.
    #[error("script not configured: {0}")]
    ScriptNotConfigured(String),

    /// A multi-step batch failed after some calls had already been sent.
    #[error("batch failed after {completed} of {requested} calls: {source}")]
    PartialBatch {
        /// Calls that succeeded before the failure.
        completed: u32,
        /// Calls requested for the batch.
        requested: u32,
        /// The failure that stopped the batch.
        #[source]
        source: Box<ActuationError>,
    },
}

/// Errors raised while decoding an inbound message.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Payload is not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    /// Structured payload is not valid JSON for a command.
    #[error("invalid command: {0}")]
    Json(#[from] serde_json::Error),

    /// Sensor payload is not a decimal number.
    #[error("not a numeric reading: {0:?}")]
    NotNumeric(String),

    /// Sensor payload is NaN or infinite.
    #[error("reading is not finite")]
    NonFinite,

    /// Command `state` is neither ON nor OFF.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Command carries neither `state` nor `brightness`.
    #[error("command has neither state nor brightness")]
    EmptyCommand,
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
