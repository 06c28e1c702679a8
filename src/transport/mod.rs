// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Publish/subscribe transport.
//!
//! - [`payload`] decodes inbound sensor readings and commands
//! - [`ReconnectionPolicy`] computes backoff between reconnection attempts
//! - [`TransportSession`] keeps the MQTT connection alive (feature `mqtt`)

pub mod payload;
mod reconnect;

#[cfg(feature = "mqtt")]
mod session;

pub use reconnect::{ReconnectSettings, ReconnectionPolicy};

#[cfg(feature = "mqtt")]
pub use session::{SessionHandle, TransportSession, TransportSessionBuilder};
