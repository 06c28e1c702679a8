// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared across the bridge.
//!
//! # Types
//!
//! - [`PowerState`] - ON/OFF as requested by commands and reported on the wire
//! - [`LightState`] - Recorded state, including `Unknown` before first observation
//! - [`Level`] - Discrete brightness level
//! - [`ScriptRef`], [`ScriptBindings`] - Remote operations of a light
//! - [`TopicBindings`] - Transport topics of a light

mod bindings;
mod power;

pub use bindings::{ScriptBindings, ScriptRef, TopicBindings};
pub use power::{LightState, PowerState};

/// Discrete brightness level understood by the virtual entity.
pub type Level = u8;
