// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Script and topic bindings of a light.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque reference to a script on the automation service.
///
/// For Home Assistant this is an entity id such as `script.ir_light_on`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptRef(String);

impl ScriptRef {
    /// Creates a script reference.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self(entity_id.into())
    }

    /// Returns the entity id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when no script name was configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four remote operations a light exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptBindings {
    /// Turns the light on.
    pub on_service: ScriptRef,
    /// Turns the light off.
    pub off_service: ScriptRef,
    /// Steps brightness up by one level.
    pub brightness_up_service: ScriptRef,
    /// Steps brightness down by one level.
    pub brightness_down_service: ScriptRef,
}

/// Transport topics a light is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicBindings {
    /// Inbound structured commands.
    pub set_topic: String,
    /// Outbound committed state.
    pub state_topic: String,
    /// Inbound lux readings.
    pub brightness_topic: String,
}

impl TopicBindings {
    /// Derives `<base>/set` and `<base>/state` from a light base topic.
    ///
    /// # Examples
    ///
    /// ```
    /// use virtual_ir_light::types::TopicBindings;
    ///
    /// let topics = TopicBindings::from_base("home/living/light", "home/living/lux");
    /// assert_eq!(topics.set_topic, "home/living/light/set");
    /// assert_eq!(topics.state_topic, "home/living/light/state");
    /// ```
    #[must_use]
    pub fn from_base(light_topic: &str, brightness_topic: impl Into<String>) -> Self {
        let base = light_topic.trim_end_matches('/');
        Self {
            set_topic: format!("{base}/set"),
            state_topic: format!("{base}/state"),
            brightness_topic: brightness_topic.into(),
        }
    }
}
