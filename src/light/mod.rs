// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The virtual light and its reconciliation engine.
//!
//! A [`Light`] records what the bridge believes about one physical light:
//! its on/off state, its discrete brightness level and an optional
//! brightness target deferred until the next sensor reading. The
//! [`LightStateMachine`] is the only thing allowed to change it.
//!
//! # Commit rule
//!
//! A transition becomes visible (recorded and published) only after the
//! actuation it needs succeeded. A failed actuation leaves the light
//! exactly as it was.

mod machine;

pub use machine::LightStateMachine;

use crate::quantization::QuantizationTable;
use crate::telemetry::StatePayload;
use crate::types::{Level, LightState, ScriptBindings, TopicBindings};

/// Everything needed to construct a light, resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LightDefinition {
    /// Stable identifier, unique per deployment.
    pub id: String,
    /// Transport topics.
    pub topics: TopicBindings,
    /// Remote scripts.
    pub scripts: ScriptBindings,
    /// Lux to level mapping.
    pub table: QuantizationTable,
    /// Whether published state carries `lightId`.
    pub tag_telemetry: bool,
}

/// Recorded state of one light.
#[derive(Debug, Clone)]
pub struct Light {
    id: String,
    state: LightState,
    level: Level,
    pending_level: Option<Level>,
    topics: TopicBindings,
    scripts: ScriptBindings,
    table: QuantizationTable,
    tag_telemetry: bool,
}

impl Light {
    /// Creates a light in the boot state: `Unknown`, level 0, nothing pending.
    #[must_use]
    pub fn new(definition: LightDefinition) -> Self {
        Self {
            id: definition.id,
            state: LightState::Unknown,
            level: 0,
            pending_level: None,
            topics: definition.topics,
            scripts: definition.scripts,
            table: definition.table,
            tag_telemetry: definition.tag_telemetry,
        }
    }

    /// Returns the light identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the recorded state.
    #[must_use]
    pub fn state(&self) -> LightState {
        self.state
    }

    /// Returns the recorded level.
    ///
    /// Retained while the light is off so it can be restored.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Returns the deferred brightness target, if any.
    #[must_use]
    pub fn pending_level(&self) -> Option<Level> {
        self.pending_level
    }

    /// Returns the transport topics.
    #[must_use]
    pub fn topics(&self) -> &TopicBindings {
        &self.topics
    }

    /// Returns the remote scripts.
    #[must_use]
    pub fn scripts(&self) -> &ScriptBindings {
        &self.scripts
    }

    /// Returns the quantization table.
    #[must_use]
    pub fn table(&self) -> &QuantizationTable {
        &self.table
    }

    /// Returns the highest level this light accepts.
    #[must_use]
    pub fn max_level(&self) -> Level {
        self.table.max_level()
    }

    /// Builds the telemetry payload for the current state.
    #[must_use]
    pub fn snapshot(&self) -> StatePayload {
        let payload = StatePayload::new(self.state.reported(), self.level);
        if self.tag_telemetry {
            payload.with_light_id(self.id.clone())
        } else {
            payload
        }
    }
}

/// Result of a transition request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing needed to change; no actuation and no telemetry.
    Unchanged,
    /// A new state was recorded and published.
    Committed,
    /// The state flip was committed and the brightness target deferred.
    Deferred,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::quantization::LuxRange;
    use crate::types::{PowerState, ScriptRef};

    pub(crate) fn definition(id: &str, tag_telemetry: bool) -> LightDefinition {
        LightDefinition {
            id: id.to_string(),
            topics: TopicBindings::from_base(&format!("{id}/light"), format!("{id}/lux")),
            scripts: ScriptBindings {
                on_service: ScriptRef::new("script.on"),
                off_service: ScriptRef::new("script.off"),
                brightness_up_service: ScriptRef::new("script.up"),
                brightness_down_service: ScriptRef::new("script.down"),
            },
            table: QuantizationTable::new([
                (0, LuxRange::new(0.0, 1.0)),
                (1, LuxRange::new(1.0, 10.0)),
                (3, LuxRange::new(10.0, 50.0)),
                (5, LuxRange::new(50.0, 100.0)),
            ])
            .unwrap(),
            tag_telemetry,
        }
    }

    #[test]
    fn new_light_starts_unknown() {
        let light = Light::new(definition("desk", false));
        assert_eq!(light.state(), LightState::Unknown);
        assert_eq!(light.level(), 0);
        assert_eq!(light.pending_level(), None);
        assert_eq!(light.max_level(), 5);
    }

    #[test]
    fn snapshot_reports_unknown_as_off() {
        let light = Light::new(definition("desk", false));
        assert_eq!(light.snapshot(), StatePayload::new(PowerState::Off, 0));
    }

    #[test]
    fn snapshot_tags_light_id() {
        let light = Light::new(definition("desk", true));
        assert_eq!(light.snapshot().light_id.as_deref(), Some("desk"));
    }
}
