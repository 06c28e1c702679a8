// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transition logic and the deferred-brightness protocol.

use std::sync::Arc;

use crate::actuation::{Actuator, Direction, Pacing};
use crate::error::ActuationError;
use crate::light::{Light, LightDefinition, Outcome};
use crate::telemetry::TelemetryPublisher;
use crate::transport::payload::LightCommand;
use crate::types::{Level, LightState, PowerState};

/// Per-light authority over `{state, level, pending_level}`.
///
/// Every method takes `&mut self`, so at most one transition per light is
/// in flight. Actuation batches run to completion before the next event
/// is processed.
///
/// # Deferred brightness
///
/// When a command changes both state and brightness, only the state flip
/// is actuated. The brightness target is stored and applied on the next
/// sensor reading, once the physical base level has been observed again.
pub struct LightStateMachine<A> {
    light: Light,
    actuator: Arc<A>,
    telemetry: TelemetryPublisher,
    pacing: Pacing,
}

impl<A: Actuator> LightStateMachine<A> {
    /// Creates a state machine for a freshly booted light.
    #[must_use]
    pub fn new(
        definition: LightDefinition,
        actuator: Arc<A>,
        telemetry: TelemetryPublisher,
        pacing: Pacing,
    ) -> Self {
        Self {
            light: Light::new(definition),
            actuator,
            telemetry,
            pacing,
        }
    }

    /// Returns the recorded light.
    #[must_use]
    pub fn light(&self) -> &Light {
        &self.light
    }

    /// Turns the light on or off.
    ///
    /// No-op when the light is already in `target` state.
    ///
    /// # Errors
    ///
    /// Returns `ActuationError` if the on/off script failed; the recorded
    /// state is unchanged and nothing is published.
    pub async fn set_state(&mut self, target: PowerState) -> Result<Outcome, ActuationError> {
        if self.light.state == target {
            tracing::debug!(light = %self.light.id, state = %target, "State already set");
            return Ok(Outcome::Unchanged);
        }

        let script = match target {
            PowerState::On => &self.light.scripts.on_service,
            PowerState::Off => &self.light.scripts.off_service,
        };
        self.actuator.execute(script, 1).await?;

        tracing::info!(
            light = %self.light.id,
            from = %self.light.state,
            to = %target,
            "State committed"
        );
        self.light.state = LightState::from(target);
        self.publish();
        Ok(Outcome::Committed)
    }

    /// Moves the light to `level` with step commands.
    ///
    /// A light that is not on is turned on first when `level > 0`. With
    /// `force` the state is committed and published even if the level
    /// already matches.
    ///
    /// # Errors
    ///
    /// Returns `ActuationError` if turning on or the step batch failed. The
    /// recorded level is unchanged; a successful turn-on stays committed.
    pub async fn set_brightness(
        &mut self,
        level: Level,
        force: bool,
    ) -> Result<Outcome, ActuationError> {
        let level = self.clamp(level);
        if level == self.light.level && !force {
            tracing::debug!(light = %self.light.id, level, "Brightness already set");
            return Ok(Outcome::Unchanged);
        }

        if !self.light.state.is_on() && level > 0 {
            self.set_state(PowerState::On).await?;
        }

        if let Some((direction, steps)) = Direction::between(self.light.level, level) {
            let script = direction.script(&self.light.scripts);
            self.actuator.execute(script, steps).await?;
            tokio::time::sleep(self.pacing.settle_time(steps)).await;
        }

        tracing::info!(
            light = %self.light.id,
            from = self.light.level,
            to = level,
            "Brightness committed"
        );
        self.light.level = level;
        self.publish();
        Ok(Outcome::Committed)
    }

    /// Applies a combined state and brightness request.
    ///
    /// - only the state differs: the state is changed
    /// - only the level differs, or a dark light is asked for a nonzero
    ///   level: the brightness path runs
    /// - both differ: the state is changed and the level deferred
    ///
    /// # Errors
    ///
    /// Returns `ActuationError` if the actuation needed failed.
    pub async fn set_combined(
        &mut self,
        state: Option<PowerState>,
        level: Option<Level>,
    ) -> Result<Outcome, ActuationError> {
        let level = level.map(|l| self.clamp(l));
        let state_differs = state.is_some_and(|s| self.light.state != s);
        let level_differs = level.is_some_and(|l| l != self.light.level);

        match (state, level) {
            (None, None) => {
                tracing::warn!(light = %self.light.id, "Ignoring command without state or brightness");
                Ok(Outcome::Unchanged)
            }
            (Some(target), Some(target_level)) if state_differs && level_differs => {
                self.set_state(target).await?;
                if let Some(previous) = self.light.pending_level.replace(target_level) {
                    tracing::debug!(
                        light = %self.light.id,
                        previous,
                        "Replacing deferred brightness"
                    );
                }
                tracing::info!(
                    light = %self.light.id,
                    level = target_level,
                    "Brightness deferred until next reading"
                );
                Ok(Outcome::Deferred)
            }
            (Some(target), _) if state_differs => self.set_state(target).await,
            (_, Some(target_level))
                if level_differs || (!self.light.state.is_on() && target_level > 0) =>
            {
                let force = !self.light.state.is_on();
                self.set_brightness(target_level, force).await
            }
            _ => Ok(Outcome::Unchanged),
        }
    }

    /// Applies a decoded command.
    ///
    /// # Errors
    ///
    /// Returns `ActuationError` if the actuation needed failed.
    pub async fn handle_command(&mut self, command: &LightCommand) -> Result<Outcome, ActuationError> {
        self.set_combined(command.state, command.brightness).await
    }

    /// Reconciles the light with a sensor reading.
    ///
    /// With a deferred target pending, the target is applied (forced) and
    /// cleared whatever the result; a failure is logged and not retried.
    /// Otherwise the reading is ground truth: state and level are taken
    /// from it and published without any actuation.
    pub async fn handle_sensor_reading(&mut self, reading: f64) -> Outcome {
        let quantized = self.light.table.quantize(reading);
        tracing::debug!(light = %self.light.id, reading, level = quantized, "Reading quantized");

        if let Some(pending) = self.light.pending_level.take() {
            tracing::info!(light = %self.light.id, level = pending, "Applying deferred brightness");
            return match self.set_brightness(pending, true).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        light = %self.light.id,
                        level = pending,
                        error = %e,
                        "Deferred brightness failed, dropping it"
                    );
                    Outcome::Unchanged
                }
            };
        }

        self.light.state = if quantized > 0 {
            LightState::On
        } else {
            LightState::Off
        };
        self.light.level = quantized;
        self.publish();
        Outcome::Committed
    }

    fn clamp(&self, level: Level) -> Level {
        let max = self.light.max_level();
        if level > max {
            tracing::warn!(light = %self.light.id, level, max, "Clamping brightness to maximum");
            max
        } else {
            level
        }
    }

    fn publish(&self) {
        self.telemetry
            .publish(&self.light.topics.state_topic, &self.light.snapshot());
    }
}

impl<A> std::fmt::Debug for LightStateMachine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightStateMachine")
            .field("light", &self.light)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::TransportError;
    use crate::light::tests::definition;
    use crate::telemetry::{StatePayload, TelemetrySink};
    use crate::types::ScriptRef;

    #[derive(Default)]
    struct FakeActuator {
        calls: Mutex<Vec<(String, u32)>>,
        fail_on: Mutex<Option<String>>,
    }

    impl FakeActuator {
        fn calls(&self) -> Vec<(String, u32)> {
            self.calls.lock().unwrap().clone()
        }

        fn fail_on(&self, script: &str) {
            *self.fail_on.lock().unwrap() = Some(script.to_string());
        }
    }

    impl Actuator for FakeActuator {
        async fn execute(&self, script: &ScriptRef, repeat: u32) -> Result<(), ActuationError> {
            self.calls
                .lock()
                .unwrap()
                .push((script.to_string(), repeat));
            if self.fail_on.lock().unwrap().as_deref() == Some(script.as_str()) {
                return Err(ActuationError::Rejected { status: 500 });
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Sink(Mutex<Vec<StatePayload>>);

    impl TelemetrySink for Sink {
        fn publish(&self, _topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
            self.0
                .lock()
                .unwrap()
                .push(serde_json::from_slice(&payload).unwrap());
            Ok(())
        }
    }

    fn machine() -> (
        LightStateMachine<FakeActuator>,
        Arc<FakeActuator>,
        Arc<Sink>,
    ) {
        let actuator = Arc::new(FakeActuator::default());
        let sink = Arc::new(Sink::default());
        let machine = LightStateMachine::new(
            definition("desk", false),
            actuator.clone(),
            TelemetryPublisher::new(sink.clone()),
            Pacing::immediate(),
        );
        (machine, actuator, sink)
    }

    fn machine_at(state: PowerState, level: Level) -> (
        LightStateMachine<FakeActuator>,
        Arc<FakeActuator>,
        Arc<Sink>,
    ) {
        let (mut machine, actuator, sink) = machine();
        machine.light.state = state.into();
        machine.light.level = level;
        (machine, actuator, sink)
    }

    #[tokio::test]
    async fn set_state_same_state_is_no_op() {
        let (mut machine, actuator, sink) = machine_at(PowerState::On, 3);

        let outcome = machine.set_state(PowerState::On).await.unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert!(actuator.calls().is_empty());
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_state_from_unknown_actuates() {
        let (mut machine, actuator, sink) = machine();

        machine.set_state(PowerState::Off).await.unwrap();

        assert_eq!(actuator.calls(), vec![("script.off".to_string(), 1)]);
        assert_eq!(machine.light().state(), LightState::Off);
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn set_state_failure_keeps_state() {
        let (mut machine, actuator, sink) = machine_at(PowerState::Off, 2);
        actuator.fail_on("script.on");

        assert!(machine.set_state(PowerState::On).await.is_err());

        assert_eq!(machine.light().state(), LightState::Off);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_brightness_steps_in_direction() {
        let (mut machine, actuator, _) = machine_at(PowerState::On, 1);

        machine.set_brightness(4, false).await.unwrap();
        machine.set_brightness(2, false).await.unwrap();

        assert_eq!(
            actuator.calls(),
            vec![("script.up".to_string(), 3), ("script.down".to_string(), 2)]
        );
        assert_eq!(machine.light().level(), 2);
    }

    #[tokio::test]
    async fn set_brightness_turns_dark_light_on_first() {
        let (mut machine, actuator, sink) = machine_at(PowerState::Off, 1);

        machine.set_brightness(3, false).await.unwrap();

        assert_eq!(
            actuator.calls(),
            vec![("script.on".to_string(), 1), ("script.up".to_string(), 2)]
        );
        let published = sink.0.lock().unwrap().clone();
        assert_eq!(published.last(), Some(&StatePayload::new(PowerState::On, 3)));
    }

    #[tokio::test]
    async fn set_brightness_aborts_when_turn_on_fails() {
        let (mut machine, actuator, _) = machine_at(PowerState::Off, 1);
        actuator.fail_on("script.on");

        assert!(machine.set_brightness(3, false).await.is_err());

        assert_eq!(actuator.calls().len(), 1);
        assert_eq!(machine.light().level(), 1);
    }

    #[tokio::test]
    async fn set_brightness_clamps_to_max_level() {
        let (mut machine, actuator, _) = machine_at(PowerState::On, 3);

        machine.set_brightness(200, false).await.unwrap();

        assert_eq!(actuator.calls(), vec![("script.up".to_string(), 2)]);
        assert_eq!(machine.light().level(), 5);
    }

    #[tokio::test]
    async fn forced_brightness_publishes_without_steps() {
        let (mut machine, actuator, sink) = machine_at(PowerState::On, 3);

        let outcome = machine.set_brightness(3, true).await.unwrap();

        assert_eq!(outcome, Outcome::Committed);
        assert!(actuator.calls().is_empty());
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn combined_state_only() {
        let (mut machine, actuator, _) = machine_at(PowerState::On, 3);

        machine
            .set_combined(Some(PowerState::Off), Some(3))
            .await
            .unwrap();

        assert_eq!(actuator.calls(), vec![("script.off".to_string(), 1)]);
        assert_eq!(machine.light().pending_level(), None);
    }

    #[tokio::test]
    async fn combined_level_only() {
        let (mut machine, actuator, _) = machine_at(PowerState::On, 3);

        machine.set_combined(None, Some(1)).await.unwrap();

        assert_eq!(actuator.calls(), vec![("script.down".to_string(), 2)]);
    }

    #[tokio::test]
    async fn combined_nonzero_level_on_dark_light_turns_it_on() {
        let (mut machine, actuator, _) = machine_at(PowerState::Off, 3);

        let outcome = machine.set_combined(None, Some(3)).await.unwrap();

        assert_eq!(outcome, Outcome::Committed);
        assert_eq!(actuator.calls(), vec![("script.on".to_string(), 1)]);
        assert_eq!(machine.light().state(), LightState::On);
    }

    #[tokio::test]
    async fn combined_off_with_new_level_on_dark_light_steps() {
        let (mut machine, actuator, sink) = machine_at(PowerState::Off, 1);

        let outcome = machine
            .set_combined(Some(PowerState::Off), Some(3))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Committed);
        assert_eq!(
            actuator.calls(),
            vec![("script.on".to_string(), 1), ("script.up".to_string(), 2)]
        );
        assert_eq!(machine.light().level(), 3);
        assert_eq!(machine.light().state(), LightState::On);
        assert_eq!(
            sink.0.lock().unwrap().last(),
            Some(&StatePayload::new(PowerState::On, 3))
        );
    }

    #[tokio::test]
    async fn combined_off_with_same_level_on_dark_light_turns_it_on() {
        let (mut machine, actuator, _) = machine_at(PowerState::Off, 3);

        let outcome = machine
            .set_combined(Some(PowerState::Off), Some(3))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Committed);
        assert_eq!(actuator.calls(), vec![("script.on".to_string(), 1)]);
    }

    #[tokio::test]
    async fn combined_off_with_zero_level_on_dark_light_is_no_op() {
        let (mut machine, actuator, _) = machine_at(PowerState::Off, 0);

        let outcome = machine
            .set_combined(Some(PowerState::Off), Some(0))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert!(actuator.calls().is_empty());
    }

    #[tokio::test]
    async fn combined_both_differ_defers_level() {
        let (mut machine, actuator, _) = machine_at(PowerState::Off, 1);

        let outcome = machine
            .set_combined(Some(PowerState::On), Some(4))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Deferred);
        assert_eq!(actuator.calls(), vec![("script.on".to_string(), 1)]);
        assert_eq!(machine.light().pending_level(), Some(4));
        assert_eq!(machine.light().level(), 1);
    }

    #[tokio::test]
    async fn combined_failed_state_flip_does_not_defer() {
        let (mut machine, actuator, _) = machine_at(PowerState::Off, 1);
        actuator.fail_on("script.on");

        assert!(
            machine
                .set_combined(Some(PowerState::On), Some(4))
                .await
                .is_err()
        );
        assert_eq!(machine.light().pending_level(), None);
    }

    #[tokio::test]
    async fn latest_deferred_level_wins() {
        let (mut machine, _, _) = machine_at(PowerState::Off, 1);

        machine
            .set_combined(Some(PowerState::On), Some(4))
            .await
            .unwrap();
        machine
            .set_combined(Some(PowerState::Off), Some(2))
            .await
            .unwrap();

        assert_eq!(machine.light().pending_level(), Some(2));
    }

    #[tokio::test]
    async fn empty_combined_is_no_op() {
        let (mut machine, actuator, _) = machine();
        assert_eq!(
            machine.set_combined(None, None).await.unwrap(),
            Outcome::Unchanged
        );
        assert!(actuator.calls().is_empty());
    }

    #[tokio::test]
    async fn reading_is_ground_truth_without_pending() {
        let (mut machine, actuator, sink) = machine();

        assert_eq!(machine.handle_sensor_reading(30.0).await, Outcome::Committed);
        assert_eq!(machine.light().state(), LightState::On);
        assert_eq!(machine.light().level(), 3);

        machine.handle_sensor_reading(0.2).await;
        assert_eq!(machine.light().state(), LightState::Off);
        assert_eq!(machine.light().level(), 0);

        assert!(actuator.calls().is_empty());
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reading_applies_pending_level_once() {
        let (mut machine, actuator, _) = machine_at(PowerState::Off, 1);
        machine
            .set_combined(Some(PowerState::On), Some(4))
            .await
            .unwrap();

        machine.handle_sensor_reading(75.0).await;

        assert_eq!(machine.light().level(), 4);
        assert_eq!(machine.light().pending_level(), None);
        assert_eq!(
            actuator.calls(),
            vec![("script.on".to_string(), 1), ("script.up".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn failed_pending_apply_is_dropped() {
        let (mut machine, actuator, _) = machine_at(PowerState::Off, 1);
        machine
            .set_combined(Some(PowerState::On), Some(4))
            .await
            .unwrap();
        actuator.fail_on("script.up");

        let outcome = machine.handle_sensor_reading(75.0).await;

        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(machine.light().pending_level(), None);
        assert_eq!(machine.light().level(), 1);
    }

    #[tokio::test]
    async fn handle_command_delegates_to_combined() {
        let (mut machine, actuator, _) = machine_at(PowerState::On, 2);

        let command = LightCommand::new().with_brightness(3);
        machine.handle_command(&command).await.unwrap();

        assert_eq!(actuator.calls(), vec![("script.up".to_string(), 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_time_follows_step_count() {
        let actuator = Arc::new(FakeActuator::default());
        let sink = Arc::new(Sink::default());
        let mut machine = LightStateMachine::new(
            definition("desk", false),
            actuator,
            TelemetryPublisher::new(sink),
            Pacing::default(),
        );
        machine.light.state = LightState::On;

        let start = tokio::time::Instant::now();
        machine.set_brightness(2, false).await.unwrap();
        assert_eq!(start.elapsed(), std::time::Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        machine.set_brightness(0, false).await.unwrap();
        assert_eq!(start.elapsed(), std::time::Duration::from_secs(1));
    }
}
