// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound state telemetry.
//!
//! After every committed transition, and after every sensor-driven
//! reconciliation, the engine publishes the canonical state of the light
//! on its state topic:
//!
//! ```json
//! {"state": "ON", "brightness": 3, "lightId": "living"}
//! ```
//!
//! `lightId` is only present in multi-light deployments. Publication is
//! fire-and-forget: a failed publish is logged and never touches the
//! recorded light state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::types::{Level, PowerState};

/// Committed state of a light as it appears on the wire.
///
/// # Examples
///
/// ```
/// use virtual_ir_light::telemetry::StatePayload;
/// use virtual_ir_light::types::PowerState;
///
/// let payload = StatePayload::new(PowerState::On, 3);
/// assert_eq!(
///     serde_json::to_string(&payload).unwrap(),
///     r#"{"state":"ON","brightness":3}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePayload {
    /// Reported on/off state.
    pub state: PowerState,
    /// Current brightness level.
    pub brightness: Level,
    /// Light identifier, multi-light deployments only.
    #[serde(rename = "lightId", default, skip_serializing_if = "Option::is_none")]
    pub light_id: Option<String>,
}

impl StatePayload {
    /// Creates a payload without a light identifier.
    #[must_use]
    pub fn new(state: PowerState, brightness: Level) -> Self {
        Self {
            state,
            brightness,
            light_id: None,
        }
    }

    /// Tags the payload with a light identifier.
    #[must_use]
    pub fn with_light_id(mut self, id: impl Into<String>) -> Self {
        self.light_id = Some(id.into());
        self
    }
}

/// Destination for serialized telemetry.
///
/// The MQTT client is the production sink. Implementations must not block:
/// the engine calls this from the dispatch path.
pub trait TelemetrySink: Send + Sync {
    /// Queues `payload` for publication on `topic`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the payload could not be queued.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Arc<S> {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        (**self).publish(topic, payload)
    }
}

#[cfg(feature = "mqtt")]
impl TelemetrySink for rumqttc::AsyncClient {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.try_publish(topic, rumqttc::QoS::AtLeastOnce, false, payload)
            .map_err(TransportError::Mqtt)
    }
}

/// Serializes state payloads and hands them to a [`TelemetrySink`].
#[derive(Clone)]
pub struct TelemetryPublisher {
    sink: Arc<dyn TelemetrySink>,
}

impl TelemetryPublisher {
    /// Creates a publisher writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }

    /// Publishes `payload` on `topic`.
    ///
    /// Returns `true` if the sink accepted the message. Failures are logged.
    pub fn publish(&self, topic: &str, payload: &StatePayload) -> bool {
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Failed to serialize state");
                return false;
            }
        };

        match self.sink.publish(topic, bytes) {
            Ok(()) => {
                tracing::debug!(
                    topic = %topic,
                    state = %payload.state,
                    brightness = payload.brightness,
                    "State published"
                );
                true
            }
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Failed to publish state");
                false
            }
        }
    }
}

impl std::fmt::Debug for TelemetryPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryPublisher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    impl TelemetrySink for Recorder {
        fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::ChannelClosed("sink closed".to_string()));
            }
            self.messages
                .lock()
                .unwrap()
                .push((topic.to_string(), payload));
            Ok(())
        }
    }

    #[test]
    fn payload_includes_light_id_when_set() {
        let payload = StatePayload::new(PowerState::Off, 0).with_light_id("hall");
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"state":"OFF","brightness":0,"lightId":"hall"}"#);
    }

    #[test]
    fn payload_deserializes_without_light_id() {
        let payload: StatePayload =
            serde_json::from_str(r#"{"state":"ON","brightness":4}"#).unwrap();
        assert_eq!(payload, StatePayload::new(PowerState::On, 4));
    }

    #[test]
    fn publisher_writes_to_sink() {
        let recorder = Arc::new(Recorder::default());
        let publisher = TelemetryPublisher::new(recorder.clone());

        assert!(publisher.publish("light/state", &StatePayload::new(PowerState::On, 2)));

        let messages = recorder.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "light/state");
        let sent: StatePayload = serde_json::from_slice(&messages[0].1).unwrap();
        assert_eq!(sent.brightness, 2);
    }

    #[test]
    fn publisher_reports_sink_failure() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let publisher = TelemetryPublisher::new(recorder);

        assert!(!publisher.publish("light/state", &StatePayload::new(PowerState::On, 2)));
    }
}
