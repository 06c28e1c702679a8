// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the Home Assistant gateway using wiremock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use virtual_ir_light::actuation::{Actuator, HomeAssistantConfig, HomeAssistantGateway, Pacing};
use virtual_ir_light::light::{LightDefinition, LightStateMachine};
use virtual_ir_light::quantization::{LuxRange, QuantizationTable};
use virtual_ir_light::telemetry::{TelemetryPublisher, TelemetrySink};
use virtual_ir_light::types::{PowerState, ScriptBindings, ScriptRef, TopicBindings};
use virtual_ir_light::{ActuationError, LightState, TransportError};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

const SERVICE_PATH: &str = "/api/services/script/turn_on";

fn gateway(server: &MockServer) -> HomeAssistantGateway {
    HomeAssistantConfig::new(server.uri(), "secret-token")
        .with_step_interval(Duration::ZERO)
        .into_gateway()
        .unwrap()
}

fn script_call(script: &str) -> MockBuilder {
    Mock::given(method("POST"))
        .and(path(SERVICE_PATH))
        .and(header("Authorization", "Bearer secret-token"))
        .and(body_json(serde_json::json!({ "entity_id": script })))
}

// ============================================================================
// Gateway Tests
// ============================================================================

mod gateway {
    use super::*;

    #[tokio::test]
    async fn single_call_sends_bearer_and_entity_id() {
        let server = MockServer::start().await;
        script_call("script.ir_on")
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let result = gateway(&server)
            .execute(&ScriptRef::new("script.ir_on"), 1)
            .await;

        assert!(result.is_ok(), "call failed: {:?}", result.err());
    }

    #[tokio::test]
    async fn batch_repeats_the_call() {
        let server = MockServer::start().await;
        script_call("script.ir_up")
            .respond_with(ResponseTemplate::new(200))
            .expect(4)
            .mount(&server)
            .await;

        gateway(&server)
            .execute(&ScriptRef::new("script.ir_up"), 4)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_200_status_is_a_failure() {
        let server = MockServer::start().await;
        script_call("script.ir_off")
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let result = gateway(&server)
            .execute(&ScriptRef::new("script.ir_off"), 1)
            .await;

        assert!(matches!(result, Err(ActuationError::Rejected { status: 201 })));
    }

    #[tokio::test]
    async fn batch_stops_at_first_failure() {
        let server = MockServer::start().await;
        script_call("script.ir_down")
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        script_call("script.ir_down")
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = gateway(&server)
            .execute(&ScriptRef::new("script.ir_down"), 5)
            .await;

        match result {
            Err(ActuationError::PartialBatch {
                completed,
                requested,
                source,
            }) => {
                assert_eq!(completed, 2);
                assert_eq!(requested, 5);
                assert!(matches!(*source, ActuationError::Rejected { status: 500 }));
            }
            other => panic!("Expected partial batch failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_an_http_error() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let gateway = HomeAssistantConfig::new(uri, "secret-token")
            .with_step_interval(Duration::ZERO)
            .with_timeout(Duration::from_secs(2))
            .into_gateway()
            .unwrap();

        let result = gateway.execute(&ScriptRef::new("script.ir_on"), 1).await;
        assert!(matches!(result, Err(ActuationError::Http(_))));
    }

    #[tokio::test]
    async fn pacing_waits_after_each_call() {
        let server = MockServer::start().await;
        script_call("script.ir_up")
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let gateway = HomeAssistantConfig::new(server.uri(), "secret-token")
            .with_step_interval(Duration::from_millis(50))
            .into_gateway()
            .unwrap();

        let start = std::time::Instant::now();
        gateway
            .execute(&ScriptRef::new("script.ir_up"), 3)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(150));
    }
}

// ============================================================================
// State Machine over HTTP
// ============================================================================

mod state_machine {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Vec<u8>>>);

    impl TelemetrySink for Recorder {
        fn publish(&self, _topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
            self.0.lock().unwrap().push(payload);
            Ok(())
        }
    }

    fn definition() -> LightDefinition {
        LightDefinition {
            id: "living".to_string(),
            topics: TopicBindings::from_base("home/ir_light", "home/lux"),
            scripts: ScriptBindings {
                on_service: ScriptRef::new("script.ir_on"),
                off_service: ScriptRef::new("script.ir_off"),
                brightness_up_service: ScriptRef::new("script.ir_up"),
                brightness_down_service: ScriptRef::new("script.ir_down"),
            },
            table: QuantizationTable::new([
                (1, LuxRange::new(0.0, 10.0)),
                (2, LuxRange::new(10.0, 50.0)),
                (3, LuxRange::new(50.0, 100.0)),
                (4, LuxRange::new(100.0, f64::INFINITY)),
            ])
            .unwrap(),
            tag_telemetry: false,
        }
    }

    #[tokio::test]
    async fn brightness_request_turns_on_then_steps() {
        let server = MockServer::start().await;
        script_call("script.ir_on")
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        script_call("script.ir_up")
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        let recorder = Arc::new(Recorder::default());
        let mut machine = LightStateMachine::new(
            definition(),
            Arc::new(gateway(&server)),
            TelemetryPublisher::new(recorder.clone()),
            Pacing::immediate(),
        );

        machine.set_brightness(3, false).await.unwrap();

        assert_eq!(machine.light().state(), LightState::On);
        assert_eq!(machine.light().level(), 3);
        let published = recorder.0.lock().unwrap();
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(published.last().unwrap()).unwrap(),
            serde_json::json!({"state": "ON", "brightness": 3})
        );
    }

    #[tokio::test]
    async fn rejected_step_keeps_level() {
        let server = MockServer::start().await;
        script_call("script.ir_on")
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        script_call("script.ir_up")
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let recorder = Arc::new(Recorder::default());
        let mut machine = LightStateMachine::new(
            definition(),
            Arc::new(gateway(&server)),
            TelemetryPublisher::new(recorder.clone()),
            Pacing::immediate(),
        );
        machine.set_state(PowerState::On).await.unwrap();

        let result = machine.set_brightness(4, false).await;

        assert!(result.is_err());
        assert_eq!(machine.light().level(), 0);
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }
}
