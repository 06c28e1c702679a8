// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Virtual IR Light - bridge a virtual MQTT light to an infrared-remote light.
//!
//! The physical light is driven by four Home Assistant scripts (on, off,
//! one step up, one step down) and reports nothing back. This library
//! exposes it as a virtual entity with an on/off state and a discrete
//! brightness level, kept in line with reality by a lux sensor.
//!
//! # Features
//!
//! - **Quantization**: lux readings mapped to brightness levels
//! - **Step actuation**: level changes turned into paced step batches
//! - **Deferred brightness**: combined state+brightness changes wait for
//!   sensor confirmation of the state flip
//! - **Resilient transport**: MQTT session with exponential reconnection backoff
//! - **Multi-light**: one process can drive several lights
//!
//! # Cargo Features
//!
//! - `http` (default): Home Assistant gateway over reqwest
//! - `mqtt` (default): MQTT session and telemetry sink over rumqttc
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use virtual_ir_light::config::AppConfig;
//! use virtual_ir_light::light::LightStateMachine;
//! use virtual_ir_light::registry::{Registry, dispatch_channel};
//! use virtual_ir_light::telemetry::TelemetryPublisher;
//!
//! #[tokio::main]
//! async fn main() -> virtual_ir_light::Result<()> {
//!     let config = AppConfig::load("settings.json")?;
//!
//!     let gateway = Arc::new(config.gateway_config().into_gateway()?);
//!     let session = config.session_builder().build()?;
//!     let telemetry = TelemetryPublisher::new(Arc::new(session.client()));
//!
//!     let machines = config
//!         .lights
//!         .iter()
//!         .cloned()
//!         .map(|light| {
//!             LightStateMachine::new(light, gateway.clone(), telemetry.clone(), config.pacing())
//!         })
//!         .collect();
//!     let registry = Registry::new(machines);
//!     let subscriptions = registry.subscriptions();
//!
//!     let (control, queue) = dispatch_channel(64);
//!     tokio::spawn(registry.run(queue));
//!     session.run(subscriptions, control).await?;
//!     Ok(())
//! }
//! ```

pub mod actuation;
pub mod config;
pub mod error;
pub mod extension;
pub mod light;
pub mod quantization;
pub mod registry;
pub mod telemetry;
pub mod transport;
pub mod types;

#[cfg(feature = "http")]
pub use actuation::{HomeAssistantConfig, HomeAssistantGateway};
pub use actuation::{Actuator, Pacing};
pub use config::AppConfig;
pub use error::{ActuationError, ConfigError, Error, PayloadError, Result, TransportError};
pub use light::{Light, LightDefinition, LightStateMachine, Outcome};
pub use quantization::{LuxRange, QuantizationTable};
pub use registry::{ControlHandle, Registry};
pub use telemetry::{StatePayload, TelemetryPublisher, TelemetrySink};
pub use transport::ReconnectionPolicy;
#[cfg(feature = "mqtt")]
pub use transport::{SessionHandle, TransportSession};
pub use transport::payload::LightCommand;
pub use types::{Level, LightState, PowerState, ScriptBindings, ScriptRef, TopicBindings};
