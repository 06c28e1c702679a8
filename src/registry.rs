// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic routing and the serialized dispatch path.
//!
//! The [`Registry`] owns every [`LightStateMachine`] and maps transport
//! topics to them. It is built once at startup and then moved into the
//! single dispatcher task, which drains the inbound queue one message at
//! a time:
//!
//! ```text
//! MQTT publish: home/living/lux → 42.3
//!                     ↓
//!          ControlHandle (bounded queue)
//!                     ↓
//!            Registry::handle()
//!                     ↓
//!     Lookup "home/living/lux" in routes
//!                     ↓
//!   LightStateMachine::handle_sensor_reading()
//! ```
//!
//! Every per-message error stops here: it is logged and the dispatcher
//! moves on to the next message.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::actuation::Actuator;
use crate::error::{PayloadError, TransportError};
use crate::light::{Light, LightStateMachine};
use crate::transport::payload::{LightCommand, parse_reading};

/// What a topic carries for a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteKind {
    Reading,
    Command,
}

#[derive(Debug, Clone, Copy)]
struct Route {
    light: usize,
    kind: RouteKind,
}

/// A message waiting in the dispatch queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Raw publish received from the transport.
    Publish {
        /// Topic the message arrived on.
        topic: String,
        /// Raw payload bytes.
        payload: Vec<u8>,
    },
    /// Command produced in-process.
    Command(LightCommand),
}

/// Cloneable producer side of the dispatch queue.
///
/// The transport session forwards publishes through it and extensions
/// enqueue commands. All messages are handled by the same dispatcher, so
/// commands from any source are serialized with sensor traffic.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<Inbound>,
}

impl ControlHandle {
    /// Enqueues a command.
    ///
    /// A command without `lightId` is applied to every light.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ChannelClosed` if the dispatcher has stopped.
    pub async fn send(&self, command: LightCommand) -> Result<(), TransportError> {
        self.enqueue(Inbound::Command(command)).await
    }

    /// Enqueues a raw publish.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ChannelClosed` if the dispatcher has stopped.
    pub async fn forward(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), TransportError> {
        self.enqueue(Inbound::Publish {
            topic: topic.into(),
            payload: payload.into(),
        })
        .await
    }

    /// Returns true if the dispatcher has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn enqueue(&self, message: Inbound) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::ChannelClosed("dispatch queue".to_string()))
    }
}

/// Creates the dispatch queue.
///
/// The receiver is meant for [`Registry::run`].
#[must_use]
pub fn dispatch_channel(capacity: usize) -> (ControlHandle, mpsc::Receiver<Inbound>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ControlHandle { tx }, rx)
}

/// Maps topics to lights and fans inbound messages out to them.
pub struct Registry<A> {
    machines: Vec<LightStateMachine<A>>,
    routes: HashMap<String, Vec<Route>>,
}

impl<A: Actuator> Registry<A> {
    /// Builds the routing table.
    ///
    /// Each light is reachable through its brightness topic (readings) and
    /// its set topic (commands). Several lights may share a topic.
    #[must_use]
    pub fn new(machines: Vec<LightStateMachine<A>>) -> Self {
        let mut routes: HashMap<String, Vec<Route>> = HashMap::new();
        for (index, machine) in machines.iter().enumerate() {
            let topics = machine.light().topics();
            for (topic, kind) in [
                (&topics.brightness_topic, RouteKind::Reading),
                (&topics.set_topic, RouteKind::Command),
            ] {
                tracing::debug!(
                    light = %machine.light().id(),
                    topic = %topic,
                    ?kind,
                    "Registering route"
                );
                routes.entry(topic.clone()).or_default().push(Route {
                    light: index,
                    kind,
                });
            }
        }

        Self { machines, routes }
    }

    /// Returns every topic that needs a subscription, sorted.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Returns the number of lights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.machines.len()
    }

    /// Returns true if no light is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    /// Looks up a light by id.
    #[must_use]
    pub fn light(&self, id: &str) -> Option<&Light> {
        self.machines
            .iter()
            .map(LightStateMachine::light)
            .find(|light| light.id() == id)
    }

    /// Iterates over all lights.
    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        self.machines.iter().map(LightStateMachine::light)
    }

    /// Handles one queued message.
    pub async fn handle(&mut self, message: Inbound) {
        match message {
            Inbound::Publish { topic, payload } => {
                self.dispatch(&topic, &payload).await;
            }
            Inbound::Command(command) => {
                let targets: Vec<usize> = (0..self.machines.len()).collect();
                self.apply_command(&targets, &command).await;
            }
        }
    }

    /// Routes a raw publish to its lights.
    ///
    /// Returns the number of lights that handled the message.
    pub async fn dispatch(&mut self, topic: &str, payload: &[u8]) -> usize {
        let Some(routes) = self.routes.get(topic).cloned() else {
            tracing::trace!(topic = %topic, "No light registered for topic");
            return 0;
        };

        let readers: Vec<usize> = routes
            .iter()
            .filter(|r| r.kind == RouteKind::Reading)
            .map(|r| r.light)
            .collect();
        let commanded: Vec<usize> = routes
            .iter()
            .filter(|r| r.kind == RouteKind::Command)
            .map(|r| r.light)
            .collect();

        let mut handled = 0;

        if !readers.is_empty() {
            match parse_reading(payload) {
                Ok(reading) => {
                    tracing::debug!(topic = %topic, reading, "Sensor reading received");
                    for index in readers {
                        self.machines[index].handle_sensor_reading(reading).await;
                        handled += 1;
                    }
                }
                Err(e) => log_dropped(topic, &e),
            }
        }

        if !commanded.is_empty() {
            match LightCommand::parse(payload) {
                Ok(command) => {
                    tracing::debug!(topic = %topic, ?command, "Command received");
                    handled += self.apply_command(&commanded, &command).await;
                }
                Err(e) => log_dropped(topic, &e),
            }
        }

        handled
    }

    /// Consumes the dispatch queue until every producer is gone.
    ///
    /// Returns the registry so the final state can be inspected.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Inbound>) -> Self {
        tracing::debug!(lights = self.machines.len(), "Dispatcher started");
        while let Some(message) = rx.recv().await {
            self.handle(message).await;
        }
        tracing::debug!("Dispatcher stopped");
        self
    }

    async fn apply_command(&mut self, candidates: &[usize], command: &LightCommand) -> usize {
        let targets: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&index| {
                command
                    .light_id
                    .as_deref()
                    .is_none_or(|id| self.machines[index].light().id() == id)
            })
            .collect();

        if targets.is_empty() {
            tracing::warn!(
                light = command.light_id.as_deref().unwrap_or_default(),
                "Dropping command for unknown light"
            );
            return 0;
        }

        for &index in &targets {
            let machine = &mut self.machines[index];
            if let Err(e) = machine.handle_command(command).await {
                tracing::error!(
                    light = %machine.light().id(),
                    error = %e,
                    "Command failed"
                );
            }
        }
        targets.len()
    }
}

fn log_dropped(topic: &str, error: &PayloadError) {
    if matches!(error, PayloadError::EmptyCommand) {
        tracing::warn!(topic = %topic, "Ignoring command without state or brightness");
    } else {
        tracing::warn!(topic = %topic, error = %error, "Dropping malformed message");
    }
}

impl<A> std::fmt::Debug for Registry<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("lights", &self.machines.len())
            .field("topics", &self.routes.len())
            .finish()
    }
}
