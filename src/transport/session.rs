// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT session with reconnection backoff.
//!
//! The session owns the rumqttc event loop. It subscribes to every light
//! topic on each `ConnAck`, forwards inbound publishes to the dispatch
//! queue and keeps polling while the dispatcher runs long actuation
//! batches, so keep-alives are never starved.
//!
//! # Examples
//!
//! ```no_run
//! use virtual_ir_light::registry::dispatch_channel;
//! use virtual_ir_light::transport::TransportSession;
//!
//! # async fn example() -> virtual_ir_light::Result<()> {
//! let session = TransportSession::builder()
//!     .host("192.168.1.50")
//!     .port(1883)
//!     .credentials("user", "password")
//!     .build()?;
//!
//! let handle = session.handle();
//! let (control, _queue) = dispatch_channel(64);
//!
//! let task = tokio::spawn(session.run(vec!["home/lux".to_string()], control));
//! handle.shutdown();
//! task.await.ok();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubscribeFilter};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::TransportError;
use crate::registry::ControlHandle;
use crate::transport::ReconnectionPolicy;

/// Time allowed for the broker to see our disconnect on shutdown.
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Capacity of the rumqttc request channel.
const REQUEST_CAPACITY: usize = 64;

/// Configuration for an MQTT session.
#[derive(Debug, Clone)]
struct SessionConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    client_id: Option<String>,
    reconnect: ReconnectionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            credentials: None,
            keep_alive: Duration::from_secs(60),
            client_id: None,
            reconnect: ReconnectionPolicy::default(),
        }
    }
}

/// Observes and stops a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shutdown: Arc<Notify>,
    connected: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Asks the session to disconnect gracefully.
    ///
    /// A graceful disconnect never triggers reconnection.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Returns true while the broker connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// A persistent connection to the MQTT broker.
pub struct TransportSession {
    client: AsyncClient,
    event_loop: EventLoop,
    config: SessionConfig,
    handle: SessionHandle,
}

impl TransportSession {
    /// Creates a builder for configuring a session.
    #[must_use]
    pub fn builder() -> TransportSessionBuilder {
        TransportSessionBuilder::default()
    }

    /// Returns a client for publishing.
    ///
    /// The client implements [`TelemetrySink`](crate::telemetry::TelemetrySink).
    /// Publishes are queued until the connection is up.
    #[must_use]
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Returns a handle to observe and stop the session.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Drives the connection until shutdown or fatal failure.
    ///
    /// `subscriptions` are (re)subscribed on every connection. Inbound
    /// publishes are forwarded to `inbound`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ReconnectExhausted` when the reconnection
    /// policy gives up, and `TransportError::ChannelClosed` if the
    /// dispatcher went away.
    pub async fn run(
        mut self,
        subscriptions: Vec<String>,
        inbound: ControlHandle,
    ) -> Result<(), TransportError> {
        let shutdown = Arc::clone(&self.handle.shutdown);
        let mut attempt: u32 = 0;
        let mut stopping = false;

        loop {
            let event = if stopping {
                if let Ok(event) =
                    tokio::time::timeout(DISCONNECT_GRACE, self.event_loop.poll()).await
                {
                    event
                } else {
                    tracing::warn!("Broker did not acknowledge disconnect");
                    self.set_connected(false);
                    return Ok(());
                }
            } else {
                tokio::select! {
                    () = shutdown.notified() => {
                        tracing::info!(host = %self.config.host, "Disconnecting from MQTT broker");
                        stopping = true;
                        if let Err(e) = self.client.try_disconnect() {
                            tracing::warn!(error = %e, "Disconnect request failed");
                            self.set_connected(false);
                            return Ok(());
                        }
                        continue;
                    }
                    event = self.event_loop.poll() => event,
                }
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    tracing::info!(
                        host = %self.config.host,
                        port = self.config.port,
                        code = ?connack.code,
                        "Connected to MQTT broker"
                    );
                    attempt = 0;
                    self.set_connected(true);
                    self.subscribe(&subscriptions);
                }
                Ok(Event::Incoming(Packet::SubAck(suback))) => {
                    tracing::debug!(?suback, "MQTT subscription acknowledged");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    tracing::debug!(
                        topic = %publish.topic,
                        bytes = publish.payload.len(),
                        "MQTT message received"
                    );
                    if let Err(e) = inbound.forward(publish.topic, publish.payload.to_vec()).await
                    {
                        tracing::error!(error = %e, "Dispatcher is gone, stopping session");
                        return Err(e);
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    tracing::warn!("MQTT broker closed the session");
                    self.set_connected(false);
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) if stopping => {
                    tracing::info!("Disconnected from MQTT broker");
                    self.set_connected(false);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    self.set_connected(false);
                    if stopping {
                        return Ok(());
                    }

                    let policy = &self.config.reconnect;
                    if !policy.should_retry(attempt) {
                        tracing::error!(
                            attempts = attempt,
                            error = %e,
                            "Giving up reconnecting to MQTT broker; restart required"
                        );
                        return Err(TransportError::ReconnectExhausted { attempts: attempt });
                    }

                    let delay = policy.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        ?delay,
                        "MQTT connection lost, reconnecting"
                    );

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = shutdown.notified() => {
                            tracing::info!("Shutdown requested while reconnecting");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn subscribe(&self, topics: &[String]) {
        if topics.is_empty() {
            return;
        }

        let filters = topics
            .iter()
            .map(|topic| SubscribeFilter::new(topic.clone(), QoS::AtLeastOnce));
        match self.client.try_subscribe_many(filters) {
            Ok(()) => tracing::debug!(count = topics.len(), "Subscribing to light topics"),
            Err(e) => tracing::error!(error = %e, "Failed to subscribe to light topics"),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.handle.connected.store(connected, Ordering::Release);
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("connected", &self.handle.is_connected())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`TransportSession`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use virtual_ir_light::transport::{ReconnectionPolicy, TransportSession};
///
/// let session = TransportSession::builder()
///     .host("192.168.1.50")
///     .port(1883)
///     .keep_alive(Duration::from_secs(30))
///     .client_id("living-room-bridge")
///     .reconnect_policy(ReconnectionPolicy::default().with_max_retries(10))
///     .build()
///     .unwrap();
///
/// assert_eq!(session.host(), "192.168.1.50");
/// ```
#[derive(Debug, Default)]
pub struct TransportSessionBuilder {
    config: SessionConfig,
}

impl TransportSessionBuilder {
    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 60 seconds, minimum 1 second).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets a fixed client id instead of a random one.
    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = Some(id.into());
        self
    }

    /// Sets the reconnection policy.
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectionPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Builds the session. No connection is made until [`TransportSession::run`].
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidAddress` if the host is not set.
    pub fn build(self) -> Result<TransportSession, TransportError> {
        if self.config.host.trim().is_empty() {
            return Err(TransportError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }

        let client_id = self
            .config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("virtual-light-{}", Uuid::new_v4().simple()));

        let mut options = MqttOptions::new(&client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive.max(Duration::from_secs(1)));
        options.set_clean_session(true);

        if let Some((ref username, ref password)) = self.config.credentials {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        tracing::debug!(client_id = %client_id, host = %self.config.host, "MQTT session created");

        Ok(TransportSession {
            client,
            event_loop,
            config: self.config,
            handle: SessionHandle {
                shutdown: Arc::new(Notify::new()),
                connected: Arc::new(AtomicBool::new(false)),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_default_values() {
        let builder = TransportSessionBuilder::default();
        assert_eq!(builder.config.port, 1883);
        assert!(builder.config.host.is_empty());
        assert!(builder.config.credentials.is_none());
        assert_eq!(builder.config.keep_alive, Duration::from_secs(60));
        assert_eq!(builder.config.reconnect, ReconnectionPolicy::default());
    }

    #[test]
    fn builder_chain() {
        let builder = TransportSessionBuilder::default()
            .host("192.168.1.50")
            .port(8883)
            .credentials("admin", "secret")
            .keep_alive(Duration::from_secs(45))
            .client_id("bridge");

        assert_eq!(builder.config.host, "192.168.1.50");
        assert_eq!(builder.config.port, 8883);
        assert_eq!(
            builder.config.credentials,
            Some(("admin".to_string(), "secret".to_string()))
        );
        assert_eq!(builder.config.keep_alive, Duration::from_secs(45));
        assert_eq!(builder.config.client_id.as_deref(), Some("bridge"));
    }

    #[test]
    fn builder_missing_host_fails() {
        let result = TransportSessionBuilder::default().build();
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn new_session_is_not_connected() {
        let session = TransportSession::builder().host("localhost").build().unwrap();
        assert!(!session.handle().is_connected());
    }
}
