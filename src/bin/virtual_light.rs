// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Virtual light bridge service.
//!
//! Usage: `virtual-light [settings.json]`
//!
//! The settings path may also come from `VIRTUAL_LIGHT_CONFIG`. Log
//! verbosity follows `RUST_LOG`.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use virtual_ir_light::config::{AppConfig, CONFIG_PATH_ENV};
use virtual_ir_light::extension::ExtensionHost;
use virtual_ir_light::registry::{Registry, dispatch_channel};
use virtual_ir_light::{LightStateMachine, TelemetryPublisher, TransportError};

/// Messages buffered between the MQTT event loop and the dispatcher.
const DISPATCH_CAPACITY: usize = 64;

/// Time allowed for an in-flight transition to finish on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,virtual_ir_light=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => {
            tracing::info!("Virtual light bridge stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Virtual light bridge failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> virtual_ir_light::Result<()> {
    let path = AppConfig::resolve_path(
        std::env::args().nth(1),
        std::env::var(CONFIG_PATH_ENV).ok(),
    );
    tracing::info!(path = %path.display(), "Starting virtual light bridge");
    let config = AppConfig::load(&path)?;

    let gateway = Arc::new(config.gateway_config().into_gateway()?);
    let session = config.session_builder().build()?;
    let session_handle = session.handle();
    let telemetry = TelemetryPublisher::new(Arc::new(session.client()));

    let pacing = config.pacing();
    let machines = config
        .lights
        .iter()
        .cloned()
        .map(|light| LightStateMachine::new(light, gateway.clone(), telemetry.clone(), pacing))
        .collect();
    let registry = Registry::new(machines);
    let subscriptions = registry.subscriptions();
    tracing::info!(
        lights = registry.len(),
        topics = subscriptions.len(),
        host = %session.host(),
        port = session.port(),
        "Bridge configured"
    );

    let (control, queue) = dispatch_channel(DISPATCH_CAPACITY);
    let dispatcher = tokio::spawn(registry.run(queue));

    let mut extensions = ExtensionHost::from_configs(config.extensions.clone());
    extensions.init(&control);
    extensions.start();

    let mut session_task = tokio::spawn(session.run(subscriptions, control));

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!(error = %e, "Cannot listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
            extensions.stop();
            session_handle.shutdown();
            (&mut session_task).await
        }
        outcome = &mut session_task => {
            extensions.stop();
            outcome
        }
    };
    drop(extensions);

    if tokio::time::timeout(DRAIN_TIMEOUT, dispatcher).await.is_err() {
        tracing::warn!("Dispatcher did not finish in time");
    }

    outcome.map_err(|e| TransportError::ChannelClosed(format!("session task: {e}")))??;
    Ok(())
}
