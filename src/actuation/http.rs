// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Home Assistant script service over HTTP.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::actuation::Actuator;
use crate::error::ActuationError;
use crate::types::ScriptRef;

/// Path of the script service on a Home Assistant instance.
const SCRIPT_SERVICE_PATH: &str = "/api/services/script/turn_on";

// ============================================================================
// HomeAssistantConfig - Connection parameters
// ============================================================================

/// Configuration for the Home Assistant script gateway.
///
/// # Examples
///
/// ```
/// use virtual_ir_light::actuation::HomeAssistantConfig;
/// use std::time::Duration;
///
/// let config = HomeAssistantConfig::new("http://homeassistant.local:8123", "token")
///     .with_timeout(Duration::from_secs(5))
///     .with_step_interval(Duration::from_millis(300));
///
/// assert_eq!(
///     config.script_url(),
///     "http://homeassistant.local:8123/api/services/script/turn_on"
/// );
/// ```
#[derive(Clone)]
pub struct HomeAssistantConfig {
    base_url: String,
    token: String,
    timeout: Duration,
    step_interval: Duration,
}

impl HomeAssistantConfig {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration for the given instance URL and access token.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            step_interval: crate::actuation::Pacing::DEFAULT_STEP_INTERVAL,
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the wait after each remote call.
    #[must_use]
    pub fn with_step_interval(mut self, interval: Duration) -> Self {
        self.step_interval = interval;
        self
    }

    /// Returns the instance URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the wait after each remote call.
    #[must_use]
    pub fn step_interval(&self) -> Duration {
        self.step_interval
    }

    /// Builds the script service URL.
    #[must_use]
    pub fn script_url(&self) -> String {
        format!("{}{SCRIPT_SERVICE_PATH}", self.base_url.trim_end_matches('/'))
    }

    /// Creates a [`HomeAssistantGateway`] from this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn into_gateway(self) -> Result<HomeAssistantGateway, ActuationError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(ActuationError::Http)?;

        Ok(HomeAssistantGateway {
            script_url: self.script_url(),
            client,
            token: self.token,
            step_interval: self.step_interval,
        })
    }
}

impl std::fmt::Debug for HomeAssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("step_interval", &self.step_interval)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// HomeAssistantGateway - Script execution
// ============================================================================

/// Runs scripts through the Home Assistant REST API.
///
/// Each repetition is one `POST /api/services/script/turn_on` with body
/// `{"entity_id": "<script>"}` and a bearer token. Only status 200 counts
/// as success.
#[derive(Clone)]
pub struct HomeAssistantGateway {
    client: Client,
    script_url: String,
    token: String,
    step_interval: Duration,
}

#[derive(Debug, Serialize)]
struct ScriptCall<'a> {
    entity_id: &'a str,
}

impl HomeAssistantGateway {
    /// Returns the script service URL.
    #[must_use]
    pub fn script_url(&self) -> &str {
        &self.script_url
    }

    /// Issues a single script call.
    async fn call_once(&self, script: &ScriptRef) -> Result<(), ActuationError> {
        let response = self
            .client
            .post(&self.script_url)
            .bearer_auth(&self.token)
            .json(&ScriptCall {
                entity_id: script.as_str(),
            })
            .send()
            .await
            .map_err(ActuationError::Http)?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                script = %script,
                status = status.as_u16(),
                body = %body,
                "Script call rejected"
            );
            return Err(ActuationError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(script = %script, "Script call accepted");
        Ok(())
    }
}

impl Actuator for HomeAssistantGateway {
    async fn execute(&self, script: &ScriptRef, repeat: u32) -> Result<(), ActuationError> {
        if script.is_empty() {
            return Err(ActuationError::ScriptNotConfigured(script.to_string()));
        }

        tracing::info!(script = %script, repeat, "Executing script");

        for completed in 0..repeat {
            let result = self.call_once(script).await;
            tokio::time::sleep(self.step_interval).await;

            if let Err(e) = result {
                tracing::error!(
                    script = %script,
                    completed,
                    requested = repeat,
                    error = %e,
                    "Script batch failed"
                );
                if completed == 0 {
                    return Err(e);
                }
                return Err(ActuationError::PartialBatch {
                    completed,
                    requested: repeat,
                    source: Box::new(e),
                });
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for HomeAssistantGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantGateway")
            .field("script_url", &self.script_url)
            .field("step_interval", &self.step_interval)
            .finish_non_exhaustive()
    }
}
