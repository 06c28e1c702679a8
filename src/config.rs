// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Settings file loading and validation.
//!
//! Two layouts are accepted. The single-light layout:
//!
//! ```json
//! {
//!     "mqtt": {
//!         "host": "192.168.1.50",
//!         "port": 1883,
//!         "topics": {"light_topic": "home/ir_light", "brightness_topic": "home/lux"}
//!     },
//!     "HomeAssistant": {
//!         "url": "http://homeassistant.local:8123",
//!         "token": "...",
//!         "script_name": {
//!             "on_service": "script.ir_on",
//!             "off_service": "script.ir_off",
//!             "brightness_up_service": "script.ir_up",
//!             "brightness_down_service": "script.ir_down"
//!         }
//!     },
//!     "light": {"lx_to_brightness": {"1": {"min": 0, "max": 10}, "2": {"min": 10}}}
//! }
//! ```
//!
//! The multi-light layout adds a `lights` array. Each entry carries an
//! `id` and may override any of `light_topic`, `set_topic`, `state_topic`,
//! `brightness_topic`, `script_name` and `lx_to_brightness`; missing values
//! fall back to the top-level ones.
//!
//! A light that fails validation is skipped with a warning. Loading only
//! fails when the document itself is unreadable or no light is usable.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::actuation::Pacing;
use crate::error::ConfigError;
use crate::extension::ExtensionConfig;
use crate::light::LightDefinition;
use crate::quantization::QuantizationTable;
use crate::transport::{ReconnectSettings, ReconnectionPolicy};
use crate::types::{ScriptBindings, TopicBindings};

/// Settings file used when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "settings.json";

/// Environment variable overriding the settings file path.
pub const CONFIG_PATH_ENV: &str = "VIRTUAL_LIGHT_CONFIG";

/// Id of the light in the single-light layout.
pub const LEGACY_LIGHT_ID: &str = "light";

/// Broker connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    /// Broker host.
    pub host: String,
    /// Broker port.
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Optional user name.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Fixed client id; random when absent.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Reconnection backoff.
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    /// Default light topics.
    #[serde(default)]
    pub topics: TopicSettings,
}

/// Default topics from the `mqtt.topics` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicSettings {
    /// Topic carrying lux readings.
    #[serde(default)]
    pub brightness_topic: Option<String>,
    /// Base of `<light_topic>/set` and `<light_topic>/state`.
    #[serde(default)]
    pub light_topic: Option<String>,
}

/// Automation service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HomeAssistantSettings {
    /// Instance URL.
    pub url: String,
    /// Long-lived access token.
    pub token: String,
    /// Default scripts.
    #[serde(default)]
    pub script_name: Option<ScriptBindings>,
    /// Wait after each script call, in milliseconds.
    #[serde(default = "default_step_interval")]
    pub step_interval_ms: u64,
    /// Upper bound on the settle wait, in milliseconds.
    #[serde(default = "default_settle_cap")]
    pub settle_cap_ms: u64,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

const fn default_mqtt_port() -> u16 {
    1883
}

const fn default_keep_alive() -> u64 {
    60
}

const fn default_step_interval() -> u64 {
    500
}

const fn default_settle_cap() -> u64 {
    3000
}

const fn default_timeout() -> u64 {
    10
}

/// The document as written on disk.
#[derive(Debug, Deserialize)]
struct RawSettings {
    mqtt: MqttSettings,
    #[serde(rename = "HomeAssistant")]
    home_assistant: HomeAssistantSettings,
    #[serde(default)]
    light: Option<RawLight>,
    #[serde(default)]
    lights: Vec<Value>,
    #[serde(default)]
    extensions: Vec<Value>,
    #[serde(default)]
    plugins: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLight {
    #[serde(default)]
    lx_to_brightness: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LightEntry {
    id: String,
    #[serde(default)]
    light_topic: Option<String>,
    #[serde(default)]
    set_topic: Option<String>,
    #[serde(default)]
    state_topic: Option<String>,
    #[serde(default)]
    brightness_topic: Option<String>,
    #[serde(default)]
    script_name: Option<ScriptBindings>,
    #[serde(default)]
    lx_to_brightness: Option<QuantizationTable>,
}

/// Resolved and validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Broker connection settings.
    pub mqtt: MqttSettings,
    /// Automation service settings.
    pub home_assistant: HomeAssistantSettings,
    /// Usable lights, in file order.
    pub lights: Vec<LightDefinition>,
    /// Configured extensions.
    pub extensions: Vec<ExtensionConfig>,
}

impl AppConfig {
    /// Picks the settings path: first CLI argument, then
    /// [`CONFIG_PATH_ENV`], then [`DEFAULT_CONFIG_PATH`].
    #[must_use]
    pub fn resolve_path(cli_arg: Option<String>, env_value: Option<String>) -> PathBuf {
        cli_arg
            .or(env_value)
            .filter(|path| !path.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
    }

    /// Loads and validates the settings file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or if no
    /// light is usable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json(&contents)?;
        tracing::info!(
            path = %path.display(),
            lights = config.lights.len(),
            extensions = config.extensions.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates a settings document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the document is invalid or no light is usable.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawSettings = serde_json::from_str(contents)?;

        let default_table = raw
            .light
            .unwrap_or_default()
            .lx_to_brightness
            .map(|value| serde_json::from_value::<QuantizationTable>(value).map_err(Arc::new));

        let lights = if raw.lights.is_empty() {
            resolve_legacy_light(&raw.mqtt, &raw.home_assistant, default_table)
        } else {
            resolve_lights(raw.lights, &raw.mqtt, &raw.home_assistant, default_table)
        };
        if lights.is_empty() {
            return Err(ConfigError::NoLights);
        }

        let extensions = resolve_extensions(raw.extensions, raw.plugins);

        Ok(Self {
            mqtt: raw.mqtt,
            home_assistant: raw.home_assistant,
            lights,
            extensions,
        })
    }

    /// Returns the step and settle timing.
    #[must_use]
    pub fn pacing(&self) -> Pacing {
        let step = Duration::from_millis(self.home_assistant.step_interval_ms);
        Pacing {
            step_interval: step,
            settle_per_step: step,
            settle_cap: Duration::from_millis(self.home_assistant.settle_cap_ms),
        }
    }

    /// Returns the reconnection policy.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectionPolicy {
        self.mqtt.reconnect.clone().into()
    }

    /// Returns the Home Assistant gateway settings.
    #[cfg(feature = "http")]
    #[must_use]
    pub fn gateway_config(&self) -> crate::actuation::HomeAssistantConfig {
        crate::actuation::HomeAssistantConfig::new(
            self.home_assistant.url.clone(),
            self.home_assistant.token.clone(),
        )
        .with_timeout(Duration::from_secs(self.home_assistant.timeout_secs))
        .with_step_interval(Duration::from_millis(self.home_assistant.step_interval_ms))
    }

    /// Returns a session builder for the configured broker.
    #[cfg(feature = "mqtt")]
    #[must_use]
    pub fn session_builder(&self) -> crate::transport::TransportSessionBuilder {
        let mut builder = crate::transport::TransportSession::builder()
            .host(self.mqtt.host.clone())
            .port(self.mqtt.port)
            .keep_alive(Duration::from_secs(self.mqtt.keep_alive_secs))
            .reconnect_policy(self.reconnect_policy());

        if let Some(username) = &self.mqtt.username {
            builder = builder.credentials(
                username.clone(),
                self.mqtt.password.clone().unwrap_or_default(),
            );
        }
        if let Some(id) = &self.mqtt.client_id {
            builder = builder.client_id(id.clone());
        }
        builder
    }
}

type TableResult = Result<QuantizationTable, Arc<serde_json::Error>>;

fn resolve_legacy_light(
    mqtt: &MqttSettings,
    home_assistant: &HomeAssistantSettings,
    table: Option<TableResult>,
) -> Vec<LightDefinition> {
    let entry = LightEntry {
        id: LEGACY_LIGHT_ID.to_string(),
        light_topic: None,
        set_topic: None,
        state_topic: None,
        brightness_topic: None,
        script_name: None,
        lx_to_brightness: None,
    };

    match resolve_entry(entry, mqtt, home_assistant, table.as_ref(), false) {
        Ok(light) => vec![light],
        Err(e) => {
            tracing::warn!(light = LEGACY_LIGHT_ID, error = %e, "Skipping light");
            Vec::new()
        }
    }
}

fn resolve_lights(
    entries: Vec<Value>,
    mqtt: &MqttSettings,
    home_assistant: &HomeAssistantSettings,
    default_table: Option<TableResult>,
) -> Vec<LightDefinition> {
    let mut seen = HashSet::new();
    let mut lights = Vec::new();

    for (index, value) in entries.into_iter().enumerate() {
        let resolved = serde_json::from_value::<LightEntry>(value)
            .map_err(ConfigError::from)
            .and_then(|entry| {
                resolve_entry(entry, mqtt, home_assistant, default_table.as_ref(), true)
            })
            .and_then(|light| {
                if seen.insert(light.id.clone()) {
                    Ok(light)
                } else {
                    Err(ConfigError::DuplicateLight(light.id))
                }
            });

        match resolved {
            Ok(light) => lights.push(light),
            Err(e) => tracing::warn!(index, error = %e, "Skipping light"),
        }
    }

    lights
}

fn resolve_entry(
    entry: LightEntry,
    mqtt: &MqttSettings,
    home_assistant: &HomeAssistantSettings,
    default_table: Option<&TableResult>,
    tag_telemetry: bool,
) -> Result<LightDefinition, ConfigError> {
    if entry.id.trim().is_empty() {
        return Err(ConfigError::MissingField("id".to_string()));
    }

    let base = entry
        .light_topic
        .as_deref()
        .or(mqtt.topics.light_topic.as_deref())
        .filter(|topic| !topic.trim().is_empty());
    let brightness_topic = entry
        .brightness_topic
        .or_else(|| mqtt.topics.brightness_topic.clone())
        .filter(|topic| !topic.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField("brightness_topic".to_string()))?;

    let mut topics = match base {
        Some(base) => TopicBindings::from_base(base, brightness_topic),
        None => TopicBindings {
            set_topic: String::new(),
            state_topic: String::new(),
            brightness_topic,
        },
    };
    if let Some(set_topic) = entry.set_topic {
        topics.set_topic = set_topic;
    }
    if let Some(state_topic) = entry.state_topic {
        topics.state_topic = state_topic;
    }
    if topics.set_topic.is_empty() || topics.state_topic.is_empty() {
        return Err(ConfigError::MissingField("light_topic".to_string()));
    }

    let scripts = entry
        .script_name
        .or_else(|| home_assistant.script_name.clone())
        .ok_or_else(|| ConfigError::MissingField("script_name".to_string()))?;
    validate_scripts(&scripts)?;

    let table = match (entry.lx_to_brightness, default_table) {
        (Some(table), _) => table,
        (None, Some(Ok(table))) => table.clone(),
        (None, Some(Err(e))) => {
            return Err(ConfigError::InvalidTable {
                field: "light.lx_to_brightness".to_string(),
                source: Arc::clone(e),
            });
        }
        (None, None) => return Err(ConfigError::EmptyQuantizationTable),
    };

    Ok(LightDefinition {
        id: entry.id,
        topics,
        scripts,
        table,
        tag_telemetry,
    })
}

fn validate_scripts(scripts: &ScriptBindings) -> Result<(), ConfigError> {
    for (name, script) in [
        ("on_service", &scripts.on_service),
        ("off_service", &scripts.off_service),
        ("brightness_up_service", &scripts.brightness_up_service),
        ("brightness_down_service", &scripts.brightness_down_service),
    ] {
        if script.is_empty() {
            return Err(ConfigError::MissingField(format!("script_name.{name}")));
        }
    }
    Ok(())
}

fn resolve_extensions(list: Vec<Value>, plugins: BTreeMap<String, Value>) -> Vec<ExtensionConfig> {
    let legacy = plugins.into_iter().map(|(kind, mut value)| {
        if let Value::Object(map) = &mut value {
            map.entry("kind").or_insert(Value::String(kind));
        }
        value
    });

    list.into_iter()
        .chain(legacy)
        .filter_map(|value| match serde_json::from_value::<ExtensionConfig>(value) {
            Ok(extension) => Some(extension),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping extension");
                None
            }
        })
        .collect()
}
