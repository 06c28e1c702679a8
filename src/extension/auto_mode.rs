// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time-of-day schedule.
//!
//! Every check interval the latest schedule entry whose time is at or
//! before the local time of day is selected. A command is sent once per
//! entry and day, so manual adjustments made between two entries are left
//! alone and every entry applies again the next day.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer};
use tokio::task::JoinHandle;

use crate::error::{ConfigError, Error};
use crate::extension::Extension;
use crate::registry::ControlHandle;
use crate::transport::payload::LightCommand;
use crate::types::{Level, PowerState};

/// Light settings applied at a point of the day.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleEntry {
    /// Requested state; `OFF` ignores `brightness`.
    #[serde(default, deserialize_with = "deserialize_state")]
    pub state: Option<PowerState>,
    /// Requested brightness level.
    #[serde(default)]
    pub brightness: Option<Level>,
}

impl ScheduleEntry {
    /// Converts the entry into a command, optionally addressed to one light.
    #[must_use]
    pub fn command(&self, light_id: Option<&str>) -> LightCommand {
        let mut command = match (self.state, self.brightness) {
            (Some(PowerState::Off), _) => LightCommand::new().with_state(PowerState::Off),
            (state, brightness) => LightCommand {
                state,
                brightness,
                light_id: None,
            },
        };
        command.light_id = light_id.map(str::to_string);
        command
    }
}

fn deserialize_state<'de, D>(deserializer: D) -> Result<Option<PowerState>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| raw.parse().map_err(serde::de::Error::custom))
        .transpose()
}

/// Entries keyed by `"HH:MM"`, sorted by time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, ScheduleEntry>")]
pub struct Schedule {
    entries: Vec<(NaiveTime, ScheduleEntry)>,
}

impl Schedule {
    /// Returns the latest entry at or before `now`.
    ///
    /// Before the first entry of the day nothing is selected.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveTime;
    /// use virtual_ir_light::extension::Schedule;
    ///
    /// let schedule: Schedule = serde_json::from_str(
    ///     r#"{"07:00": {"state": "ON", "brightness": 3}, "23:00": {"state": "OFF"}}"#,
    /// )
    /// .unwrap();
    ///
    /// let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
    /// let (at, entry) = schedule.select(noon).unwrap();
    /// assert_eq!(at, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
    /// assert_eq!(entry.brightness, Some(3));
    /// ```
    #[must_use]
    pub fn select(&self, now: NaiveTime) -> Option<(NaiveTime, &ScheduleEntry)> {
        self.entries
            .iter()
            .take_while(|(at, _)| *at <= now)
            .last()
            .map(|(at, entry)| (*at, entry))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the schedule has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<BTreeMap<String, ScheduleEntry>> for Schedule {
    type Error = ConfigError;

    fn try_from(map: BTreeMap<String, ScheduleEntry>) -> Result<Self, Self::Error> {
        let mut entries = map
            .into_iter()
            .map(|(key, entry)| {
                let at = NaiveTime::parse_from_str(key.trim(), "%H:%M")
                    .map_err(|_| ConfigError::InvalidSchedule(format!("{key}: expected HH:MM")))?;
                if entry.state.is_none() && entry.brightness.is_none() {
                    return Err(ConfigError::InvalidSchedule(format!(
                        "{key}: neither state nor brightness"
                    )));
                }
                Ok((at, entry))
            })
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|(at, _)| *at);
        Ok(Self { entries })
    }
}

/// Settings of the `auto_mode` extension.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AutoModeConfig {
    /// Whether the schedule is applied.
    #[serde(default)]
    pub enabled: bool,
    /// Time-of-day entries.
    #[serde(default)]
    pub schedule: Schedule,
    /// Seconds between schedule checks.
    #[serde(default = "default_check_interval", alias = "check_interval")]
    pub check_interval_secs: u64,
    /// Restricts commands to one light; all lights otherwise.
    #[serde(default)]
    pub light_id: Option<String>,
}

const fn default_check_interval() -> u64 {
    60
}

/// Tracks the last applied entry occurrence.
#[derive(Debug, Default)]
struct Tracker {
    last: Option<NaiveDateTime>,
}

impl Tracker {
    fn poll(&mut self, config: &AutoModeConfig, now: NaiveDateTime) -> Option<LightCommand> {
        let (at, entry) = config.schedule.select(now.time())?;
        let occurrence = now.date().and_time(at);
        if self.last == Some(occurrence) {
            return None;
        }
        self.last = Some(occurrence);
        Some(entry.command(config.light_id.as_deref()))
    }
}

/// Applies a time-of-day schedule through the control handle.
pub struct AutoMode {
    config: AutoModeConfig,
    control: Option<ControlHandle>,
    task: Option<JoinHandle<()>>,
}

impl AutoMode {
    /// Creates the extension; nothing runs until started.
    #[must_use]
    pub fn new(config: AutoModeConfig) -> Self {
        Self {
            config,
            control: None,
            task: None,
        }
    }

    /// Returns true while the schedule task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Extension for AutoMode {
    fn name(&self) -> &str {
        "auto_mode"
    }

    fn init(&mut self, control: ControlHandle) -> Result<(), Error> {
        if self.config.check_interval_secs == 0 {
            return Err(ConfigError::InvalidSchedule(
                "check_interval_secs must be positive".to_string(),
            )
            .into());
        }
        self.control = Some(control);
        Ok(())
    }

    fn start(&mut self) {
        if self.is_running() {
            return;
        }
        if !self.config.enabled {
            tracing::info!("Auto mode is disabled");
            return;
        }
        if self.config.schedule.is_empty() {
            tracing::info!("Auto mode has an empty schedule");
            return;
        }
        let Some(control) = self.control.clone() else {
            tracing::warn!("Auto mode started before init");
            return;
        };

        let config = self.config.clone();
        let period = Duration::from_secs(config.check_interval_secs);
        tracing::info!(
            entries = config.schedule.len(),
            check_interval_secs = config.check_interval_secs,
            "Auto mode started"
        );

        self.task = Some(tokio::spawn(async move {
            let mut tracker = Tracker::default();
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let now = Local::now().naive_local();
                let Some(command) = tracker.poll(&config, now) else {
                    continue;
                };

                tracing::info!(
                    time = %now.format("%H:%M"),
                    state = ?command.state,
                    brightness = ?command.brightness,
                    "Applying scheduled light state"
                );
                if control.send(command).await.is_err() {
                    tracing::warn!("Dispatcher stopped, auto mode exiting");
                    break;
                }
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for AutoMode {
    fn drop(&mut self) {
        self.stop();
    }
}
