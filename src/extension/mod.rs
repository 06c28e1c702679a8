// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Optional capabilities selected from configuration.
//!
//! Extensions are listed explicitly in the settings file by `kind`:
//!
//! ```json
//! "extensions": [
//!     {"kind": "auto_mode", "enabled": true, "schedule": {"07:00": {"state": "ON", "brightness": 3}}}
//! ]
//! ```
//!
//! Each extension talks to the lights only through a [`ControlHandle`],
//! so its commands are serialized with sensor traffic like any other.

mod auto_mode;

pub use auto_mode::{AutoMode, AutoModeConfig, Schedule, ScheduleEntry};

use serde::Deserialize;

use crate::error::Error;
use crate::registry::ControlHandle;

/// Lifecycle contract of an extension.
pub trait Extension: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Prepares the extension. Called once before [`start`](Extension::start).
    ///
    /// # Errors
    ///
    /// Returns an error if the extension cannot run with its settings.
    fn init(&mut self, control: ControlHandle) -> Result<(), Error>;

    /// Starts background work. Requires a Tokio runtime.
    fn start(&mut self);

    /// Stops background work.
    fn stop(&mut self);
}

/// Settings of one extension, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtensionConfig {
    /// Time-of-day schedule of light states.
    AutoMode(AutoModeConfig),
}

impl ExtensionConfig {
    /// Instantiates the extension.
    #[must_use]
    pub fn build(self) -> Box<dyn Extension> {
        match self {
            Self::AutoMode(config) => Box::new(AutoMode::new(config)),
        }
    }
}

/// Owns the configured extensions and drives their lifecycle.
#[derive(Default)]
pub struct ExtensionHost {
    extensions: Vec<Box<dyn Extension>>,
}

impl ExtensionHost {
    /// Instantiates every configured extension.
    #[must_use]
    pub fn from_configs(configs: impl IntoIterator<Item = ExtensionConfig>) -> Self {
        Self {
            extensions: configs.into_iter().map(ExtensionConfig::build).collect(),
        }
    }

    /// Adds an already built extension.
    pub fn push(&mut self, extension: Box<dyn Extension>) {
        self.extensions.push(extension);
    }

    /// Initializes every extension; those that fail are dropped.
    pub fn init(&mut self, control: &ControlHandle) {
        self.extensions.retain_mut(|extension| {
            match extension.init(control.clone()) {
                Ok(()) => {
                    tracing::debug!(extension = %extension.name(), "Extension initialized");
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        extension = %extension.name(),
                        error = %e,
                        "Extension disabled"
                    );
                    false
                }
            }
        });
    }

    /// Starts every extension.
    pub fn start(&mut self) {
        for extension in &mut self.extensions {
            tracing::info!(extension = %extension.name(), "Starting extension");
            extension.start();
        }
    }

    /// Stops every extension, in reverse start order.
    pub fn stop(&mut self) {
        for extension in self.extensions.iter_mut().rev() {
            tracing::info!(extension = %extension.name(), "Stopping extension");
            extension.stop();
        }
    }

    /// Returns the names of the active extensions.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    /// Returns the number of active extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Returns true if no extension is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl std::fmt::Debug for ExtensionHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionHost")
            .field("extensions", &self.names())
            .finish()
    }
}
