// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mapping of continuous lux readings onto discrete brightness levels.
//!
//! A [`QuantizationTable`] is an ordered set of half-open ranges
//! `[min, max)`, one per level. It is validated once at load time and is
//! immutable afterwards, so the engine never sees a table it cannot use.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Level;

/// A half-open lux range `[min, max)`.
///
/// In settings files `min` defaults to 0 and `max` to unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LuxRange {
    /// Inclusive lower bound.
    #[serde(default)]
    pub min: f64,
    /// Exclusive upper bound.
    #[serde(default = "LuxRange::unbounded")]
    pub max: f64,
}

impl LuxRange {
    /// Creates a range `[min, max)`.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    const fn unbounded() -> f64 {
        f64::INFINITY
    }

    /// Returns true if `reading` lies within `[min, max)`.
    #[must_use]
    pub fn contains(&self, reading: f64) -> bool {
        self.min <= reading && reading < self.max
    }
}

/// Ordered level ranges used to quantize sensor readings.
///
/// # Examples
///
/// ```
/// use virtual_ir_light::quantization::{LuxRange, QuantizationTable};
///
/// let table = QuantizationTable::new([
///     (1, LuxRange::new(0.0, 10.0)),
///     (3, LuxRange::new(10.0, 50.0)),
///     (5, LuxRange::new(50.0, 100.0)),
/// ])
/// .unwrap();
///
/// assert_eq!(table.quantize(30.0), 3);
/// // Readings above every range fail toward the brightest level.
/// assert_eq!(table.quantize(150.0), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, LuxRange>")]
pub struct QuantizationTable {
    /// Sorted by ascending level; never empty.
    ranges: Vec<(Level, LuxRange)>,
}

impl QuantizationTable {
    /// Builds a table from `(level, range)` pairs in any order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyQuantizationTable` when no range is given,
    /// `ConfigError::InvalidRange` when a bound is NaN or `min > max`, and
    /// `ConfigError::InvalidLevel` when a level appears twice.
    pub fn new(ranges: impl IntoIterator<Item = (Level, LuxRange)>) -> Result<Self, ConfigError> {
        let mut ranges: Vec<_> = ranges.into_iter().collect();
        if ranges.is_empty() {
            return Err(ConfigError::EmptyQuantizationTable);
        }

        for (level, range) in &ranges {
            if range.min.is_nan() || range.max.is_nan() || range.min > range.max {
                return Err(ConfigError::InvalidRange {
                    level: *level,
                    min: range.min,
                    max: range.max,
                });
            }
        }

        ranges.sort_by_key(|(level, _)| *level);
        if let Some(pair) = ranges.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(ConfigError::InvalidLevel(format!(
                "level {} defined twice",
                pair[0].0
            )));
        }

        Ok(Self { ranges })
    }

    /// Maps a reading to a level.
    ///
    /// Ranges are scanned in ascending level order and the first range
    /// containing the reading wins. A reading no range contains maps to
    /// the highest configured level.
    #[must_use]
    pub fn quantize(&self, reading: f64) -> Level {
        self.ranges
            .iter()
            .find(|(_, range)| range.contains(reading))
            .map_or_else(|| self.max_level(), |(level, _)| *level)
    }

    /// Returns the highest configured level.
    #[must_use]
    pub fn max_level(&self) -> Level {
        self.ranges.last().map_or(0, |(level, _)| *level)
    }

    /// Returns the lowest configured level.
    #[must_use]
    pub fn min_level(&self) -> Level {
        self.ranges.first().map_or(0, |(level, _)| *level)
    }

    /// Returns the number of ranges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Always false; an empty table cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterates `(level, range)` pairs in ascending level order.
    pub fn iter(&self) -> impl Iterator<Item = &(Level, LuxRange)> {
        self.ranges.iter()
    }
}

impl TryFrom<BTreeMap<String, LuxRange>> for QuantizationTable {
    type Error = ConfigError;

    fn try_from(map: BTreeMap<String, LuxRange>) -> Result<Self, Self::Error> {
        let ranges = map
            .into_iter()
            .map(|(key, range)| {
                key.trim()
                    .parse::<Level>()
                    .map(|level| (level, range))
                    .map_err(|_| ConfigError::InvalidLevel(key))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(ranges)
    }
}
