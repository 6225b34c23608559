//! Controller configuration
//!
//! Plain data. `PlatoonManager::load` validates everything once; past that
//! point the rest of the crate trusts these values.

use std::collections::HashSet;

use anyhow::{bail, Result};
use serde::Deserialize;

use super::types::{ModeTable, SpeedFactorRange};

/// One row of the vehicle-type substitution table
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleTypeMapping {
    /// Type the vehicle entered the simulation with
    pub original: String,
    /// Substitute carried while leading a platoon
    #[serde(default)]
    pub leader: Option<String>,
    /// Substitute carried while following inside a platoon
    #[serde(default)]
    pub follower: Option<String>,
    /// Substitute carried while catching up to a platoon
    #[serde(default)]
    pub catchup: Option<String>,
    /// Substitute carried while counting down to a split
    #[serde(default)]
    pub catchup_follower: Option<String>,
}

/// Full configuration for one controller session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatoonConfig {
    /// Desired control frequency in Hz. Clamped to one run per engine step.
    pub control_rate: f64,

    /// Substring selectors matched against a vehicle's original type id.
    /// The empty string matches every vehicle.
    pub vehicle_selectors: Vec<String>,

    /// Intra-platoon gap target and join threshold, in meters
    pub max_platoon_gap: f64,

    /// Maximum distance for catching up to a platoon ahead, in meters
    pub catchup_dist: f64,

    /// Fraction by which the tolerated in-platoon gap may exceed
    /// max_platoon_gap before a follower is considered disconnected
    pub switch_impatience_factor: f64,

    /// Seconds a disconnected follower waits before splitting off
    pub platoon_split_time: f64,

    /// Speed-factor units added per meter of gap error in follower control
    pub gap_control_gain: f64,

    /// Per-role lane-change mode codes
    pub lc_mode: ModeTable<u32>,

    /// Per-role allowed speed-factor bands
    pub speed_factor: ModeTable<SpeedFactorRange>,

    /// Vehicle-type substitution table
    pub vtype_map: Vec<VehicleTypeMapping>,

    /// 0 silent, 1 warnings, 2 reports, 3 extended, 4 per-vehicle detail
    pub verbosity: u8,
}

impl Default for PlatoonConfig {
    fn default() -> Self {
        Self {
            control_rate: 10.0,
            vehicle_selectors: vec![String::new()],
            max_platoon_gap: 15.0,
            catchup_dist: 50.0,
            switch_impatience_factor: 0.1,
            platoon_split_time: 3.0,
            gap_control_gain: 0.01,
            lc_mode: ModeTable {
                original: 0b1001010101,
                leader: 0b1001010101,
                follower: 0b1000000010,
                catchup: 0b1000000010,
                catchup_follower: 0b1000000010,
            },
            speed_factor: ModeTable {
                original: SpeedFactorRange::new(1.0, 1.0),
                leader: SpeedFactorRange::new(1.0, 1.0),
                follower: SpeedFactorRange::new(0.9, 1.2),
                catchup: SpeedFactorRange::new(1.1, 1.5),
                catchup_follower: SpeedFactorRange::new(1.0, 1.5),
            },
            vtype_map: Vec::new(),
            verbosity: 1,
        }
    }
}

impl PlatoonConfig {
    /// Check the configuration for fatal mistakes.
    /// Unknown type ids are not fatal; they degrade to warnings during load.
    pub fn validate(&self) -> Result<()> {
        if self.control_rate <= 0.0 {
            bail!("control_rate must be positive, got {}", self.control_rate);
        }
        if self.max_platoon_gap <= 0.0 {
            bail!("max_platoon_gap must be positive, got {}", self.max_platoon_gap);
        }
        if self.catchup_dist < self.max_platoon_gap {
            bail!(
                "catchup_dist ({}) must not be smaller than max_platoon_gap ({})",
                self.catchup_dist,
                self.max_platoon_gap
            );
        }
        if self.switch_impatience_factor < 0.0 {
            bail!(
                "switch_impatience_factor must not be negative, got {}",
                self.switch_impatience_factor
            );
        }
        if self.platoon_split_time < 0.0 {
            bail!("platoon_split_time must not be negative, got {}", self.platoon_split_time);
        }
        if self.gap_control_gain < 0.0 {
            bail!("gap_control_gain must not be negative, got {}", self.gap_control_gain);
        }
        if self.vehicle_selectors.is_empty() {
            bail!("vehicle_selectors must contain at least one selector");
        }
        for (role, range) in self.speed_factor.entries() {
            if range.min <= 0.0 || range.min > range.max {
                bail!(
                    "speed_factor band for role '{}' is invalid: min {}, max {}",
                    role,
                    range.min,
                    range.max
                );
            }
        }
        if self.verbosity > 4 {
            bail!("verbosity must be between 0 and 4, got {}", self.verbosity);
        }

        let mut originals = HashSet::new();
        for row in &self.vtype_map {
            if row.original.is_empty() {
                bail!("vtype_map row with an empty original type id");
            }
            if !originals.insert(row.original.as_str()) {
                bail!("duplicate vtype_map row for vType '{}'", row.original);
            }
        }
        Ok(())
    }
}
