//! Core types for the platoon controller
//!
//! These are standalone types shared across the controller modules.

use std::fmt;

use serde::Deserialize;

use crate::interface::LaneRef;

/// Role a controlled vehicle currently plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatoonMode {
    /// Managed but not platooning
    None,
    /// Front vehicle of a platoon
    Leader,
    /// In-platoon vehicle driving behind its predecessor
    Follower,
    /// Standalone vehicle closing in on a platoon ahead
    Catchup,
    /// Platoon member that lost contact and counts down to a split
    CatchupFollower,
}

impl PlatoonMode {
    /// Whether the mode is one of the in-platoon follower roles
    pub fn is_follower(self) -> bool {
        matches!(self, PlatoonMode::Follower | PlatoonMode::CatchupFollower)
    }
}

impl fmt::Display for PlatoonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlatoonMode::None => "NONE",
            PlatoonMode::Leader => "LEADER",
            PlatoonMode::Follower => "FOLLOWER",
            PlatoonMode::Catchup => "CATCHUP",
            PlatoonMode::CatchupFollower => "CATCHUP_FOLLOWER",
        };
        write!(f, "{}", name)
    }
}

/// A wrapper type for platoon IDs
/// Ids are handed out by the manager in creation order and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatoonId(pub u64);

impl fmt::Display for PlatoonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A per-role table of values, keyed by PlatoonMode.
/// NONE maps to the `original` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ModeTable<T> {
    pub original: T,
    pub leader: T,
    pub follower: T,
    pub catchup: T,
    pub catchup_follower: T,
}

impl<T> ModeTable<T> {
    pub fn get(&self, mode: PlatoonMode) -> &T {
        match mode {
            PlatoonMode::None => &self.original,
            PlatoonMode::Leader => &self.leader,
            PlatoonMode::Follower => &self.follower,
            PlatoonMode::Catchup => &self.catchup,
            PlatoonMode::CatchupFollower => &self.catchup_follower,
        }
    }

    /// Role names paired with their entries, for validation sweeps
    pub fn entries(&self) -> [(&'static str, &T); 5] {
        [
            ("original", &self.original),
            ("leader", &self.leader),
            ("follower", &self.follower),
            ("catchup", &self.catchup),
            ("catchup_follower", &self.catchup_follower),
        ]
    }
}

/// Allowed speed-factor band for a role
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SpeedFactorRange {
    pub min: f64,
    pub max: f64,
}

impl SpeedFactorRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Last state snapshot read from the engine for a tracked vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub lane: LaneRef,
    /// Distance from the edge start to the front bumper, in meters
    pub offset: f64,
    /// Speed in m/s
    pub speed: f64,
}

/// Rear-bumper-to-front-bumper gap between two vehicles, in meters.
/// None when the pair drives on different lanes and the offsets are not
/// comparable. Negative values mean the vehicles overlap.
pub fn measured_gap(rear: &VehicleState, front: &VehicleState, front_length: f64) -> Option<f64> {
    if rear.lane != front.lane {
        return None;
    }
    Some(front.offset - front_length - rear.offset)
}

/// Length assumed for a vehicle whose type attributes are unavailable
pub const DEFAULT_VEHICLE_LENGTH: f64 = 5.0;
