//! Per-vehicle controller state
//!
//! One `ControlledVehicle` exists for every vehicle the controller manages.
//! It remembers the original type the vehicle entered with, which platoon it
//! belongs to, and whether role commands still need to be pushed to the
//! engine.

use super::types::{PlatoonId, PlatoonMode, SpeedFactorRange, VehicleState};

#[derive(Debug, Clone)]
pub struct ControlledVehicle {
    id: String,
    /// Type the vehicle entered the simulation with
    original_type: String,
    /// Length of the original type in meters, used for gap measurement
    length: f64,
    mode: PlatoonMode,
    /// Platoon the vehicle belongs to while LEADER/FOLLOWER/CATCHUPFOLLOWER
    platoon: Option<PlatoonId>,
    /// Platoon a CATCHUP vehicle is closing in on
    catchup_target: Option<PlatoonId>,
    /// Remaining countdown before a disconnected follower splits off.
    /// Meaningful only while in CATCHUPFOLLOWER mode.
    time_until_split: f64,
    /// Last state snapshot from the engine
    state: Option<VehicleState>,
    /// Role commands must be pushed at the next emission
    commands_pending: bool,
}

impl ControlledVehicle {
    pub fn new(id: String, original_type: String, length: f64) -> Self {
        Self {
            id,
            original_type,
            length,
            mode: PlatoonMode::None,
            platoon: None,
            catchup_target: None,
            time_until_split: 0.0,
            state: None,
            commands_pending: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn original_type(&self) -> &str {
        &self.original_type
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn mode(&self) -> PlatoonMode {
        self.mode
    }

    pub fn platoon(&self) -> Option<PlatoonId> {
        self.platoon
    }

    pub fn catchup_target(&self) -> Option<PlatoonId> {
        self.catchup_target
    }

    pub fn state(&self) -> Option<&VehicleState> {
        self.state.as_ref()
    }

    pub fn time_until_split(&self) -> f64 {
        self.time_until_split
    }

    /// Switch role; remembers that role commands must be pushed
    pub fn set_mode(&mut self, mode: PlatoonMode) {
        if self.mode != mode {
            self.mode = mode;
            self.commands_pending = true;
        }
    }

    pub fn set_platoon(&mut self, platoon: Option<PlatoonId>) {
        self.platoon = platoon;
    }

    pub fn set_catchup_target(&mut self, target: Option<PlatoonId>) {
        self.catchup_target = target;
    }

    pub fn set_state(&mut self, state: Option<VehicleState>) {
        self.state = state;
    }

    pub fn start_split_countdown(&mut self, seconds: f64) {
        self.time_until_split = seconds;
    }

    /// Advance the split countdown; returns the remaining time
    pub fn tick_split_countdown(&mut self, elapsed: f64) -> f64 {
        self.time_until_split -= elapsed;
        self.time_until_split
    }

    /// Whether role commands are due, clearing the flag
    pub fn take_commands_pending(&mut self) -> bool {
        std::mem::replace(&mut self.commands_pending, false)
    }
}

/// Proportional speed factor for a follower holding its gap.
///
/// # Arguments
/// * `bounds` - the role's allowed speed-factor band
/// * `gain` - factor units per meter of gap error
/// * `gap_error` - measured gap minus the desired gap, in meters
pub fn follower_speed_factor(bounds: &SpeedFactorRange, gain: f64, gap_error: f64) -> f64 {
    bounds.clamp(bounds.midpoint() + gain * gap_error)
}
