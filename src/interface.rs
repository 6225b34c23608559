//! External engine interface for the platoon controller
//!
//! The controller never owns vehicle physics. Everything it knows about the
//! running simulation arrives through this trait, and every decision it makes
//! goes back out through it.

use anyhow::Result;

/// Capabilities reported by the engine when a controller session starts
#[derive(Debug, Clone, Copy)]
pub struct EngineCapabilities {
    /// Simulation step length in seconds
    pub step_length: f64,
    /// Whether vehicle types carry a dedicated emergency deceleration value.
    /// When false, the controller falls back to the regular deceleration.
    pub reports_emergency_decel: bool,
}

/// Static attributes of a vehicle type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleTypeAttributes {
    /// Vehicle length in meters
    pub length: f64,
    /// Emergency braking deceleration in m/s^2
    pub emergency_decel: f64,
    /// Regular braking deceleration in m/s^2
    pub decel: f64,
}

/// A lane, identified by its edge id and the lane index on that edge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LaneRef {
    pub edge: String,
    pub index: u32,
}

impl LaneRef {
    pub fn new(edge: impl Into<String>, index: u32) -> Self {
        Self {
            edge: edge.into(),
            index,
        }
    }
}

/// The engine side of the platoon controller.
///
/// Per-vehicle queries answer `Ok(None)` for ids the engine does not (or no
/// longer) know; the controller treats that as a normal departure. An `Err`
/// means the engine itself is unreachable and aborts the current operation.
/// Mutations on unknown ids are expected to be silently ignored.
pub trait VehicleInterface {
    /// Report the engine's capabilities. Called once per session, during load.
    fn negotiate(&mut self) -> Result<EngineCapabilities>;

    /// Ids of all vehicles currently in the simulation
    fn list_vehicle_ids(&self) -> Result<Vec<String>>;

    /// Ids of all vehicle types the engine knows
    fn known_vehicle_types(&self) -> Result<Vec<String>>;

    /// Static attributes of a vehicle type
    fn vehicle_type_attributes(&self, type_id: &str) -> Result<Option<VehicleTypeAttributes>>;

    /// The type a vehicle currently carries
    fn vehicle_type_id(&self, vehicle_id: &str) -> Result<Option<String>>;

    /// The lane a vehicle currently drives on
    fn lane_of(&self, vehicle_id: &str) -> Result<Option<LaneRef>>;

    /// Distance from the start of the vehicle's current edge to its front bumper, in meters
    fn longitudinal_offset(&self, vehicle_id: &str) -> Result<Option<f64>>;

    /// Current speed in m/s
    fn speed_of(&self, vehicle_id: &str) -> Result<Option<f64>>;

    /// Substitute the vehicle's type
    fn set_vehicle_type(&mut self, vehicle_id: &str, type_id: &str) -> Result<()>;

    /// Constrain the vehicle's speed factor to the given band
    fn set_speed_factor_bounds(&mut self, vehicle_id: &str, min: f64, max: f64) -> Result<()>;

    /// Set the vehicle's lane-change mode code
    fn set_lane_change_mode(&mut self, vehicle_id: &str, mode: u32) -> Result<()>;

    /// Start delivering state updates for a vehicle
    fn subscribe_vehicle(&mut self, vehicle_id: &str) -> Result<()>;

    /// Stop delivering state updates for a vehicle
    fn unsubscribe_vehicle(&mut self, vehicle_id: &str) -> Result<()>;
}
