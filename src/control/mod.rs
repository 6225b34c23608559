//! Cooperative platooning controller
//!
//! This module contains the full controller logic. It runs against any
//! engine implementing `VehicleInterface` and can be driven step by step,
//! which makes it testable without a live traffic simulation behind it.

mod config;
mod events;
mod manager;
mod platoon;
mod types;
mod vehicle;
mod vtypes;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use config::{PlatoonConfig, VehicleTypeMapping};
#[allow(unused_imports)]
pub use events::{format_float, format_id_list, EventLog, LogEntry, MAX_LOG_SIZE};
pub use manager::PlatoonManager;
#[allow(unused_imports)]
pub use platoon::Platoon;
#[allow(unused_imports)]
pub use types::{
    measured_gap, ModeTable, PlatoonId, PlatoonMode, SpeedFactorRange, VehicleState,
    DEFAULT_VEHICLE_LENGTH,
};
#[allow(unused_imports)]
pub use vehicle::{follower_speed_factor, ControlledVehicle};
#[allow(unused_imports)]
pub use vtypes::{RoleTypeMap, VehicleTypeRegistry};
