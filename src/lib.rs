//! Platoon Control Library
//!
//! A cooperative platooning controller that runs on top of an external
//! traffic simulation. The engine is reached through the `VehicleInterface`
//! trait; `control::PlatoonManager` holds the session and the `testbed`
//! engine drives everything in-process.

pub mod control;
pub mod interface;
pub mod testbed;
