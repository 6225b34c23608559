//! In-process test engine
//!
//! A minimal kinematic engine implementing `VehicleInterface`: one edge,
//! vehicles driving at `base_speed * speed_factor`, entering on a schedule
//! and leaving at the end of the edge. The demo binary and the integration
//! tests run the controller against this engine; it stands in for a real
//! traffic simulation without owning any of its complexity.

use std::collections::{BTreeMap, HashSet};

use anyhow::{bail, Result};

use crate::interface::{EngineCapabilities, LaneRef, VehicleInterface, VehicleTypeAttributes};

/// Edge id all testbed vehicles drive on
pub const TESTBED_EDGE: &str = "edge0";

#[derive(Debug, Clone)]
struct TestbedVehicle {
    type_id: String,
    lane_index: u32,
    /// Front-bumper distance from the edge start, in meters
    offset: f64,
    /// Speed driven at factor 1.0, in m/s
    base_speed: f64,
    /// Upper bound of the last speed-factor band pushed by the controller
    speed_factor: f64,
    lane_change_mode: u32,
    /// Simulation time the vehicle enters at
    depart: f64,
    active: bool,
}

/// Single-edge kinematic engine for driving the controller in tests
#[derive(Debug)]
pub struct TestbedEngine {
    step_length: f64,
    time: f64,
    edge_length: f64,
    types: BTreeMap<String, VehicleTypeAttributes>,
    vehicles: BTreeMap<String, TestbedVehicle>,
    subscriptions: HashSet<String>,
    reports_emergency_decel: bool,
    unreachable: bool,
}

impl TestbedEngine {
    pub fn new(step_length: f64) -> Self {
        Self {
            step_length,
            time: 0.0,
            edge_length: 10_000.0,
            types: BTreeMap::new(),
            vehicles: BTreeMap::new(),
            subscriptions: HashSet::new(),
            reports_emergency_decel: true,
            unreachable: false,
        }
    }

    /// Shorten or stretch the edge; vehicles leave when they pass its end
    pub fn set_edge_length(&mut self, length: f64) {
        self.edge_length = length;
    }

    /// Make the engine report types without a dedicated emergencyDecel
    pub fn set_reports_emergency_decel(&mut self, flag: bool) {
        self.reports_emergency_decel = flag;
    }

    /// Make every interface call fail, simulating a dead connection
    pub fn set_unreachable(&mut self, flag: bool) {
        self.unreachable = flag;
    }

    pub fn define_vehicle_type(
        &mut self,
        type_id: &str,
        length: f64,
        emergency_decel: f64,
        decel: f64,
    ) {
        self.types.insert(
            type_id.to_string(),
            VehicleTypeAttributes {
                length,
                emergency_decel,
                decel,
            },
        );
    }

    /// Put a vehicle on the edge right away
    pub fn insert_vehicle(&mut self, vehicle_id: &str, type_id: &str, offset: f64, base_speed: f64) {
        self.schedule_vehicle(vehicle_id, type_id, offset, base_speed, 0.0);
        if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
            vehicle.active = true;
        }
    }

    /// Register a vehicle that enters the edge at `depart` seconds
    pub fn schedule_vehicle(
        &mut self,
        vehicle_id: &str,
        type_id: &str,
        offset: f64,
        base_speed: f64,
        depart: f64,
    ) {
        self.vehicles.insert(
            vehicle_id.to_string(),
            TestbedVehicle {
                type_id: type_id.to_string(),
                lane_index: 0,
                offset,
                base_speed,
                speed_factor: 1.0,
                lane_change_mode: 0,
                depart,
                active: false,
            },
        );
    }

    /// Advance the engine by one step: activate due vehicles, move active
    /// ones, and drop those that passed the end of the edge
    pub fn advance(&mut self) {
        self.time += self.step_length;
        for vehicle in self.vehicles.values_mut() {
            if !vehicle.active && vehicle.depart <= self.time {
                vehicle.active = true;
            }
            if vehicle.active {
                vehicle.offset += vehicle.base_speed * vehicle.speed_factor * self.step_length;
            }
        }
        let edge_length = self.edge_length;
        self.vehicles
            .retain(|_, vehicle| !(vehicle.active && vehicle.offset >= edge_length));
    }

    /// Teleport a vehicle to another lane on the edge
    pub fn move_to_lane(&mut self, vehicle_id: &str, lane_index: u32) {
        if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
            vehicle.lane_index = lane_index;
        }
    }

    /// Drop a vehicle from the simulation immediately
    pub fn remove_vehicle(&mut self, vehicle_id: &str) {
        self.vehicles.remove(vehicle_id);
    }

    /// Change the speed a vehicle drives at factor 1.0
    pub fn set_base_speed(&mut self, vehicle_id: &str, base_speed: f64) {
        if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
            vehicle.base_speed = base_speed;
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Speed factor currently applied to a vehicle
    pub fn speed_factor_of(&self, vehicle_id: &str) -> Option<f64> {
        self.vehicles
            .get(vehicle_id)
            .map(|vehicle| vehicle.speed_factor)
    }

    /// Type a vehicle currently carries, substituted or not
    pub fn type_of(&self, vehicle_id: &str) -> Option<&str> {
        self.vehicles
            .get(vehicle_id)
            .map(|vehicle| vehicle.type_id.as_str())
    }

    pub fn lane_change_mode_of(&self, vehicle_id: &str) -> Option<u32> {
        self.vehicles
            .get(vehicle_id)
            .map(|vehicle| vehicle.lane_change_mode)
    }

    pub fn offset_of(&self, vehicle_id: &str) -> Option<f64> {
        self.vehicles.get(vehicle_id).map(|vehicle| vehicle.offset)
    }

    pub fn is_subscribed(&self, vehicle_id: &str) -> bool {
        self.subscriptions.contains(vehicle_id)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn guard(&self) -> Result<()> {
        if self.unreachable {
            bail!("testbed engine unreachable");
        }
        Ok(())
    }

    fn active_vehicle(&self, vehicle_id: &str) -> Option<&TestbedVehicle> {
        self.vehicles
            .get(vehicle_id)
            .filter(|vehicle| vehicle.active)
    }
}

impl VehicleInterface for TestbedEngine {
    fn negotiate(&mut self) -> Result<EngineCapabilities> {
        self.guard()?;
        Ok(EngineCapabilities {
            step_length: self.step_length,
            reports_emergency_decel: self.reports_emergency_decel,
        })
    }

    fn list_vehicle_ids(&self) -> Result<Vec<String>> {
        self.guard()?;
        Ok(self
            .vehicles
            .iter()
            .filter(|(_, vehicle)| vehicle.active)
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn known_vehicle_types(&self) -> Result<Vec<String>> {
        self.guard()?;
        Ok(self.types.keys().cloned().collect())
    }

    fn vehicle_type_attributes(&self, type_id: &str) -> Result<Option<VehicleTypeAttributes>> {
        self.guard()?;
        Ok(self.types.get(type_id).copied())
    }

    fn vehicle_type_id(&self, vehicle_id: &str) -> Result<Option<String>> {
        self.guard()?;
        Ok(self
            .active_vehicle(vehicle_id)
            .map(|vehicle| vehicle.type_id.clone()))
    }

    fn lane_of(&self, vehicle_id: &str) -> Result<Option<LaneRef>> {
        self.guard()?;
        Ok(self
            .active_vehicle(vehicle_id)
            .map(|vehicle| LaneRef::new(TESTBED_EDGE, vehicle.lane_index)))
    }

    fn longitudinal_offset(&self, vehicle_id: &str) -> Result<Option<f64>> {
        self.guard()?;
        Ok(self.active_vehicle(vehicle_id).map(|vehicle| vehicle.offset))
    }

    fn speed_of(&self, vehicle_id: &str) -> Result<Option<f64>> {
        self.guard()?;
        Ok(self
            .active_vehicle(vehicle_id)
            .map(|vehicle| vehicle.base_speed * vehicle.speed_factor))
    }

    fn set_vehicle_type(&mut self, vehicle_id: &str, type_id: &str) -> Result<()> {
        self.guard()?;
        if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
            vehicle.type_id = type_id.to_string();
        }
        Ok(())
    }

    fn set_speed_factor_bounds(&mut self, vehicle_id: &str, _min: f64, max: f64) -> Result<()> {
        self.guard()?;
        if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
            // the testbed always drives at the top of the allowed band
            vehicle.speed_factor = max;
        }
        Ok(())
    }

    fn set_lane_change_mode(&mut self, vehicle_id: &str, mode: u32) -> Result<()> {
        self.guard()?;
        if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
            vehicle.lane_change_mode = mode;
        }
        Ok(())
    }

    fn subscribe_vehicle(&mut self, vehicle_id: &str) -> Result<()> {
        self.guard()?;
        self.subscriptions.insert(vehicle_id.to_string());
        Ok(())
    }

    fn unsubscribe_vehicle(&mut self, vehicle_id: &str) -> Result<()> {
        self.guard()?;
        self.subscriptions.remove(vehicle_id);
        Ok(())
    }
}
