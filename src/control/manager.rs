//! Platoon manager
//!
//! Owns everything for one controller session: the tracked vehicles, the
//! platoons, the type registry and the event logs. `load` starts a session
//! against an engine, `step` runs one control cycle after each engine step,
//! and `stop` hands every vehicle back untouched.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context, Result};
use ordered_float::OrderedFloat;
use sorted_vec::SortedVec;

use crate::interface::{EngineCapabilities, VehicleInterface};

use super::config::PlatoonConfig;
use super::events::{format_float, format_id_list, EventLog};
use super::platoon::Platoon;
use super::types::{
    measured_gap, PlatoonId, PlatoonMode, VehicleState, DEFAULT_VEHICLE_LENGTH,
};
use super::vehicle::{follower_speed_factor, ControlledVehicle};
use super::vtypes::VehicleTypeRegistry;

/// A join candidate ahead of a searching vehicle.
/// Candidates order by gap first, then by id to break ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    gap: OrderedFloat<f64>,
    vehicle_id: String,
}

/// The platoon controller session
#[derive(Debug)]
pub struct PlatoonManager {
    config: PlatoonConfig,
    caps: EngineCapabilities,
    registry: VehicleTypeRegistry,
    events: EventLog,

    /// All managed vehicles, keyed by engine vehicle id
    vehicles: HashMap<String, ControlledVehicle>,

    /// All live platoons
    platoons: HashMap<PlatoonId, Platoon>,

    /// Next platoon id to assign
    next_id: u64,

    /// Seconds between control cycles, at least one engine step
    control_interval: f64,

    /// Time accumulated since the control phases last ran
    time_since_control: f64,

    /// Engine steps seen since load
    steps: u64,
}

impl PlatoonManager {
    /// Validate the configuration, negotiate engine capabilities and start a
    /// session. Fails on malformed configuration or an unreachable engine;
    /// unknown vehicle types only produce warnings.
    pub fn load(config: PlatoonConfig, iface: &mut dyn VehicleInterface) -> Result<Self> {
        config.validate().context("invalid platooning configuration")?;
        let caps = iface
            .negotiate()
            .context("engine capability negotiation failed")?;
        if caps.step_length <= 0.0 {
            bail!(
                "engine reported a non-positive step length ({})",
                caps.step_length
            );
        }

        let mut events = EventLog::new(config.verbosity);

        // the controller cannot run more often than the engine steps
        let mut control_interval = 1.0 / config.control_rate;
        if control_interval < caps.step_length {
            events.warn(
                0.0,
                format!(
                    "Restricting given control rate (= {} per sec.) to 1 per timestep (= {} per sec.)",
                    config.control_rate,
                    1.0 / caps.step_length
                ),
            );
            control_interval = caps.step_length;
        }

        let registry = VehicleTypeRegistry::from_config(&config, &caps, iface, &mut events, 0.0)?;

        Ok(Self {
            config,
            caps,
            registry,
            events,
            vehicles: HashMap::new(),
            platoons: HashMap::new(),
            next_id: 0,
            control_interval,
            // run the control phases on the very first step
            time_since_control: control_interval,
            steps: 0,
        })
    }

    /// One controller step. Call once after each engine step.
    ///
    /// Roster changes are picked up every step; the control phases (state
    /// refresh, split maintenance, catch-up, formation, command emission)
    /// run at the configured control interval.
    pub fn step(&mut self, iface: &mut dyn VehicleInterface) -> Result<()> {
        self.steps += 1;
        let time = self.sim_time();

        self.sync_roster(iface, time)?;

        self.time_since_control += self.caps.step_length;
        if self.time_since_control < self.control_interval {
            return Ok(());
        }
        let elapsed = self.time_since_control;
        self.time_since_control = 0.0;

        self.refresh_states(iface, time)?;
        self.update_platoon_ordering(time);
        self.maintain_splits(time, elapsed);
        self.advance_catchups(time);
        self.merge_platoons(time);
        self.form_platoons(time);
        self.emit_commands(iface, time)?;
        Ok(())
    }

    /// End the session: restore every tracked vehicle's original attributes,
    /// unsubscribe it and drop all platooning state. The event logs are kept
    /// until `reset_logs` is called.
    pub fn stop(&mut self, iface: &mut dyn VehicleInterface) -> Result<()> {
        let mut vehicle_ids: Vec<String> = self.vehicles.keys().cloned().collect();
        vehicle_ids.sort();
        for vehicle_id in vehicle_ids {
            let Some(vehicle) = self.vehicles.remove(&vehicle_id) else {
                continue;
            };
            self.push_role_commands(&vehicle_id, vehicle.original_type(), PlatoonMode::None, iface)?;
            iface.unsubscribe_vehicle(&vehicle_id)?;
        }
        self.platoons.clear();
        Ok(())
    }

    /// Simulation time in seconds since the session started
    pub fn sim_time(&self) -> f64 {
        self.steps as f64 * self.caps.step_length
    }

    /// Seconds between control cycles after rate clamping
    pub fn control_interval(&self) -> f64 {
        self.control_interval
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Clear the warning and report logs
    pub fn reset_logs(&mut self) {
        self.events.reset();
    }

    pub fn tracked_vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn platoon_count(&self) -> usize {
        self.platoons.len()
    }

    pub fn platoons(&self) -> impl Iterator<Item = &Platoon> {
        self.platoons.values()
    }

    pub fn platoon(&self, platoon_id: PlatoonId) -> Option<&Platoon> {
        self.platoons.get(&platoon_id)
    }

    /// Current mode of a tracked vehicle
    pub fn vehicle_mode(&self, vehicle_id: &str) -> Option<PlatoonMode> {
        self.vehicles.get(vehicle_id).map(|vehicle| vehicle.mode())
    }

    /// Platoon a tracked vehicle belongs to
    pub fn platoon_of(&self, vehicle_id: &str) -> Option<PlatoonId> {
        self.vehicles
            .get(vehicle_id)
            .and_then(|vehicle| vehicle.platoon())
    }

    /// Platoon a CATCHUP vehicle is heading for
    pub fn catchup_target_of(&self, vehicle_id: &str) -> Option<PlatoonId> {
        self.vehicles
            .get(vehicle_id)
            .and_then(|vehicle| vehicle.catchup_target())
    }

    fn next_platoon_id(&mut self) -> PlatoonId {
        let id = PlatoonId(self.next_id);
        self.next_id += 1;
        id
    }

    fn matches_selector(&self, type_id: &str) -> bool {
        self.config
            .vehicle_selectors
            .iter()
            .any(|selector| type_id.contains(selector.as_str()))
    }

    /// Track departures and arrivals. Departures are processed first so a
    /// reused id is fully torn down before it is picked up again.
    fn sync_roster(&mut self, iface: &mut dyn VehicleInterface, time: f64) -> Result<()> {
        let roster = iface
            .list_vehicle_ids()
            .context("vehicle roster unavailable")?;
        let present: HashSet<&str> = roster.iter().map(String::as_str).collect();

        let mut departed: Vec<String> = self
            .vehicles
            .keys()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();
        departed.sort();
        for vehicle_id in departed {
            self.remove_vehicle(&vehicle_id, iface, time)?;
        }

        let mut added: Vec<String> = roster
            .into_iter()
            .filter(|id| !self.vehicles.contains_key(id))
            .collect();
        added.sort();
        for vehicle_id in added {
            self.try_add_vehicle(&vehicle_id, iface, time)?;
        }
        Ok(())
    }

    /// Start managing a vehicle if its original type matches a selector
    fn try_add_vehicle(
        &mut self,
        vehicle_id: &str,
        iface: &mut dyn VehicleInterface,
        time: f64,
    ) -> Result<()> {
        // the vehicle may vanish between the roster call and this query
        let Some(type_id) = iface.vehicle_type_id(vehicle_id)? else {
            return Ok(());
        };
        if !self.matches_selector(&type_id) {
            return Ok(());
        }

        let length = self
            .registry
            .lookup_attributes(&type_id, iface)?
            .map(|attrs| attrs.length)
            .unwrap_or(DEFAULT_VEHICLE_LENGTH);

        iface.subscribe_vehicle(vehicle_id)?;
        let vehicle = ControlledVehicle::new(vehicle_id.to_string(), type_id, length);
        // normalize the vehicle to its NONE-role attributes right away
        self.push_role_commands(vehicle_id, vehicle.original_type(), vehicle.mode(), iface)?;
        self.events
            .report(time, 2, format!("Adding vehicle '{}'", vehicle_id));
        self.vehicles.insert(vehicle_id.to_string(), vehicle);
        Ok(())
    }

    /// Tear a vehicle down: detach it from its platoon, restore its original
    /// attributes and stop tracking it. The restoration commands are no-ops
    /// on the engine side when the vehicle already left.
    fn remove_vehicle(
        &mut self,
        vehicle_id: &str,
        iface: &mut dyn VehicleInterface,
        time: f64,
    ) -> Result<()> {
        let Some(vehicle) = self.vehicles.remove(vehicle_id) else {
            return Ok(());
        };
        if let Some(platoon_id) = vehicle.platoon() {
            self.detach_from_platoon(platoon_id, vehicle_id);
        }
        self.push_role_commands(vehicle_id, vehicle.original_type(), PlatoonMode::None, iface)?;
        iface.unsubscribe_vehicle(vehicle_id)?;
        self.events
            .report(time, 2, format!("Removing arrived vehicle '{}'", vehicle_id));
        Ok(())
    }

    /// Remove a member from a platoon, dissolving the platoon when it ends up
    /// empty and promoting the next member when the front vehicle left
    fn detach_from_platoon(&mut self, platoon_id: PlatoonId, vehicle_id: &str) {
        let (now_empty, promoted) = {
            let Some(platoon) = self.platoons.get_mut(&platoon_id) else {
                return;
            };
            let was_leader = platoon.leader_id() == Some(vehicle_id);
            platoon.remove_member(vehicle_id);
            let promoted = if was_leader {
                platoon.leader_id().map(str::to_string)
            } else {
                None
            };
            (platoon.is_empty(), promoted)
        };

        if now_empty {
            self.platoons.remove(&platoon_id);
        } else if let Some(new_leader) = promoted {
            if let Some(vehicle) = self.vehicles.get_mut(&new_leader) {
                vehicle.set_mode(PlatoonMode::Leader);
            }
        }
    }

    /// Refresh lane, offset and speed for every tracked vehicle. A missing
    /// answer means the vehicle disappeared and it is removed the normal way.
    fn refresh_states(&mut self, iface: &mut dyn VehicleInterface, time: f64) -> Result<()> {
        let mut vehicle_ids: Vec<String> = self.vehicles.keys().cloned().collect();
        vehicle_ids.sort();

        let mut vanished = Vec::new();
        for vehicle_id in vehicle_ids {
            let lane = iface.lane_of(&vehicle_id)?;
            let offset = iface.longitudinal_offset(&vehicle_id)?;
            let speed = iface.speed_of(&vehicle_id)?;
            match (lane, offset, speed) {
                (Some(lane), Some(offset), Some(speed)) => {
                    if let Some(vehicle) = self.vehicles.get_mut(&vehicle_id) {
                        vehicle.set_state(Some(VehicleState { lane, offset, speed }));
                    }
                }
                _ => vanished.push(vehicle_id),
            }
        }
        for vehicle_id in vanished {
            self.remove_vehicle(&vehicle_id, iface, time)?;
        }
        Ok(())
    }

    /// Re-sort platoon members by position when they all share an edge,
    /// moving leadership to the new front vehicle after an overtake
    fn update_platoon_ordering(&mut self, time: f64) {
        let mut platoon_ids: Vec<PlatoonId> = self.platoons.keys().copied().collect();
        platoon_ids.sort();

        for platoon_id in platoon_ids {
            let Some(platoon) = self.platoons.get(&platoon_id) else {
                continue;
            };
            if platoon.size() < 2 {
                continue;
            }

            // offsets only compare when the whole platoon is on one edge
            let mut offsets: HashMap<String, f64> = HashMap::new();
            let mut shared_edge: Option<&str> = None;
            let mut comparable = true;
            for member_id in platoon.member_ids() {
                let Some(state) = self.vehicles.get(member_id).and_then(|v| v.state()) else {
                    comparable = false;
                    break;
                };
                match shared_edge {
                    None => shared_edge = Some(&state.lane.edge),
                    Some(edge) if edge == state.lane.edge => {}
                    _ => {
                        comparable = false;
                        break;
                    }
                }
                offsets.insert(member_id.clone(), state.offset);
            }
            if !comparable {
                continue;
            }

            let old_leader = platoon.leader_id().map(str::to_string);
            let Some(platoon) = self.platoons.get_mut(&platoon_id) else {
                continue;
            };
            if !platoon.sort_by_offset(|id| offsets.get(id).copied().unwrap_or(0.0)) {
                continue;
            }
            let new_leader = platoon.leader_id().map(str::to_string);
            let member_list = format_id_list(platoon.member_ids());

            if old_leader != new_leader {
                if let Some(old_id) = old_leader {
                    if let Some(vehicle) = self.vehicles.get_mut(&old_id) {
                        if vehicle.mode() == PlatoonMode::Leader {
                            vehicle.set_mode(PlatoonMode::Follower);
                        }
                    }
                }
                if let Some(new_id) = new_leader {
                    if let Some(vehicle) = self.vehicles.get_mut(&new_id) {
                        vehicle.set_mode(PlatoonMode::Leader);
                    }
                }
            }

            self.events.report(
                time,
                3,
                format!("Reordered Platoon '{}'. New order: {}", platoon_id, member_list),
            );
        }
    }

    /// Watch intra-platoon gaps. A follower that lost contact with its
    /// predecessor counts down to a split; the platoon splits at its position
    /// when the countdown runs out, and the countdown resets when contact is
    /// restored first.
    fn maintain_splits(&mut self, time: f64, elapsed: f64) {
        let tolerated_gap =
            self.config.max_platoon_gap * (1.0 + self.config.switch_impatience_factor);
        let mut platoon_ids: Vec<PlatoonId> = self.platoons.keys().copied().collect();
        platoon_ids.sort();

        let mut pending_splits: Vec<(PlatoonId, usize)> = Vec::new();
        for platoon_id in platoon_ids {
            let members: Vec<String> = match self.platoons.get(&platoon_id) {
                Some(platoon) => platoon.member_ids().to_vec(),
                None => continue,
            };

            for index in 1..members.len() {
                let follower_id = &members[index];
                let gap = self.pair_gap(follower_id, &members[index - 1]);
                let disconnected = match gap {
                    Some(gap) => gap > tolerated_gap,
                    None => true,
                };

                let Some(vehicle) = self.vehicles.get_mut(follower_id) else {
                    continue;
                };
                if disconnected {
                    match vehicle.mode() {
                        PlatoonMode::Follower => {
                            vehicle.set_mode(PlatoonMode::CatchupFollower);
                            vehicle.start_split_countdown(self.config.platoon_split_time);
                        }
                        PlatoonMode::CatchupFollower => {
                            if vehicle.tick_split_countdown(elapsed) <= 0.0 {
                                pending_splits.push((platoon_id, index));
                            }
                        }
                        _ => {}
                    }
                    let remaining = vehicle.time_until_split().max(0.0);
                    self.events.report(
                        time,
                        3,
                        format!(
                            "Time until split from platoon for vehicle '{}': {}",
                            follower_id,
                            format_float(remaining)
                        ),
                    );
                } else if vehicle.mode() == PlatoonMode::CatchupFollower {
                    // contact restored before the countdown ran out
                    vehicle.set_mode(PlatoonMode::Follower);
                }
            }
        }

        // execute rear-most splits first so the indices stay valid
        pending_splits.sort_by_key(|(platoon_id, index)| (*platoon_id, Reverse(*index)));
        for (platoon_id, index) in pending_splits {
            self.execute_split(platoon_id, index, time);
        }
    }

    /// Split a platoon: members from `index` onward move into a fresh
    /// platoon and the first of them takes the lead
    fn execute_split(&mut self, platoon_id: PlatoonId, index: usize, time: f64) {
        let valid = self
            .platoons
            .get(&platoon_id)
            .map_or(false, |platoon| index > 0 && index < platoon.size());
        if !valid {
            return;
        }

        let new_id = self.next_platoon_id();
        let Some(platoon) = self.platoons.get_mut(&platoon_id) else {
            return;
        };
        let tail = platoon.split_off(index, new_id);
        let front_members = format_id_list(platoon.member_ids());
        let tail_members: Vec<String> = tail.member_ids().to_vec();
        self.platoons.insert(new_id, tail);

        for (position, member_id) in tail_members.iter().enumerate() {
            if let Some(vehicle) = self.vehicles.get_mut(member_id) {
                vehicle.set_platoon(Some(new_id));
                if position == 0 {
                    vehicle.set_mode(PlatoonMode::Leader);
                }
            }
        }

        self.events.report(
            time,
            2,
            format!(
                "Platoon '{}' splits (ID of new platoon: '{}'):\n    Platoon '{}': {}\n    Platoon '{}': {}",
                platoon_id,
                new_id,
                platoon_id,
                front_members,
                new_id,
                format_id_list(&tail_members)
            ),
        );
    }

    /// Move CATCHUP vehicles along: join the target platoon when close
    /// enough, fall back to NONE when the target got away
    fn advance_catchups(&mut self, time: f64) {
        let mut catchup_ids: Vec<String> = self
            .vehicles
            .values()
            .filter(|vehicle| vehicle.mode() == PlatoonMode::Catchup)
            .map(|vehicle| vehicle.id().to_string())
            .collect();
        catchup_ids.sort();

        for vehicle_id in catchup_ids {
            let target = self
                .vehicles
                .get(&vehicle_id)
                .and_then(|vehicle| vehicle.catchup_target());

            // the target platoon must still exist and its tail must not be
            // about to split off
            let tail_info: Option<(PlatoonId, String)> = target.and_then(|platoon_id| {
                let platoon = self.platoons.get(&platoon_id)?;
                let tail_id = platoon.tail_id()?;
                if self.vehicles.get(tail_id)?.mode() == PlatoonMode::CatchupFollower {
                    return None;
                }
                Some((platoon_id, tail_id.to_string()))
            });

            let Some((platoon_id, tail_id)) = tail_info else {
                self.abandon_catchup(&vehicle_id, time);
                continue;
            };

            match self.pair_gap(&vehicle_id, &tail_id) {
                Some(gap) if gap <= self.config.max_platoon_gap => {
                    self.join_platoon(&vehicle_id, platoon_id, time);
                }
                Some(gap) if gap <= self.config.catchup_dist => {}
                _ => self.abandon_catchup(&vehicle_id, time),
            }
        }
    }

    /// Give up on a catch-up and return the vehicle to NONE
    fn abandon_catchup(&mut self, vehicle_id: &str, time: f64) {
        let Some(vehicle) = self.vehicles.get_mut(vehicle_id) else {
            return;
        };
        let target = vehicle.catchup_target();
        vehicle.set_mode(PlatoonMode::None);
        vehicle.set_catchup_target(None);
        if let Some(platoon_id) = target {
            self.events.report(
                time,
                3,
                format!(
                    "Vehicle '{}' stopped catching up to Platoon '{}'",
                    vehicle_id, platoon_id
                ),
            );
        }
    }

    /// Append a vehicle at the rear of a platoon as FOLLOWER
    fn join_platoon(&mut self, vehicle_id: &str, platoon_id: PlatoonId, time: f64) {
        let Some(platoon) = self.platoons.get_mut(&platoon_id) else {
            return;
        };
        platoon.push_rear(vehicle_id.to_string());
        let member_list = format_id_list(platoon.member_ids());

        if let Some(vehicle) = self.vehicles.get_mut(vehicle_id) {
            vehicle.set_mode(PlatoonMode::Follower);
            vehicle.set_platoon(Some(platoon_id));
            vehicle.set_catchup_target(None);
        }

        self.events.report(
            time,
            2,
            format!(
                "Vehicle '{}' joined Platoon '{}', which now contains vehicles:\n{}",
                vehicle_id, platoon_id, member_list
            ),
        );
    }

    /// Merge a platoon into the one directly ahead once its leader has
    /// closed in on that platoon's tail
    fn merge_platoons(&mut self, time: f64) {
        let mut platoon_ids: Vec<PlatoonId> = self.platoons.keys().copied().collect();
        platoon_ids.sort();

        for platoon_id in platoon_ids {
            // may have been absorbed by an earlier merge this tick
            let Some(platoon) = self.platoons.get(&platoon_id) else {
                continue;
            };
            let Some(leader_id) = platoon.leader_id().map(str::to_string) else {
                continue;
            };
            let members: HashSet<String> = platoon.member_ids().iter().cloned().collect();
            let Some(leader_state) = self
                .vehicles
                .get(&leader_id)
                .and_then(|vehicle| vehicle.state())
                .cloned()
            else {
                continue;
            };

            // nearest tracked vehicle ahead of the leader on the same lane
            let mut nearest: Option<Candidate> = None;
            for other in self.vehicles.values() {
                if members.contains(other.id()) {
                    continue;
                }
                let Some(other_state) = other.state() else {
                    continue;
                };
                if other_state.offset <= leader_state.offset {
                    continue;
                }
                let Some(gap) = measured_gap(&leader_state, other_state, other.length()) else {
                    continue;
                };
                let candidate = Candidate {
                    gap: OrderedFloat(gap),
                    vehicle_id: other.id().to_string(),
                };
                if nearest.as_ref().map_or(true, |best| candidate < *best) {
                    nearest = Some(candidate);
                }
            }

            let Some(nearest) = nearest else { continue };
            if nearest.gap.into_inner() > self.config.max_platoon_gap {
                continue;
            }

            // the vehicle ahead must be the tail of another platoon that is
            // not already waiting on a split
            let Some(ahead) = self.vehicles.get(&nearest.vehicle_id) else {
                continue;
            };
            if ahead.mode() == PlatoonMode::CatchupFollower {
                continue;
            }
            let Some(front_id) = ahead.platoon() else { continue };
            let is_tail = self
                .platoons
                .get(&front_id)
                .and_then(|front| front.tail_id())
                == Some(nearest.vehicle_id.as_str());
            if !is_tail {
                continue;
            }

            self.execute_merge(platoon_id, front_id, time);
        }
    }

    /// Fold the rear platoon into the front platoon, rear leader demoted
    fn execute_merge(&mut self, rear_id: PlatoonId, front_id: PlatoonId, time: f64) {
        let Some(rear) = self.platoons.remove(&rear_id) else {
            return;
        };
        let rear_members: Vec<String> = rear.member_ids().to_vec();

        let Some(front) = self.platoons.get_mut(&front_id) else {
            self.platoons.insert(rear_id, rear);
            return;
        };
        front.absorb(rear);
        let member_list = format_id_list(front.member_ids());

        for (position, member_id) in rear_members.iter().enumerate() {
            if let Some(vehicle) = self.vehicles.get_mut(member_id) {
                vehicle.set_platoon(Some(front_id));
                if position == 0 {
                    // the absorbed leader now follows the front platoon's tail
                    vehicle.set_mode(PlatoonMode::Follower);
                }
            }
        }

        self.events.report(
            time,
            2,
            format!(
                "Platoon '{}' joined Platoon '{}', which now contains vehicles:\n{}",
                rear_id, front_id, member_list
            ),
        );
    }

    /// Give every unattached vehicle something to do: catch up to a platoon
    /// ahead, or pair up with another free vehicle into a new platoon.
    /// Catching up takes priority over pairing up.
    fn form_platoons(&mut self, time: f64) {
        let mut searcher_ids: Vec<String> = self
            .vehicles
            .values()
            .filter(|vehicle| vehicle.mode() == PlatoonMode::None)
            .map(|vehicle| vehicle.id().to_string())
            .collect();
        searcher_ids.sort();

        for vehicle_id in searcher_ids {
            // an earlier searcher may have recruited this vehicle already
            let Some(vehicle) = self.vehicles.get(&vehicle_id) else {
                continue;
            };
            if vehicle.mode() != PlatoonMode::None {
                continue;
            }
            let Some(state) = vehicle.state().cloned() else {
                continue;
            };

            // everything ahead on the same lane, nearest first
            let mut candidates: SortedVec<Candidate> = SortedVec::new();
            for other in self.vehicles.values() {
                if other.id() == vehicle_id {
                    continue;
                }
                let Some(other_state) = other.state() else {
                    continue;
                };
                if other_state.offset <= state.offset {
                    continue;
                }
                let Some(gap) = measured_gap(&state, other_state, other.length()) else {
                    continue;
                };
                candidates.insert(Candidate {
                    gap: OrderedFloat(gap),
                    vehicle_id: other.id().to_string(),
                });
            }

            let mut catchup_target: Option<PlatoonId> = None;
            let mut formation_partner: Option<String> = None;
            for candidate in candidates.iter() {
                let gap = candidate.gap.into_inner();
                if gap > self.config.catchup_dist {
                    break;
                }
                let Some(other) = self.vehicles.get(&candidate.vehicle_id) else {
                    continue;
                };
                match other.mode() {
                    PlatoonMode::None => {
                        if formation_partner.is_none() && gap <= self.config.max_platoon_gap {
                            formation_partner = Some(candidate.vehicle_id.clone());
                        }
                    }
                    PlatoonMode::CatchupFollower => {}
                    _ => {
                        if let Some(platoon_id) = other.platoon() {
                            let is_tail = self
                                .platoons
                                .get(&platoon_id)
                                .and_then(|platoon| platoon.tail_id())
                                == Some(candidate.vehicle_id.as_str());
                            if is_tail {
                                catchup_target = Some(platoon_id);
                                break;
                            }
                        }
                    }
                }
            }

            if let Some(platoon_id) = catchup_target {
                if let Some(vehicle) = self.vehicles.get_mut(&vehicle_id) {
                    vehicle.set_mode(PlatoonMode::Catchup);
                    vehicle.set_catchup_target(Some(platoon_id));
                }
                self.events.report(
                    time,
                    3,
                    format!(
                        "Vehicle '{}' starts catching up to Platoon '{}'",
                        vehicle_id, platoon_id
                    ),
                );
            } else if let Some(partner_id) = formation_partner {
                self.form_new_platoon(&partner_id, &vehicle_id, time);
            }
        }
    }

    /// Create a platoon from a front (leader) and a rear (follower) vehicle
    fn form_new_platoon(&mut self, front_id: &str, rear_id: &str, time: f64) {
        let platoon_id = self.next_platoon_id();
        let mut platoon = Platoon::new(platoon_id);
        platoon.push_rear(front_id.to_string());
        platoon.push_rear(rear_id.to_string());
        let member_list = format_id_list(platoon.member_ids());
        self.platoons.insert(platoon_id, platoon);

        if let Some(vehicle) = self.vehicles.get_mut(front_id) {
            vehicle.set_mode(PlatoonMode::Leader);
            vehicle.set_platoon(Some(platoon_id));
        }
        if let Some(vehicle) = self.vehicles.get_mut(rear_id) {
            vehicle.set_mode(PlatoonMode::Follower);
            vehicle.set_platoon(Some(platoon_id));
        }

        self.events.report(
            time,
            2,
            format!(
                "Platoon '{}' formed with vehicles:\n{}",
                platoon_id, member_list
            ),
        );
    }

    /// Push the engine commands for a vehicle's role: substitute type,
    /// lane-change mode and the role's speed-factor band
    fn push_role_commands(
        &mut self,
        vehicle_id: &str,
        original_type: &str,
        mode: PlatoonMode,
        iface: &mut dyn VehicleInterface,
    ) -> Result<()> {
        let target_type = self.registry.target_type(original_type, mode);
        iface.set_vehicle_type(vehicle_id, &target_type)?;
        iface.set_lane_change_mode(vehicle_id, *self.config.lc_mode.get(mode))?;
        let bounds = self.config.speed_factor.get(mode);
        iface.set_speed_factor_bounds(vehicle_id, bounds.min, bounds.max)?;
        Ok(())
    }

    /// Push role commands for vehicles whose mode changed this cycle, plus
    /// the per-cycle gap-control speed factor for followers
    fn emit_commands(&mut self, iface: &mut dyn VehicleInterface, time: f64) -> Result<()> {
        let mut vehicle_ids: Vec<String> = self.vehicles.keys().cloned().collect();
        vehicle_ids.sort();

        for vehicle_id in vehicle_ids {
            let Some(vehicle) = self.vehicles.get_mut(&vehicle_id) else {
                continue;
            };
            let pending = vehicle.take_commands_pending();
            let mode = vehicle.mode();
            let original_type = vehicle.original_type().to_string();
            let rear_state = vehicle.state().cloned();
            let platoon_id = vehicle.platoon();

            if pending {
                self.push_role_commands(&vehicle_id, &original_type, mode, iface)?;
            }

            if !mode.is_follower() {
                continue;
            }

            // hold the gap to the predecessor with a proportional speed factor
            let predecessor = platoon_id.and_then(|platoon_id| {
                self.platoons
                    .get(&platoon_id)
                    .and_then(|platoon| platoon.predecessor_of(&vehicle_id))
                    .map(str::to_string)
            });
            let Some(predecessor_id) = predecessor else {
                continue;
            };
            let gap = rear_state.as_ref().and_then(|rear| {
                let front_vehicle = self.vehicles.get(&predecessor_id)?;
                let front = front_vehicle.state()?;
                measured_gap(rear, front, front_vehicle.length())
            });
            let Some(gap) = gap else { continue };

            let bounds = self.config.speed_factor.get(mode);
            let factor = follower_speed_factor(
                bounds,
                self.config.gap_control_gain,
                gap - self.config.max_platoon_gap,
            );
            iface.set_speed_factor_bounds(&vehicle_id, factor, factor)?;
            self.events.report(
                time,
                4,
                format!(
                    "Vehicle '{}': gap {} behind '{}', speed factor {}",
                    vehicle_id,
                    format_float(gap),
                    predecessor_id,
                    format_float(factor)
                ),
            );
        }
        Ok(())
    }

    /// Gap from a rear vehicle to a front vehicle, when comparable
    fn pair_gap(&self, rear_id: &str, front_id: &str) -> Option<f64> {
        let rear = self.vehicles.get(rear_id)?.state()?;
        let front_vehicle = self.vehicles.get(front_id)?;
        let front = front_vehicle.state()?;
        measured_gap(rear, front, front_vehicle.length())
    }
}
