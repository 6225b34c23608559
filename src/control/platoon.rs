//! Platoon membership bookkeeping
//!
//! A platoon is an ordered list of member vehicle ids, front first. Mode
//! changes and engine commands stay with the manager; these methods only
//! maintain the roster.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use super::types::PlatoonId;

#[derive(Debug, Clone)]
pub struct Platoon {
    id: PlatoonId,
    /// Member vehicle ids, ordered front to back
    members: Vec<String>,
}

impl Platoon {
    pub fn new(id: PlatoonId) -> Self {
        Self {
            id,
            members: Vec::new(),
        }
    }

    pub fn id(&self) -> PlatoonId {
        self.id
    }

    /// Member ids, front to back
    pub fn member_ids(&self) -> &[String] {
        &self.members
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The current front vehicle
    pub fn leader_id(&self) -> Option<&str> {
        self.members.first().map(String::as_str)
    }

    /// The current rear vehicle
    pub fn tail_id(&self) -> Option<&str> {
        self.members.last().map(String::as_str)
    }

    /// Position of a member in the platoon, 0 = front
    pub fn position_of(&self, vehicle_id: &str) -> Option<usize> {
        self.members.iter().position(|id| id == vehicle_id)
    }

    /// The member driving directly ahead of the given one
    pub fn predecessor_of(&self, vehicle_id: &str) -> Option<&str> {
        match self.position_of(vehicle_id)? {
            0 => None,
            index => Some(&self.members[index - 1]),
        }
    }

    /// Append a vehicle at the rear.
    /// The caller keeps the vehicle's platoon reference and mode in sync.
    pub fn push_rear(&mut self, vehicle_id: String) {
        debug_assert!(!self.members.contains(&vehicle_id));
        self.members.push(vehicle_id);
    }

    /// Remove a member wherever it sits. Returns true when it was present.
    pub fn remove_member(&mut self, vehicle_id: &str) -> bool {
        match self.position_of(vehicle_id) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    /// Move the members from `index` onward into a fresh platoon
    pub fn split_off(&mut self, index: usize, new_id: PlatoonId) -> Platoon {
        Platoon {
            id: new_id,
            members: self.members.split_off(index),
        }
    }

    /// Append all members of another platoon at the rear, keeping their order
    pub fn absorb(&mut self, other: Platoon) {
        self.members.extend(other.members);
    }

    /// Re-sort members front to back by the supplied longitudinal offsets
    /// (larger offset = further ahead). Returns true when the order changed.
    pub fn sort_by_offset(&mut self, offset_of: impl Fn(&str) -> f64) -> bool {
        let before = self.members.clone();
        self.members
            .sort_by_key(|id| Reverse(OrderedFloat(offset_of(id))));
        before != self.members
    }
}
