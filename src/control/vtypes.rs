//! Vehicle-type substitution registry
//!
//! Platooning roles are expressed to the engine by swapping a vehicle's type
//! for a role-specific variant. The registry holds the substitution table and
//! checks it against the engine's type catalog when a session starts.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::interface::{EngineCapabilities, VehicleInterface, VehicleTypeAttributes};

use super::config::{PlatoonConfig, VehicleTypeMapping};
use super::events::{format_float, EventLog};
use super::types::PlatoonMode;

/// Per-role substitute type ids for one original type
#[derive(Debug, Clone, Default)]
pub struct RoleTypeMap {
    pub leader: Option<String>,
    pub follower: Option<String>,
    pub catchup: Option<String>,
    pub catchup_follower: Option<String>,
}

impl RoleTypeMap {
    /// The declared substitute for a mode, if any
    pub fn get(&self, mode: PlatoonMode) -> Option<&str> {
        match mode {
            PlatoonMode::None => None,
            PlatoonMode::Leader => self.leader.as_deref(),
            PlatoonMode::Follower => self.follower.as_deref(),
            PlatoonMode::Catchup => self.catchup.as_deref(),
            PlatoonMode::CatchupFollower => self.catchup_follower.as_deref(),
        }
    }

    fn set(&mut self, mode: PlatoonMode, type_id: String) {
        match mode {
            PlatoonMode::None => {}
            PlatoonMode::Leader => self.leader = Some(type_id),
            PlatoonMode::Follower => self.follower = Some(type_id),
            PlatoonMode::Catchup => self.catchup = Some(type_id),
            PlatoonMode::CatchupFollower => self.catchup_follower = Some(type_id),
        }
    }
}

/// Registry of vehicle-type substitutions.
///
/// The configured table is validated once, at load time, against the engine's
/// type catalog: a row whose original type is unknown is dropped with a single
/// warning, an unknown substitute disables just that role, and substitutes
/// with diverging length or braking attributes are warned about but kept.
/// Originals first seen at runtime resolve to the identity mapping silently.
#[derive(Debug)]
pub struct VehicleTypeRegistry {
    mappings: HashMap<String, RoleTypeMap>,
    /// Type attributes cached from the engine, keyed by type id
    attributes: HashMap<String, VehicleTypeAttributes>,
    known_types: HashSet<String>,
    /// Fall back to the regular deceleration for parity checks
    use_plain_decel: bool,
}

impl VehicleTypeRegistry {
    pub fn from_config(
        config: &PlatoonConfig,
        caps: &EngineCapabilities,
        iface: &dyn VehicleInterface,
        events: &mut EventLog,
        time: f64,
    ) -> Result<Self> {
        let known_types: HashSet<String> = iface.known_vehicle_types()?.into_iter().collect();
        let mut registry = Self {
            mappings: HashMap::new(),
            attributes: HashMap::new(),
            known_types,
            use_plain_decel: !caps.reports_emergency_decel,
        };

        if registry.use_plain_decel {
            events.warn(
                time,
                "Vehicle interface does not report emergencyDecel, assuming emergencyDecel == decel"
                    .to_string(),
            );
        }

        for row in &config.vtype_map {
            registry.add_row(row, iface, events, time)?;
        }
        Ok(registry)
    }

    fn add_row(
        &mut self,
        row: &VehicleTypeMapping,
        iface: &dyn VehicleInterface,
        events: &mut EventLog,
        time: f64,
    ) -> Result<()> {
        if !self.known_types.contains(&row.original) {
            events.warn(time, format!("Unknown vType '{}'", row.original));
            return Ok(());
        }

        let declared = [
            (PlatoonMode::Leader, &row.leader),
            (PlatoonMode::Follower, &row.follower),
            (PlatoonMode::Catchup, &row.catchup),
            (PlatoonMode::CatchupFollower, &row.catchup_follower),
        ];

        let mut roles = RoleTypeMap::default();
        for (mode, target) in declared {
            let Some(target) = target else { continue };
            if !self.known_types.contains(target) {
                events.warn(time, format!("Unknown vType '{}'", target));
                continue;
            }
            self.check_attribute_parity(&row.original, target, iface, events, time)?;
            roles.set(mode, target.clone());
        }
        self.mappings.insert(row.original.clone(), roles);
        Ok(())
    }

    /// Warn when a substitute type diverges from its original in length or
    /// braking capability. Runs once per declared (original, role) pair.
    fn check_attribute_parity(
        &mut self,
        original: &str,
        mapped: &str,
        iface: &dyn VehicleInterface,
        events: &mut EventLog,
        time: f64,
    ) -> Result<()> {
        let original_attrs = self.lookup_attributes(original, iface)?;
        let mapped_attrs = self.lookup_attributes(mapped, iface)?;
        let (Some(original_attrs), Some(mapped_attrs)) = (original_attrs, mapped_attrs) else {
            return Ok(());
        };

        if mapped_attrs.length != original_attrs.length {
            events.warn(
                time,
                format!(
                    "length of mapped vType '{}' ({}m.) does not equal length of original vType '{}' ({}m.)\n\
                     This will probably lead to collisions.",
                    mapped,
                    format_float(mapped_attrs.length),
                    original,
                    format_float(original_attrs.length)
                ),
            );
        }

        let mapped_decel = self.braking_decel(&mapped_attrs);
        let original_decel = self.braking_decel(&original_attrs);
        if mapped_decel != original_decel {
            events.warn(
                time,
                format!(
                    "emergencyDecel of mapped vType '{}' ({}m.) does not equal emergencyDecel of original vType '{}' ({}m.)",
                    mapped,
                    format_float(mapped_decel),
                    original,
                    format_float(original_decel)
                ),
            );
        }
        Ok(())
    }

    fn braking_decel(&self, attrs: &VehicleTypeAttributes) -> f64 {
        if self.use_plain_decel {
            attrs.decel
        } else {
            attrs.emergency_decel
        }
    }

    /// Fetch and cache a type's attributes from the engine
    pub fn lookup_attributes(
        &mut self,
        type_id: &str,
        iface: &dyn VehicleInterface,
    ) -> Result<Option<VehicleTypeAttributes>> {
        if let Some(attrs) = self.attributes.get(type_id) {
            return Ok(Some(*attrs));
        }
        let attrs = iface.vehicle_type_attributes(type_id)?;
        if let Some(attrs) = attrs {
            self.attributes.insert(type_id.to_string(), attrs);
        }
        Ok(attrs)
    }

    /// The substitution row for an original type.
    /// Undeclared originals resolve to the identity mapping and are cached.
    pub fn resolve(&mut self, original: &str) -> &RoleTypeMap {
        self.mappings.entry(original.to_string()).or_default()
    }

    /// The type a vehicle with the given original type carries in a mode.
    /// Roles without a declared substitute keep the original type.
    pub fn target_type(&mut self, original: &str, mode: PlatoonMode) -> String {
        self.resolve(original)
            .get(mode)
            .unwrap_or(original)
            .to_string()
    }

    /// Cached length of a type, when its attributes have been fetched
    pub fn length_of(&self, type_id: &str) -> Option<f64> {
        self.attributes.get(type_id).map(|attrs| attrs.length)
    }
}
