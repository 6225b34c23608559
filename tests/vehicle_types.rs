//! Vehicle-type registry validation
//!
//! Checks the load-time handling of the substitution table: unknown type
//! warnings, attribute parity warnings, the emergencyDecel capability
//! fallback, and type switching as vehicles change roles.

use platoon_control::control::{PlatoonConfig, PlatoonManager, PlatoonMode, VehicleTypeMapping};
use platoon_control::testbed::TestbedEngine;

const STEP_LENGTH: f64 = 0.1;

fn engine_with_types() -> TestbedEngine {
    let mut engine = TestbedEngine::new(STEP_LENGTH);
    engine.define_vehicle_type("sedan", 5.0, 9.0, 4.5);
    engine.define_vehicle_type("sedan_leader", 5.0, 9.0, 4.5);
    engine.define_vehicle_type("sedan_follower", 5.0, 9.0, 4.5);
    engine.define_vehicle_type("sedan_catchup", 5.0, 9.0, 4.5);
    engine.define_vehicle_type("sedan_catchup_follower", 5.0, 9.0, 4.5);
    engine.define_vehicle_type("sedan_long", 10.0, 9.0, 4.5);
    engine.define_vehicle_type("sedan_hard", 5.0, 10.5, 4.5);
    engine
}

fn mapping(original: &str) -> VehicleTypeMapping {
    VehicleTypeMapping {
        original: original.to_string(),
        leader: None,
        follower: None,
        catchup: None,
        catchup_follower: None,
    }
}

fn config_with_rows(rows: Vec<VehicleTypeMapping>) -> PlatoonConfig {
    PlatoonConfig {
        vehicle_selectors: vec!["sedan".to_string()],
        verbosity: 2,
        vtype_map: rows,
        ..PlatoonConfig::default()
    }
}

fn run_steps(manager: &mut PlatoonManager, engine: &mut TestbedEngine, steps: u32) {
    for _ in 0..steps {
        engine.advance();
        manager.step(engine).expect("controller step failed");
    }
}

#[test]
fn test_unknown_original_drops_row() {
    let mut engine = engine_with_types();
    let rows = vec![VehicleTypeMapping {
        leader: Some("sedan_leader".to_string()),
        ..mapping("ghost")
    }];
    let manager = PlatoonManager::load(config_with_rows(rows), &mut engine).expect("load failed");

    let warnings = manager.events().warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].time, "0.0");
    assert_eq!(
        warnings[0].message,
        "WARNING: Unknown vType 'ghost' (PlatoonManager)"
    );
}

#[test]
fn test_unknown_substitute_disables_only_that_role() {
    let mut engine = engine_with_types();
    engine.insert_vehicle("sedan.0", "sedan", 100.0, 20.0);
    engine.insert_vehicle("sedan.1", "sedan", 92.0, 20.0);

    let rows = vec![VehicleTypeMapping {
        leader: Some("missing_type".to_string()),
        follower: Some("sedan_follower".to_string()),
        ..mapping("sedan")
    }];
    let mut manager =
        PlatoonManager::load(config_with_rows(rows), &mut engine).expect("load failed");

    let warnings = manager.events().warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "WARNING: Unknown vType 'missing_type' (PlatoonManager)"
    );

    // the leader role falls back to the original type, the follower role
    // still substitutes
    run_steps(&mut manager, &mut engine, 2);
    assert_eq!(manager.vehicle_mode("sedan.0"), Some(PlatoonMode::Leader));
    assert_eq!(engine.type_of("sedan.0"), Some("sedan"));
    assert_eq!(engine.type_of("sedan.1"), Some("sedan_follower"));
}

#[test]
fn test_length_mismatch_warns_about_collisions() {
    let mut engine = engine_with_types();
    engine.insert_vehicle("sedan.0", "sedan", 100.0, 20.0);
    engine.insert_vehicle("sedan.1", "sedan", 92.0, 20.0);

    let rows = vec![VehicleTypeMapping {
        leader: Some("sedan_long".to_string()),
        ..mapping("sedan")
    }];
    let mut manager =
        PlatoonManager::load(config_with_rows(rows), &mut engine).expect("load failed");

    let warnings = manager.events().warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "WARNING: length of mapped vType 'sedan_long' (10.0m.) does not equal length \
         of original vType 'sedan' (5.0m.)\nThis will probably lead to collisions. (PlatoonManager)"
    );

    // the mapping stays in effect despite the warning
    run_steps(&mut manager, &mut engine, 2);
    assert_eq!(engine.type_of("sedan.0"), Some("sedan_long"));
}

#[test]
fn test_emergency_decel_mismatch_warns() {
    let mut engine = engine_with_types();
    let rows = vec![VehicleTypeMapping {
        leader: Some("sedan_hard".to_string()),
        ..mapping("sedan")
    }];
    let manager = PlatoonManager::load(config_with_rows(rows), &mut engine).expect("load failed");

    let warnings = manager.events().warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "WARNING: emergencyDecel of mapped vType 'sedan_hard' (10.5m.) does not equal \
         emergencyDecel of original vType 'sedan' (9.0m.) (PlatoonManager)"
    );
}

#[test]
fn test_parity_checked_per_declared_role() {
    let mut engine = engine_with_types();
    let rows = vec![VehicleTypeMapping {
        leader: Some("sedan_long".to_string()),
        follower: Some("sedan_long".to_string()),
        ..mapping("sedan")
    }];
    let manager = PlatoonManager::load(config_with_rows(rows), &mut engine).expect("load failed");

    // one warning per (original, role) pair, even for the same substitute
    let warnings = manager.events().warnings();
    assert_eq!(warnings.len(), 2);
    assert!(warnings
        .iter()
        .all(|entry| entry.message.contains("length of mapped vType 'sedan_long'")));
}

#[test]
fn test_missing_emergency_decel_falls_back_to_decel() {
    let mut engine = engine_with_types();
    engine.set_reports_emergency_decel(false);

    // sedan_hard differs in emergencyDecel but matches in plain decel
    let rows = vec![VehicleTypeMapping {
        leader: Some("sedan_hard".to_string()),
        ..mapping("sedan")
    }];
    let manager = PlatoonManager::load(config_with_rows(rows), &mut engine).expect("load failed");

    let warnings = manager.events().warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].message,
        "WARNING: Vehicle interface does not report emergencyDecel, \
         assuming emergencyDecel == decel (PlatoonManager)"
    );
}

#[test]
fn test_verbosity_zero_silences_warnings() {
    let mut engine = engine_with_types();
    let rows = vec![VehicleTypeMapping {
        leader: Some("sedan_leader".to_string()),
        ..mapping("ghost")
    }];
    let config = PlatoonConfig {
        verbosity: 0,
        ..config_with_rows(rows)
    };
    let manager = PlatoonManager::load(config, &mut engine).expect("load failed");
    assert!(manager.events().warnings().is_empty());
}

#[test]
fn test_undeclared_original_resolves_silently() {
    let mut engine = engine_with_types();
    engine.insert_vehicle("sedan.0", "sedan", 100.0, 20.0);
    engine.insert_vehicle("sedan.1", "sedan", 92.0, 20.0);

    let mut manager =
        PlatoonManager::load(config_with_rows(Vec::new()), &mut engine).expect("load failed");
    run_steps(&mut manager, &mut engine, 2);

    // no mapping declared: roles change, types do not
    assert_eq!(manager.platoon_count(), 1);
    assert!(manager.events().warnings().is_empty());
    assert_eq!(engine.type_of("sedan.0"), Some("sedan"));
    assert_eq!(engine.type_of("sedan.1"), Some("sedan"));
}

#[test]
fn test_substitution_follows_role_changes() {
    let mut engine = engine_with_types();
    engine.insert_vehicle("sedan.0", "sedan", 100.0, 20.0);
    engine.insert_vehicle("sedan.1", "sedan", 92.0, 20.0);
    engine.insert_vehicle("sedan.2", "sedan", 45.0, 26.0);

    let rows = vec![VehicleTypeMapping {
        leader: Some("sedan_leader".to_string()),
        follower: Some("sedan_follower".to_string()),
        catchup: Some("sedan_catchup".to_string()),
        catchup_follower: Some("sedan_catchup_follower".to_string()),
        ..mapping("sedan")
    }];
    let mut manager =
        PlatoonManager::load(config_with_rows(rows), &mut engine).expect("load failed");

    // the pair forms right away and the third vehicle starts catching up
    run_steps(&mut manager, &mut engine, 1);
    assert_eq!(engine.type_of("sedan.0"), Some("sedan_leader"));
    assert_eq!(engine.type_of("sedan.1"), Some("sedan_follower"));
    assert_eq!(engine.type_of("sedan.2"), Some("sedan_catchup"));

    // the follower leaves the lane and slows: it starts the split countdown
    // and the catch-up behind loses its target
    engine.move_to_lane("sedan.1", 1);
    engine.set_base_speed("sedan.1", 13.0);
    run_steps(&mut manager, &mut engine, 1);
    assert_eq!(
        manager.vehicle_mode("sedan.1"),
        Some(PlatoonMode::CatchupFollower)
    );
    assert_eq!(engine.type_of("sedan.1"), Some("sedan_catchup_follower"));
    assert_eq!(manager.vehicle_mode("sedan.2"), Some(PlatoonMode::None));
    assert_eq!(engine.type_of("sedan.2"), Some("sedan"));

    // after the countdown the stray follower leads a platoon of its own
    run_steps(&mut manager, &mut engine, 33);
    assert_eq!(manager.vehicle_mode("sedan.1"), Some(PlatoonMode::Leader));
    assert_eq!(engine.type_of("sedan.1"), Some("sedan_leader"));

    // the abandoned vehicle finds the remaining platoon again and joins it
    run_steps(&mut manager, &mut engine, 15);
    assert_eq!(manager.platoon_of("sedan.2"), manager.platoon_of("sedan.0"));
    assert_eq!(engine.type_of("sedan.2"), Some("sedan_follower"));
}
