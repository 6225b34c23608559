use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use platoon_control::control::{format_id_list, PlatoonConfig, PlatoonManager, VehicleTypeMapping};
use platoon_control::testbed::TestbedEngine;

#[derive(Parser)]
#[command(name = "platoon_control")]
#[command(about = "Platooning controller demo on the in-process testbed")]
struct Cli {
    /// Number of engine steps to run
    #[arg(long, default_value = "3000")]
    steps: u32,

    /// Engine step length in seconds
    #[arg(long, default_value = "0.1")]
    step_length: f64,

    /// Random seed for the demo scenario
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Controller configuration as a JSON file; the built-in demo
    /// configuration is used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured report verbosity (0-4)
    #[arg(long)]
    verbosity: Option<u8>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&text).context("parsing config file")?
        }
        None => demo_config(),
    };
    if let Some(verbosity) = cli.verbosity {
        config.verbosity = verbosity;
    }

    println!("Running platooning demo...");
    println!("Steps: {}, Step length: {}s, Seed: {}", cli.steps, cli.step_length, cli.seed);
    println!();

    let mut engine = build_demo_engine(cli.step_length, cli.seed);
    let mut manager = PlatoonManager::load(config, &mut engine)?;

    let summary_every = 500;
    for step in 1..=cli.steps {
        engine.advance();
        manager.step(&mut engine)?;

        if step % summary_every == 0 {
            print_summary(&manager);
            println!();
        }
    }

    println!("=== Final State ===");
    print_summary(&manager);
    println!();
    print_event_logs(&manager);

    manager.stop(&mut engine)?;
    Ok(())
}

/// Configuration used when no config file is given: manage the sedans,
/// substitute role-specific sedan types, report at standard verbosity
fn demo_config() -> PlatoonConfig {
    PlatoonConfig {
        vehicle_selectors: vec!["sedan".to_string()],
        verbosity: 2,
        vtype_map: vec![VehicleTypeMapping {
            original: "sedan".to_string(),
            leader: Some("sedan_leader".to_string()),
            follower: Some("sedan_follower".to_string()),
            catchup: Some("sedan_catchup".to_string()),
            catchup_follower: Some("sedan_catchup_follower".to_string()),
        }],
        ..PlatoonConfig::default()
    }
}

/// A convoy of sedans on one edge. The rear vehicles drive faster than the
/// front ones so the gaps close and platoons form on their own; a van drives
/// along unmanaged.
fn build_demo_engine(step_length: f64, seed: u64) -> TestbedEngine {
    let mut engine = TestbedEngine::new(step_length);

    engine.define_vehicle_type("sedan", 5.0, 9.0, 4.5);
    engine.define_vehicle_type("sedan_leader", 5.0, 9.0, 4.5);
    engine.define_vehicle_type("sedan_follower", 5.0, 9.0, 4.5);
    engine.define_vehicle_type("sedan_catchup", 5.0, 9.0, 4.5);
    engine.define_vehicle_type("sedan_catchup_follower", 5.0, 9.0, 4.5);
    engine.define_vehicle_type("van", 7.0, 7.0, 4.0);

    let mut rng = StdRng::seed_from_u64(seed);
    for i in 0..6u32 {
        let vehicle_id = format!("sedan.{}", i);
        let offset = 400.0 - 65.0 * f64::from(i);
        let base_speed = 25.0 + 0.9 * f64::from(i) + rng.random_range(-0.2..0.2);
        if i < 4 {
            engine.insert_vehicle(&vehicle_id, "sedan", offset, base_speed);
        } else {
            // the last two vehicles enter the road a little later
            let depart = 3.0 * f64::from(i - 3);
            engine.schedule_vehicle(&vehicle_id, "sedan", offset, base_speed, depart);
        }
    }
    engine.insert_vehicle("van.0", "van", 500.0, 24.0);

    engine
}

fn print_summary(manager: &PlatoonManager) {
    println!(
        "Time {:.1}s: {} vehicles tracked, {} platoons",
        manager.sim_time(),
        manager.tracked_vehicle_count(),
        manager.platoon_count()
    );
    let mut platoons: Vec<_> = manager.platoons().collect();
    platoons.sort_by_key(|platoon| platoon.id());
    for platoon in platoons {
        println!(
            "  Platoon '{}': {}",
            platoon.id(),
            format_id_list(platoon.member_ids())
        );
    }
}

fn print_event_logs(manager: &PlatoonManager) {
    let events = manager.events();
    if !events.warnings().is_empty() {
        println!("=== Warnings ===");
        for entry in events.warnings() {
            println!("{}: {}", entry.time, entry.message);
        }
        println!();
    }
    println!("=== Reports ===");
    for entry in events.reports() {
        println!("{}: {}", entry.time, entry.message);
    }
}
