//! Stellar Simulation: an orbit, an attack and a save, on background
//! schedulers.
//!
//! Demonstrates:
//!   1. Loading a `SimulationConfig` from JSON
//!   2. Tracking an orbiting moon and two ships
//!   3. Watching movement and proximity through a position listener
//!   4. Running an attack command until the defender is destroyed
//!   5. Shutting down and saving the world as JSON
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example orbit_demo

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use stellar_core::{CallbackError, EntityEvent, EntityListener, EventKind, PositionId, Vec3};
use stellar_engine::{Attack, NoAttributes, Ship, Simulation, SimulationConfig};
use stellar_motion::{
    Elliptical, MovementCallback, Position, PositionEvent, PositionListener, ProximityCallback,
    ProximityTrigger,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MOON: PositionId = PositionId(1);
const RAIDER: PositionId = PositionId(2);
const FREIGHTER: PositionId = PositionId(3);

// ─── Listeners ──────────────────────────────────────────────────

struct Telescope;

impl PositionListener for Telescope {
    fn notify(&self, event: &PositionEvent<'_>) -> Result<(), CallbackError> {
        match event {
            PositionEvent::Moved { position, previous } => {
                let c = position.coords();
                println!(
                    "  moon moved {:>6.1} units to ({:>7.1}, {:>7.1})",
                    c.distance(*previous),
                    c.x,
                    c.y
                );
            }
            PositionEvent::Proximity {
                distance, entered, ..
            } => {
                let verb = if *entered { "entered" } else { "left" };
                println!("  moon {verb} raider range at {distance:.1}");
            }
            PositionEvent::Stopped { .. } => println!("  moon stopped"),
        }
        Ok(())
    }
}

struct Log;

impl EntityListener for Log {
    fn on_event(&self, event: &EntityEvent) -> Result<(), CallbackError> {
        let other = event.other.as_ref().map_or("-", |o| o.as_str());
        println!("  [{}] {} / {}", event.kind, event.entity, other);
        Ok(())
    }
}

// ─── Main ───────────────────────────────────────────────────────

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SimulationConfig::from_json(
        r#"{ "runner": { "tick_interval_ms": 50 }, "commands": { "tick_interval_ms": 200 } }"#,
    )?;
    let mut sim = Simulation::new(config, Arc::new(NoAttributes))?;

    let orbit = Elliptical::new(400.0, 0.3, 0.8, Vec3::X, Vec3::Y)?;
    sim.runner().track(Position::new(MOON).with_rule(orbit)?)?;
    sim.runner().track(Position::new(RAIDER).at(Vec3::new(300.0, 0.0, 0.0)))?;
    sim.runner().track(Position::new(FREIGHTER).at(Vec3::new(340.0, 0.0, 0.0)))?;

    let telescope = Arc::new(Telescope);
    sim.runner().add_movement_callback(
        MOON,
        MovementCallback::new("observatory", telescope.clone()).with_min_distance(100.0),
    )?;
    sim.runner().add_proximity_callback(
        MOON,
        ProximityCallback::new("observatory", RAIDER, 150.0, ProximityTrigger::Crossed, telescope),
    )?;

    let registry = sim.registry();
    registry.create(Ship {
        damage_dealt: 12,
        ..Ship::new("raider", "kira", "sol", RAIDER)
    })?;
    let mut freighter = Ship::new("freighter", "odo", "sol", FREIGHTER);
    freighter.shield_level = 20;
    freighter.cargo.add("dilithium", 40)?;
    registry.create(freighter)?;

    let log = Arc::new(Log);
    for kind in [EventKind::Defended, EventKind::DefendedStop, EventKind::DestroyedBy] {
        registry.subscribe(&"freighter".into(), kind, "bridge", log.clone())?;
    }
    registry.add_command(Box::new(Attack::new("raider", "freighter")))?;

    println!("Running for 3 seconds...");
    sim.start()?;
    thread::sleep(Duration::from_secs(3));
    let report = sim.shutdown();
    println!(
        "Stopped: runner {} ticks, commands {} ticks",
        report.runner.ticks, report.commands.ticks
    );

    let loot = sim
        .registry()
        .find(|e| e.kind() == "loot")?
        .into_iter()
        .map(|e| e.id().to_string())
        .collect::<Vec<_>>();
    println!("Loot in space: {loot:?}");

    let saved = sim.save()?;
    println!("Saved world: {} bytes of JSON", saved.len());
    Ok(())
}
