//! Integration test: both schedulers running while caller threads mutate
//! the same positions and entities.
//!
//! Callers reassign motion rules, teleport, read coordinates, and shuttle
//! cargo between a ship and a station while the runner and command
//! scheduler tick every millisecond. Afterwards neither scheduler may
//! have halted and the total cargo must be conserved.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use stellar_core::{EntityId, PositionId, Vec3};
use stellar_engine::{Mine, SchedulerConfig, Simulation, SimulationConfig, Ship, Station};
use stellar_motion::{Linear, Position, Rotation};
use stellar_test_utils::RecordingAttributes;

fn fast_sim() -> Simulation {
    let config = SimulationConfig {
        runner: SchedulerConfig::every_ms(1),
        commands: SchedulerConfig::every_ms(1),
    };
    Simulation::new(config, Arc::new(RecordingAttributes::new())).unwrap()
}

fn ore(sim: &Simulation, id: &str) -> u32 {
    sim.registry()
        .get(&EntityId::from(id))
        .unwrap()
        .cargo()
        .unwrap()
        .quantity_of("ore")
}

#[test]
fn schedulers_and_callers_interleave() {
    let mut sim = fast_sim();
    for id in 1..=8 {
        let rule = Linear::new(Vec3::new(1.0, id as f64, 0.0), 5.0)
            .unwrap()
            .with_rotation(Rotation::new(Vec3::Z, 0.5).unwrap());
        sim.runner()
            .track(Position::new(PositionId(id)).with_rule(rule).unwrap())
            .unwrap();
    }
    // Ship and station share a stationary position so transfers stay in range.
    let dock = PositionId(100);
    sim.runner().track(Position::new(dock)).unwrap();
    let mut ship = Ship::new("hauler", "u", "sol", dock);
    ship.cargo.add("ore", 50).unwrap();
    sim.registry().create(ship).unwrap();
    sim.registry().create(Station::new("depot", "u", "sol", dock)).unwrap();
    // A mining command with nothing to mine is torn down by the scheduler.
    sim.registry()
        .add_command(Box::new(Mine::new("hauler", "missing-rock")))
        .unwrap();

    sim.start().unwrap();

    let deadline = Instant::now() + Duration::from_millis(150);
    let movers: Vec<_> = (0..3)
        .map(|worker| {
            let runner = sim.runner().clone();
            thread::spawn(move || {
                let mut n = 0u64;
                while Instant::now() < deadline {
                    let id = PositionId(1 + (n + worker) % 8);
                    match n % 3 {
                        0 => runner
                            .set_rule(id, Linear::new(Vec3::Y, 1.0 + n as f64).unwrap())
                            .unwrap(),
                        1 => runner.teleport(id, Vec3::new(n as f64, 0.0, 0.0)).unwrap(),
                        _ => assert!(runner.get(id).unwrap().coords().is_finite()),
                    }
                    n += 1;
                }
                n
            })
        })
        .collect();

    let haulers: Vec<_> = [("hauler", "depot"), ("depot", "hauler")]
        .into_iter()
        .map(|(from, to)| {
            let registry = sim.registry().clone();
            thread::spawn(move || {
                let (from, to) = (EntityId::from(from), EntityId::from(to));
                while Instant::now() < deadline {
                    // Rejections (nothing left to send) are expected.
                    let _ = registry.transfer_resource(&from, &to, "ore", 3);
                }
            })
        })
        .collect();

    for handle in movers {
        assert!(handle.join().unwrap() > 0);
    }
    for handle in haulers {
        handle.join().unwrap();
    }

    let report = sim.shutdown();
    assert!(report.runner.joined && report.commands.joined);
    assert!(!report.runner.halted, "runner halted");
    assert!(!report.commands.halted, "command scheduler halted");
    assert!(report.runner.ticks > 0 && report.commands.ticks > 0);

    assert_eq!(ore(&sim, "hauler") + ore(&sim, "depot"), 50);
    assert!(sim.registry().command_ids().unwrap().is_empty());
}

#[test]
fn save_while_running_is_consistent_json() {
    let mut sim = fast_sim();
    let rule = Linear::new(Vec3::X, 100.0).unwrap();
    sim.runner()
        .track(Position::new(PositionId(1)).with_rule(rule).unwrap())
        .unwrap();
    sim.start().unwrap();
    thread::sleep(Duration::from_millis(10));
    let saved = sim.save().unwrap();
    sim.shutdown();

    let restored = fast_sim();
    restored.restore(&saved).unwrap();
    assert!(restored.runner().contains(PositionId(1)));
}
