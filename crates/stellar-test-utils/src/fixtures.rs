//! Small worlds for engine tests.
//!
//! [`TestWorld`] wires a [`Runner`] and a [`Registry`] together with a
//! [`RecordingAttributes`] sink. Entities are placed on the x axis of
//! system [`SYSTEM`].

use std::sync::Arc;

use stellar_core::{EntityId, PositionId, Vec3};
use stellar_engine::{Deposit, Registry, Runner, Ship, Station};
use stellar_motion::Position;

use crate::RecordingAttributes;

/// Solar system every fixture lives in.
pub const SYSTEM: &str = "sol";

pub struct TestWorld {
    pub runner: Runner,
    pub registry: Registry,
    pub attributes: Arc<RecordingAttributes>,
    next_position: u64,
}

impl TestWorld {
    pub fn new() -> Self {
        let runner = Runner::new();
        let attributes = Arc::new(RecordingAttributes::new());
        let registry = Registry::new(Arc::new(runner.clone()), attributes.clone());
        Self {
            runner,
            registry,
            attributes,
            next_position: 1,
        }
    }

    /// Track a stationary position at `(x, 0, 0)`.
    pub fn place(&mut self, x: f64) -> PositionId {
        let id = PositionId(self.next_position);
        self.next_position += 1;
        self.runner
            .track(Position::new(id).at(Vec3::new(x, 0.0, 0.0)))
            .unwrap();
        id
    }

    /// Create a ship at `x` with the given damage, hp and shield.
    pub fn ship(
        &mut self,
        id: &str,
        user: &str,
        x: f64,
        damage: u32,
        hp: u32,
        shield: u32,
    ) -> EntityId {
        let position_id = self.place(x);
        let ship = Ship {
            damage_dealt: damage,
            hp,
            shield_level: shield,
            ..Ship::new(id, user, SYSTEM, position_id)
        };
        self.registry.create(ship).unwrap();
        EntityId::from(id)
    }

    /// Create a station at `x`.
    pub fn station(&mut self, id: &str, user: &str, x: f64) -> EntityId {
        let position_id = self.place(x);
        self.registry
            .create(Station::new(id, user, SYSTEM, position_id))
            .unwrap();
        EntityId::from(id)
    }

    /// Create a deposit of `quantity` units of `material` at `x`.
    pub fn deposit(&mut self, id: &str, material: &str, quantity: u32, x: f64) -> EntityId {
        let position_id = self.place(x);
        self.registry
            .create(Deposit {
                id: id.into(),
                system_id: SYSTEM.into(),
                position_id,
                material_id: material.into(),
                quantity,
            })
            .unwrap();
        EntityId::from(id)
    }

    /// Snapshot of a ship.
    pub fn get_ship(&self, id: &EntityId) -> Ship {
        self.registry
            .safe_exec(|e| e.ship(id).cloned())
            .unwrap()
            .unwrap()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
