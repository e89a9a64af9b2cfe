//! One ship attacking another.
//!
//! Listener events, all delivered with the counterpart as `other`:
//!
//! | Event | To | When |
//! |-------|----|------|
//! | `attacked` | attacker | every executed cycle |
//! | `defended` | defender | every executed cycle |
//! | `attacked_stop` | attacker | once, when the attack ends |
//! | `defended_stop` | defender | once, when the attack ends |
//! | `destroyed_by` | defender | once, if this attack destroyed it |

use stellar_core::{CommandError, CommandId, EntityEvent, EntityId, EventKind};

use crate::command::{Command, CommandContext, CommandRecord, CommandState};
use crate::entity::{Cargo, Entity, Loot};
use crate::seams::{SHIPS_USER_DESTROYED, USER_SHIPS_DESTROYED};

/// Ship-attacks-ship. Id `attack-cmd-<attacker>`, so a ship attacks at
/// most one target at a time.
#[derive(Clone, Debug)]
pub struct Attack {
    id: CommandId,
    attacker: EntityId,
    defender: EntityId,
    state: CommandState,
}

impl Attack {
    /// `attacker` attacks `defender` every scheduler tick.
    pub fn new(attacker: impl Into<EntityId>, defender: impl Into<EntityId>) -> Self {
        let attacker = attacker.into();
        Self {
            id: CommandId::for_entity("attack", &attacker),
            attacker,
            defender: defender.into(),
            state: CommandState::default(),
        }
    }

    /// Attack at most once every `seconds`.
    pub fn with_exec_rate(mut self, seconds: f64) -> Self {
        self.state.exec_rate = Some(seconds);
        self
    }

    /// Resume from saved scheduling state.
    pub fn with_state(mut self, state: CommandState) -> Self {
        self.state = state;
        self
    }

    /// The attacking ship.
    pub fn attacker(&self) -> &EntityId {
        &self.attacker
    }

    /// The attacked ship.
    pub fn defender(&self) -> &EntityId {
        &self.defender
    }

    fn can_attack(&self, ctx: &CommandContext<'_>) -> bool {
        let entities = ctx.entities();
        let (Ok(a), Ok(d)) = (entities.ship(&self.attacker), entities.ship(&self.defender)) else {
            return false;
        };
        ctx.distance_between(a.position_id, d.position_id)
            .is_some_and(|distance| a.can_attack(d, distance))
    }

    fn destroyed_by_us(&self, ctx: &CommandContext<'_>) -> bool {
        ctx.entities()
            .ship(&self.defender)
            .is_ok_and(|d| !d.alive() && d.destroyed_by.as_ref() == Some(&self.attacker))
    }

    fn stop_attack(&self, ctx: &mut CommandContext<'_>) {
        if let Ok(a) = ctx.entities_mut().ship_mut(&self.attacker) {
            a.attacking = None;
        }
        tracing::info!(attacker = %self.attacker, defender = %self.defender, "attack stopped");
    }

    fn completion_events(&self, ctx: &mut CommandContext<'_>) {
        ctx.notify(EntityEvent::between(EventKind::AttackedStop, &self.attacker, &self.defender));
        ctx.notify(EntityEvent::between(EventKind::DefendedStop, &self.defender, &self.attacker));
        if self.destroyed_by_us(ctx) {
            ctx.notify(EntityEvent::between(
                EventKind::DestroyedBy,
                &self.defender,
                &self.attacker,
            ));
        }
    }

    /// Halt the wreck, stop everything else acting on it, bump both
    /// users' counters, and leave its cargo behind as loot.
    ///
    /// Salvage joins an existing `<defender>-loot` if there is one. If
    /// that id belongs to something other than loot, the cargo stays
    /// in the wreck's hold.
    fn cleanup_defender(&self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        tracing::info!(attacker = %self.attacker, defender = %self.defender, "ship destroyed");

        let loot_id = EntityId(format!("{}-loot", self.defender));
        let salvageable = match ctx.entities().get(&loot_id) {
            None | Some(Entity::Loot(_)) => true,
            Some(other) => {
                tracing::warn!(
                    loot = %loot_id,
                    kind = other.kind(),
                    "loot id taken; cargo stays with the wreck"
                );
                false
            }
        };

        let defender = ctx.entities_mut().ship_mut(&self.defender)?;
        let position_id = defender.position_id;
        let system_id = defender.system_id.clone();
        let defender_user = defender.user_id.clone();
        let capacity = defender.cargo.capacity;
        let salvage = if salvageable {
            defender.cargo.take_all()
        } else {
            Vec::new()
        };

        ctx.halt(position_id);
        ctx.stop_commands_for(&self.defender);

        if let Ok(a) = ctx.entities().ship(&self.attacker) {
            let attacker_user = a.user_id.clone();
            ctx.increment_attribute(&attacker_user, SHIPS_USER_DESTROYED);
        }
        ctx.increment_attribute(&defender_user, USER_SHIPS_DESTROYED);

        if salvage.is_empty() {
            return Ok(());
        }
        let units = salvage
            .iter()
            .fold(0u32, |acc, s| acc.saturating_add(s.quantity));
        let entities = ctx.entities_mut();
        if let Some(Entity::Loot(existing)) = entities.get_mut(&loot_id) {
            existing.cargo.capacity = existing.cargo.capacity.saturating_add(units);
            for stack in &salvage {
                existing.cargo.add(&stack.material_id, stack.quantity)?;
            }
            tracing::debug!(loot = %loot_id, units, "salvage added to loot");
            return Ok(());
        }

        let mut cargo = Cargo::new(capacity.max(units));
        for stack in &salvage {
            cargo.add(&stack.material_id, stack.quantity)?;
        }
        tracing::debug!(loot = %loot_id, "loot created");
        entities.insert(
            Loot {
                id: loot_id,
                system_id,
                position_id,
                cargo,
            }
            .into(),
        )?;
        Ok(())
    }
}

impl Command for Attack {
    fn id(&self) -> &CommandId {
        &self.id
    }

    fn state(&self) -> &CommandState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut CommandState {
        &mut self.state
    }

    fn processes(&self, entity: &EntityId) -> bool {
        *entity == self.attacker || *entity == self.defender
    }

    fn setup(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        ctx.entities().ship(&self.defender)?;
        ctx.entities_mut().ship_mut(&self.attacker)?.attacking = Some(self.defender.clone());
        Ok(())
    }

    fn before(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        ctx.entities().ship(&self.attacker)?;
        ctx.entities().ship(&self.defender)?;
        Ok(())
    }

    fn should_run(&self, ctx: &CommandContext<'_>) -> bool {
        self.state.should_run(ctx.now()) && self.can_attack(ctx)
    }

    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        let damage = ctx.entities().ship(&self.attacker)?.damage_dealt;
        let defender = ctx.entities_mut().ship_mut(&self.defender)?;
        if defender.absorb(damage) {
            defender.destroyed_by = Some(self.attacker.clone());
        }
        tracing::debug!(
            attacker = %self.attacker,
            defender = %self.defender,
            damage,
            hp = defender.hp,
            shield = defender.shield_level,
            "attack cycle"
        );
        ctx.notify(EntityEvent::between(EventKind::Attacked, &self.attacker, &self.defender));
        ctx.notify(EntityEvent::between(EventKind::Defended, &self.defender, &self.attacker));
        Ok(())
    }

    fn remove(&self, ctx: &CommandContext<'_>) -> bool {
        let defender_down = ctx.entities().ship(&self.defender).map_or(true, |d| !d.alive());
        defender_down || !self.can_attack(ctx)
    }

    fn teardown(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        self.stop_attack(ctx);
        let cleanup = if self.destroyed_by_us(ctx) {
            self.cleanup_defender(ctx)
        } else {
            Ok(())
        };
        self.completion_events(ctx);
        cleanup
    }

    fn stop(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        let attacking = ctx
            .entities()
            .ship(&self.attacker)
            .is_ok_and(|a| a.attacking.as_ref() == Some(&self.defender));
        // Already stopped through teardown; do not repeat its events.
        if !attacking {
            return Ok(());
        }
        self.stop_attack(ctx);
        self.completion_events(ctx);
        Ok(())
    }

    fn record(&self) -> Option<CommandRecord> {
        Some(CommandRecord::Attack {
            attacker: self.attacker.clone(),
            defender: self.defender.clone(),
            state: self.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::run_tick;
    use crate::entity::Ship;
    use crate::registry::Entities;
    use crate::runner::Runner;
    use crate::seams::NoAttributes;
    use std::sync::Arc;
    use stellar_core::{CallbackError, EntityListener, PositionId, Vec3};
    use stellar_motion::Position;

    struct Quiet;

    impl EntityListener for Quiet {
        fn on_event(&self, _event: &EntityEvent) -> Result<(), CallbackError> {
            Ok(())
        }
    }

    fn listen_all(entities: &mut Entities, id: &str) {
        let events = entities
            .get_mut(&id.into())
            .and_then(Entity::events_mut)
            .unwrap();
        for kind in [
            EventKind::Attacked,
            EventKind::Defended,
            EventKind::AttackedStop,
            EventKind::DefendedStop,
            EventKind::DestroyedBy,
        ] {
            events.subscribe(kind, "client", Arc::new(Quiet));
        }
    }

    fn holding_ore(quantity: u32) -> Ship {
        let mut ship = Ship::new("d", "bob", "sys", PositionId(2));
        ship.cargo.add("ore", quantity).unwrap();
        ship
    }

    fn ore_in_world(entities: &Entities) -> u32 {
        entities
            .iter()
            .filter_map(Entity::cargo)
            .map(|c| c.quantity_of("ore"))
            .sum()
    }

    fn world(defender: Ship) -> (Entities, Runner) {
        let runner = Runner::new();
        runner.track(Position::new(PositionId(1))).unwrap();
        runner
            .track(Position::new(PositionId(2)).at(Vec3::new(10.0, 0.0, 0.0)))
            .unwrap();
        let mut entities = Entities::default();
        entities
            .insert(
                Ship {
                    damage_dealt: 50,
                    ..Ship::new("a", "alice", "sys", PositionId(1))
                }
                .into(),
            )
            .unwrap();
        entities.insert(defender.into()).unwrap();
        (entities, runner)
    }

    #[test]
    fn one_cycle_hits_shield_then_hp() {
        let (mut entities, runner) = world(Ship {
            hp: 100,
            shield_level: 30,
            ..Ship::new("d", "bob", "sys", PositionId(2))
        });
        let mut attack = Attack::new("a", "d");
        let mut ctx = CommandContext::new(0.0, &mut entities, &runner, &NoAttributes);
        let out = run_tick(&mut attack, &mut ctx);
        assert!(out.executed);
        assert!(!out.removed);
        drop(ctx);
        let d = entities.ship(&"d".into()).unwrap();
        assert_eq!((d.shield_level, d.hp), (0, 80));
        assert_eq!(
            entities.ship(&"a".into()).unwrap().attacking,
            Some(EntityId::from("d"))
        );
    }

    #[test]
    fn out_of_range_attack_is_removed_without_damage() {
        let (mut entities, runner) = world(Ship::new("d", "bob", "sys", PositionId(2)));
        runner
            .teleport(PositionId(2), Vec3::new(1000.0, 0.0, 0.0))
            .unwrap();
        let mut attack = Attack::new("a", "d");
        let mut ctx = CommandContext::new(0.0, &mut entities, &runner, &NoAttributes);
        let out = run_tick(&mut attack, &mut ctx);
        assert!(!out.executed);
        assert!(out.removed);
        drop(ctx);
        assert_eq!(entities.ship(&"d".into()).unwrap().hp, 25);
        assert_eq!(entities.ship(&"a".into()).unwrap().attacking, None);
    }

    #[test]
    fn stop_after_teardown_is_silent() {
        let (mut entities, runner) = world(Ship {
            hp: 1000,
            ..Ship::new("d", "bob", "sys", PositionId(2))
        });
        listen_all(&mut entities, "a");
        listen_all(&mut entities, "d");
        let mut attack = Attack::new("a", "d");
        let mut ctx = CommandContext::new(0.0, &mut entities, &runner, &NoAttributes);
        run_tick(&mut attack, &mut ctx);
        attack.teardown(&mut ctx).unwrap();
        attack.stop(&mut ctx).unwrap();
        assert!(ctx.entities().ship(&"a".into()).unwrap().attacking.is_none());

        let kinds: Vec<_> = ctx.queued().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Attacked,
                EventKind::Defended,
                EventKind::AttackedStop,
                EventKind::DefendedStop,
            ]
        );
    }

    // ── Loot ─────────────────────────────────────────────────────

    #[test]
    fn destruction_leaves_cargo_as_loot() {
        let (mut entities, runner) = world(holding_ore(7));
        let mut attack = Attack::new("a", "d");
        let mut ctx = CommandContext::new(0.0, &mut entities, &runner, &NoAttributes);
        let out = run_tick(&mut attack, &mut ctx);
        assert!(out.removed && !out.failed);
        drop(ctx);

        let Some(Entity::Loot(loot)) = entities.get(&"d-loot".into()) else {
            panic!("expected loot");
        };
        assert_eq!(loot.cargo.quantity_of("ore"), 7);
        assert_eq!(loot.position_id, PositionId(2));
        assert!(entities.ship(&"d".into()).unwrap().cargo.is_empty());
    }

    #[test]
    fn salvage_joins_existing_loot() {
        let (mut entities, runner) = world(holding_ore(7));
        let mut leftover = Cargo::new(3);
        leftover.add("ore", 3).unwrap();
        entities
            .insert(
                Loot {
                    id: "d-loot".into(),
                    system_id: "sys".into(),
                    position_id: PositionId(2),
                    cargo: leftover,
                }
                .into(),
            )
            .unwrap();

        let mut attack = Attack::new("a", "d");
        let mut ctx = CommandContext::new(0.0, &mut entities, &runner, &NoAttributes);
        let out = run_tick(&mut attack, &mut ctx);
        assert!(out.removed && !out.failed);
        drop(ctx);

        assert_eq!(ore_in_world(&entities), 10);
        let loot = entities.get(&"d-loot".into()).and_then(Entity::cargo).unwrap();
        assert_eq!(loot.quantity_of("ore"), 10);
    }

    #[test]
    fn cargo_stays_in_wreck_when_loot_id_is_taken() {
        let (mut entities, runner) = world(holding_ore(7));
        entities
            .insert(Ship::new("d-loot", "carol", "sys", PositionId(1)).into())
            .unwrap();

        let mut attack = Attack::new("a", "d");
        let mut ctx = CommandContext::new(0.0, &mut entities, &runner, &NoAttributes);
        let out = run_tick(&mut attack, &mut ctx);
        assert!(out.removed && !out.failed);
        drop(ctx);

        assert_eq!(ore_in_world(&entities), 7);
        assert_eq!(entities.ship(&"d".into()).unwrap().cargo.quantity_of("ore"), 7);
        assert_eq!(entities.len(), 3);
    }

    #[test]
    fn processes_both_ships() {
        let attack = Attack::new("a", "d");
        assert!(attack.processes(&"a".into()));
        assert!(attack.processes(&"d".into()));
        assert!(!attack.processes(&"x".into()));
        assert_eq!(attack.id().to_string(), "attack-cmd-a");
    }
}
