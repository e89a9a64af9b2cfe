//! A ship mining a deposit.

use stellar_core::{CommandError, CommandId, EntityEvent, EntityId, EventKind, EventPayload};

use crate::command::{Command, CommandContext, CommandRecord, CommandState};

/// Ship-mines-deposit. Id `mine-cmd-<miner>`.
///
/// Each executed cycle moves `min(mining_quantity, remaining, free cargo)`
/// units into the miner's hold and fires `resource_collected` on the
/// miner. Ends with `mining_stopped` once the deposit is empty, the hold
/// is full, or the miner is out of range, destroyed, or elsewhere.
#[derive(Clone, Debug)]
pub struct Mine {
    id: CommandId,
    miner: EntityId,
    deposit: EntityId,
    state: CommandState,
}

impl Mine {
    /// `miner` mines `deposit` every scheduler tick.
    pub fn new(miner: impl Into<EntityId>, deposit: impl Into<EntityId>) -> Self {
        let miner = miner.into();
        Self {
            id: CommandId::for_entity("mine", &miner),
            miner,
            deposit: deposit.into(),
            state: CommandState::default(),
        }
    }

    /// Mine at most once every `seconds`.
    pub fn with_exec_rate(mut self, seconds: f64) -> Self {
        self.state.exec_rate = Some(seconds);
        self
    }

    /// Resume from saved scheduling state.
    pub fn with_state(mut self, state: CommandState) -> Self {
        self.state = state;
        self
    }

    /// Why mining cannot continue, if it cannot.
    fn blocked(&self, ctx: &CommandContext<'_>) -> Option<&'static str> {
        let entities = ctx.entities();
        let Ok(ship) = entities.ship(&self.miner) else {
            return Some("miner gone");
        };
        let Ok(deposit) = entities.deposit(&self.deposit) else {
            return Some("deposit gone");
        };
        if !ship.alive() {
            return Some("miner destroyed");
        }
        if ship.system_id != deposit.system_id {
            return Some("different system");
        }
        if deposit.quantity == 0 {
            return Some("deposit depleted");
        }
        if ship.cargo.free() == 0 {
            return Some("cargo full");
        }
        match ctx.distance_between(ship.position_id, deposit.position_id) {
            Some(d) if ship.can_mine(deposit, d) => None,
            _ => Some("out of range"),
        }
    }

    fn stop_mining(&self, ctx: &mut CommandContext<'_>, reason: &str) {
        if let Ok(ship) = ctx.entities_mut().ship_mut(&self.miner) {
            ship.mining = None;
        }
        tracing::info!(miner = %self.miner, deposit = %self.deposit, reason, "mining stopped");
        ctx.notify(
            EntityEvent::between(EventKind::MiningStopped, &self.miner, &self.deposit)
                .with_payload(EventPayload::Reason(reason.to_owned())),
        );
    }
}

impl Command for Mine {
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
        *entity == self.miner || *entity == self.deposit
    }

    fn setup(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        ctx.entities().deposit(&self.deposit)?;
        ctx.entities_mut().ship_mut(&self.miner)?.mining = Some(self.deposit.clone());
        Ok(())
    }

    fn should_run(&self, ctx: &CommandContext<'_>) -> bool {
        self.state.should_run(ctx.now()) && self.blocked(ctx).is_none()
    }

    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        let ship = ctx.entities().ship(&self.miner)?;
        let (rate, free) = (ship.mining_quantity, ship.cargo.free());

        let deposit = ctx.entities_mut().deposit_mut(&self.deposit)?;
        let quantity = rate.min(deposit.quantity).min(free);
        if quantity == 0 {
            return Ok(());
        }
        deposit.quantity -= quantity;
        let material_id = deposit.material_id.clone();

        ctx.entities_mut()
            .ship_mut(&self.miner)?
            .cargo
            .add(&material_id, quantity)?;
        tracing::debug!(miner = %self.miner, %material_id, quantity, "resource collected");
        ctx.notify(
            EntityEvent::between(EventKind::ResourceCollected, &self.miner, &self.deposit)
                .with_payload(EventPayload::Resource {
                    material_id,
                    quantity,
                }),
        );
        Ok(())
    }

    fn remove(&self, ctx: &CommandContext<'_>) -> bool {
        self.blocked(ctx).is_some()
    }

    fn teardown(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        let reason = self.blocked(ctx).unwrap_or("finished");
        self.stop_mining(ctx, reason);
        Ok(())
    }

    fn stop(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        let mining = ctx
            .entities()
            .ship(&self.miner)
            .is_ok_and(|s| s.mining.as_ref() == Some(&self.deposit));
        if mining {
            self.stop_mining(ctx, "stopped");
        }
        Ok(())
    }

    fn record(&self) -> Option<CommandRecord> {
        Some(CommandRecord::Mine {
            miner: self.miner.clone(),
            deposit: self.deposit.clone(),
            state: self.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::run_tick;
    use crate::entity::{Deposit, Ship};
    use crate::registry::Entities;
    use crate::runner::Runner;
    use crate::seams::NoAttributes;
    use stellar_core::PositionId;
    use stellar_motion::Position;

    fn world(quantity: u32, capacity: u32) -> (Entities, Runner) {
        let runner = Runner::new();
        runner.track(Position::new(PositionId(1))).unwrap();
        runner.track(Position::new(PositionId(2))).unwrap();
        let mut entities = Entities::default();
        let mut miner = Ship::new("m", "alice", "sys", PositionId(1));
        miner.cargo.capacity = capacity;
        entities.insert(miner.into()).unwrap();
        entities
            .insert(
                Deposit {
                    id: "rock".into(),
                    system_id: "sys".into(),
                    position_id: PositionId(2),
                    material_id: "ore".into(),
                    quantity,
                }
                .into(),
            )
            .unwrap();
        (entities, runner)
    }

    #[test]
    fn mines_until_deposit_empty() {
        let (mut entities, runner) = world(12, 100);
        let mut mine = Mine::new("m", "rock");
        let mut removed_at = None;
        for tick in 0..5 {
            let mut ctx = CommandContext::new(tick as f64, &mut entities, &runner, &NoAttributes);
            if run_tick(&mut mine, &mut ctx).removed {
                removed_at = Some(tick);
                break;
            }
        }
        // 5 + 5 + 2, removed on the tick that empties it.
        assert_eq!(removed_at, Some(2));
        let ship = entities.ship(&"m".into()).unwrap();
        assert_eq!(ship.cargo.quantity_of("ore"), 12);
        assert!(ship.mining.is_none());
        assert_eq!(entities.deposit(&"rock".into()).unwrap().quantity, 0);
    }

    #[test]
    fn stops_when_cargo_full() {
        let (mut entities, runner) = world(100, 7);
        let mut mine = Mine::new("m", "rock");
        for tick in 0..2 {
            let mut ctx = CommandContext::new(tick as f64, &mut entities, &runner, &NoAttributes);
            run_tick(&mut mine, &mut ctx);
        }
        assert_eq!(entities.ship(&"m".into()).unwrap().cargo.total(), 7);
        assert_eq!(entities.deposit(&"rock".into()).unwrap().quantity, 93);
    }

    #[test]
    fn id_and_processes() {
        let mine = Mine::new("m", "rock");
        assert_eq!(mine.id().to_string(), "mine-cmd-m");
        assert!(mine.processes(&"rock".into()));
        assert!(!mine.processes(&"other".into()));
    }
}
