//! Periodic command lifecycle.
//!
//! A [`Command`] is a long-running action bound to one or more entities
//! (an attack, a mining run). The registry's command scheduler drives
//! each one through [`run_tick`]:
//!
//! 1. `setup`, once, the first time the command is ticked;
//! 2. `before`, every tick;
//! 3. `execute`, when [`Command::should_run`] allows it (throttled by
//!    [`CommandState::exec_rate`]), stamping `last_ran_at`;
//! 4. `after`, every tick;
//! 5. if [`Command::remove`] is now true, `teardown` runs and the command
//!    is dropped.
//!
//! [`Command::stop`] is the forced path, taken when an entity the command
//! [`processes`](Command::processes) is destroyed or removed.
//!
//! Hooks run with the registry locked and see it through a
//! [`CommandContext`]. Listener notifications and stop requests raised by
//! hooks are queued on the context and carried out by the registry.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use stellar_core::{CommandError, CommandId, EntityEvent, EntityId, PositionId, Subscription, Vec3};

use crate::attack::Attack;
use crate::mine::Mine;
use crate::registry::Entities;
use crate::seams::{AttributeSink, Locations};

// ── CommandState ───────────────────────────────────────────────────

/// Scheduling bookkeeping shared by every command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandState {
    /// Minimum seconds between `execute` runs. `None` runs every tick.
    pub exec_rate: Option<f64>,
    /// UNIX seconds of the last `execute`.
    pub last_ran_at: Option<f64>,
    /// Whether `setup` has run.
    pub ran_setup: bool,
}

impl CommandState {
    /// State with an execution rate.
    pub fn with_exec_rate(exec_rate: f64) -> Self {
        Self {
            exec_rate: Some(exec_rate),
            ..Self::default()
        }
    }

    /// True if `execute` may run at `now`.
    pub fn should_run(&self, now: f64) -> bool {
        match (self.last_ran_at, self.exec_rate) {
            (None, _) | (_, None) => true,
            (Some(last), Some(rate)) => now - last >= rate,
        }
    }

    /// Copy the scheduling fields from `other`.
    pub fn merge(&mut self, other: &CommandState) {
        self.ran_setup = other.ran_setup;
        self.last_ran_at = other.last_ran_at;
        self.exec_rate = other.exec_rate;
    }
}

// ── Command ────────────────────────────────────────────────────────

/// A periodic task run by the registry's command scheduler.
///
/// Only [`execute`](Command::execute) is mandatory; the other hooks
/// default to no-ops.
pub trait Command: Send {
    /// Unique id.
    fn id(&self) -> &CommandId;

    /// Scheduling state.
    fn state(&self) -> &CommandState;

    /// Mutable scheduling state.
    fn state_mut(&mut self) -> &mut CommandState;

    /// True if this command acts on `entity`, so that destroying it must
    /// stop the command.
    fn processes(&self, entity: &EntityId) -> bool;

    /// Runs once before anything else.
    fn setup(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        Ok(())
    }

    /// Runs every tick before `execute`.
    fn before(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        Ok(())
    }

    /// Whether `execute` runs this tick.
    fn should_run(&self, ctx: &CommandContext<'_>) -> bool {
        self.state().should_run(ctx.now())
    }

    /// The command's main logic.
    fn execute(&mut self, ctx: &mut CommandContext<'_>) -> Result<(), CommandError>;

    /// Runs every tick after `execute`.
    fn after(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        Ok(())
    }

    /// Whether the command is finished.
    fn remove(&self, _ctx: &CommandContext<'_>) -> bool {
        false
    }

    /// Runs once when `remove` turns true.
    fn teardown(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        Ok(())
    }

    /// Runs once when the command is stopped because an entity it
    /// processes went away.
    fn stop(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        Ok(())
    }

    /// Serializable form, or `None` if this command is not persisted.
    fn record(&self) -> Option<CommandRecord> {
        None
    }
}

/// What one [`run_tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// `execute` ran.
    pub executed: bool,
    /// A hook returned an error.
    pub failed: bool,
    /// `teardown` ran; drop the command.
    pub removed: bool,
}

/// Drive `cmd` through one tick of its lifecycle.
///
/// A failing hook ends the tick's remaining stages. The removal check
/// still runs, so a command whose entities vanished is torn down.
pub fn run_tick(cmd: &mut dyn Command, ctx: &mut CommandContext<'_>) -> TickOutcome {
    let mut outcome = TickOutcome::default();
    if let Err(e) = run_stages(cmd, ctx, &mut outcome) {
        tracing::warn!(command = %cmd.id(), error = %e, "command hook failed");
        outcome.failed = true;
    }
    if cmd.remove(ctx) {
        if let Err(e) = cmd.teardown(ctx) {
            tracing::warn!(command = %cmd.id(), error = %e, "command teardown failed");
            outcome.failed = true;
        }
        tracing::info!(command = %cmd.id(), "command finished");
        outcome.removed = true;
    }
    outcome
}

fn run_stages(
    cmd: &mut dyn Command,
    ctx: &mut CommandContext<'_>,
    outcome: &mut TickOutcome,
) -> Result<(), CommandError> {
    if !cmd.state().ran_setup {
        cmd.setup(ctx)?;
        cmd.state_mut().ran_setup = true;
        tracing::debug!(command = %cmd.id(), "command set up");
    }
    cmd.before(ctx)?;
    if cmd.should_run(ctx) {
        cmd.state_mut().last_ran_at = Some(ctx.now());
        cmd.execute(ctx)?;
        outcome.executed = true;
    }
    cmd.after(ctx)
}

/// Run `cmd`'s forced-stop hook, logging a failure.
pub(crate) fn run_stop(cmd: &mut dyn Command, ctx: &mut CommandContext<'_>) {
    tracing::info!(command = %cmd.id(), "stopping command");
    if let Err(e) = cmd.stop(ctx) {
        tracing::warn!(command = %cmd.id(), error = %e, "command stop hook failed");
    }
}

// ── CommandContext ─────────────────────────────────────────────────

/// A notification waiting for the registry lock to be released.
pub(crate) struct PendingEvent {
    pub subscriptions: Vec<Subscription>,
    pub event: EntityEvent,
}

/// What a hook sees of the world while the registry is locked.
pub struct CommandContext<'a> {
    now: f64,
    entities: &'a mut Entities,
    locations: &'a dyn Locations,
    attributes: &'a dyn AttributeSink,
    events: Vec<PendingEvent>,
    stop_requests: VecDeque<EntityId>,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(
        now: f64,
        entities: &'a mut Entities,
        locations: &'a dyn Locations,
        attributes: &'a dyn AttributeSink,
    ) -> Self {
        Self {
            now,
            entities,
            locations,
            attributes,
            events: Vec::new(),
            stop_requests: VecDeque::new(),
        }
    }

    /// UNIX seconds this tick is running at.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// The registry's entities.
    pub fn entities(&self) -> &Entities {
        &*self.entities
    }

    /// Mutable access to the registry's entities.
    pub fn entities_mut(&mut self) -> &mut Entities {
        &mut *self.entities
    }

    /// Current coordinates of a runner position.
    pub fn coordinates_of(&self, id: PositionId) -> Option<Vec3> {
        self.locations.coordinates_of(id)
    }

    /// Distance between two runner positions, if both are tracked.
    pub fn distance_between(&self, a: PositionId, b: PositionId) -> Option<f64> {
        Some(self.coordinates_of(a)?.distance(self.coordinates_of(b)?))
    }

    /// Stop a runner position in place.
    pub fn halt(&self, id: PositionId) {
        self.locations.halt(id);
    }

    /// Bump a user attribute by one.
    pub fn increment_attribute(&self, user: &str, attribute: &str) {
        self.attributes.increment(user, attribute, 1);
    }

    /// Queue `event` for `event.entity`'s listeners. Delivery happens
    /// after the registry lock is released.
    pub fn notify(&mut self, event: EntityEvent) {
        if let Some(pending) = self.entities.pending(event) {
            self.events.push(pending);
        }
    }

    /// Ask the scheduler to stop every other command that processes
    /// `entity`.
    pub fn stop_commands_for(&mut self, entity: &EntityId) {
        self.stop_requests.push_back(entity.clone());
    }

    pub(crate) fn next_stop_request(&mut self) -> Option<EntityId> {
        self.stop_requests.pop_front()
    }

    pub(crate) fn into_events(self) -> Vec<PendingEvent> {
        self.events
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> impl Iterator<Item = &EntityEvent> {
        self.events.iter().map(|p| &p.event)
    }
}

// ── CommandRecord ──────────────────────────────────────────────────

/// Serialized form of a built-in command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandRecord {
    /// An [`Attack`].
    Attack {
        /// Attacking ship.
        attacker: EntityId,
        /// Attacked ship.
        defender: EntityId,
        /// Scheduling state.
        state: CommandState,
    },
    /// A [`Mine`].
    Mine {
        /// Mining ship.
        miner: EntityId,
        /// Deposit being mined.
        deposit: EntityId,
        /// Scheduling state.
        state: CommandState,
    },
}

impl CommandRecord {
    /// Rebuild the live command.
    pub fn into_command(self) -> Box<dyn Command> {
        match self {
            Self::Attack {
                attacker,
                defender,
                state,
            } => Box::new(Attack::new(attacker, defender).with_state(state)),
            Self::Mine {
                miner,
                deposit,
                state,
            } => Box::new(Mine::new(miner, deposit).with_state(state)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Runner;
    use crate::seams::NoAttributes;

    struct Probe {
        id: CommandId,
        state: CommandState,
        hooks: Vec<&'static str>,
        finish_after: usize,
        fail_execute: bool,
    }

    impl Probe {
        fn new(finish_after: usize) -> Self {
            Self {
                id: CommandId::from("probe"),
                state: CommandState::default(),
                hooks: Vec::new(),
                finish_after,
                fail_execute: false,
            }
        }

        fn executions(&self) -> usize {
            self.hooks.iter().filter(|h| **h == "execute").count()
        }
    }

    impl Command for Probe {
        fn id(&self) -> &CommandId {
            &self.id
        }
        fn state(&self) -> &CommandState {
            &self.state
        }
        fn state_mut(&mut self) -> &mut CommandState {
            &mut self.state
        }
        fn processes(&self, _entity: &EntityId) -> bool {
            false
        }
        fn setup(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
            self.hooks.push("setup");
            Ok(())
        }
        fn before(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
            self.hooks.push("before");
            Ok(())
        }
        fn execute(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
            self.hooks.push("execute");
            if self.fail_execute {
                return Err(CommandError::Failed {
                    command: self.id.clone(),
                    reason: "nope".into(),
                });
            }
            Ok(())
        }
        fn after(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
            self.hooks.push("after");
            Ok(())
        }
        fn remove(&self, _ctx: &CommandContext<'_>) -> bool {
            self.executions() >= self.finish_after
        }
        fn teardown(&mut self, _ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
            self.hooks.push("teardown");
            Ok(())
        }
    }

    fn tick(cmd: &mut dyn Command, now: f64) -> TickOutcome {
        let mut entities = Entities::default();
        let runner = Runner::new();
        let mut ctx = CommandContext::new(now, &mut entities, &runner, &NoAttributes);
        run_tick(cmd, &mut ctx)
    }

    // ── CommandState ─────────────────────────────────────────────

    #[test]
    fn should_run_without_history_or_rate() {
        assert!(CommandState::with_exec_rate(5.0).should_run(0.0));
        let s = CommandState {
            last_ran_at: Some(100.0),
            ..CommandState::default()
        };
        assert!(s.should_run(100.0));
    }

    #[test]
    fn should_run_respects_rate() {
        let s = CommandState {
            exec_rate: Some(1.0),
            last_ran_at: Some(100.0),
            ran_setup: true,
        };
        assert!(!s.should_run(100.5));
        assert!(s.should_run(101.0));
        assert!(s.should_run(102.0));
    }

    #[test]
    fn merge_copies_scheduling_fields() {
        let mut a = CommandState::default();
        let b = CommandState {
            exec_rate: Some(5.0),
            last_ran_at: Some(10.0),
            ran_setup: true,
        };
        a.merge(&b);
        assert_eq!(a, b);
    }

    // ── Lifecycle ────────────────────────────────────────────────

    #[test]
    fn lifecycle_runs_hooks_in_order() {
        let mut p = Probe::new(2);
        assert!(!tick(&mut p, 1.0).removed);
        let last = tick(&mut p, 2.0);
        assert!(last.removed);
        assert_eq!(
            p.hooks,
            vec![
                "setup", "before", "execute", "after", "before", "execute", "after", "teardown"
            ]
        );
        assert_eq!(p.state.last_ran_at, Some(2.0));
    }

    #[test]
    fn throttled_tick_skips_execute_only() {
        let mut p = Probe::new(10);
        p.state.exec_rate = Some(5.0);
        tick(&mut p, 0.0);
        let out = tick(&mut p, 1.0);
        assert!(!out.executed);
        assert_eq!(p.executions(), 1);
        assert_eq!(p.hooks.iter().filter(|h| **h == "before").count(), 2);
        assert_eq!(p.hooks.iter().filter(|h| **h == "after").count(), 2);
        assert!(tick(&mut p, 5.0).executed);
    }

    #[test]
    fn failed_execute_skips_after_but_checks_removal() {
        let mut p = Probe::new(1);
        p.fail_execute = true;
        let out = tick(&mut p, 0.0);
        assert!(out.failed);
        assert!(out.removed);
        assert_eq!(p.hooks, vec!["setup", "before", "execute", "teardown"]);
    }

    #[test]
    fn record_round_trip() {
        let rec = CommandRecord::Attack {
            attacker: "a".into(),
            defender: "d".into(),
            state: CommandState {
                exec_rate: Some(1.0),
                last_ran_at: Some(1234.5),
                ran_setup: true,
            },
        };
        let cmd = rec.clone().into_command();
        assert_eq!(cmd.id(), &CommandId::from("attack-cmd-a"));
        assert_eq!(cmd.record(), Some(rec));
    }
}
