//! Top-level handle tying the runner, the registry and their two
//! background schedulers together.
//!
//! ```text
//! caller threads             stellar-runner            stellar-commands
//!     |                           |                           |
//!     |--registry()/runner()----->| runner.tick(elapsed)      |
//!     |   (shared handles)        |   advance, callbacks      |
//!     |                           |                           | registry.tick_commands()
//!     |                           |<--halt / coordinates------|   hooks under registry lock
//!     |--shutdown()-------------->| stop signal               | stop signal
//! ```

use std::sync::Arc;
use std::time::Instant;

use crate::config::{ConfigError, SimulationConfig};
use crate::persist::{PersistError, WorldSnapshot};
use crate::registry::Registry;
use crate::runner::Runner;
use crate::scheduler::{Scheduler, SchedulerReport};
use crate::seams::AttributeSink;

/// Both schedulers' reports from [`Simulation::shutdown`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The position runner.
    pub runner: SchedulerReport,
    /// The command scheduler.
    pub commands: SchedulerReport,
}

/// A runner and a registry wired together, plus their schedulers once
/// started.
pub struct Simulation {
    config: SimulationConfig,
    runner: Runner,
    registry: Registry,
    runner_thread: Option<Scheduler>,
    command_thread: Option<Scheduler>,
}

impl Simulation {
    /// An empty, stopped simulation. `attributes` receives per-user
    /// counter updates from commands.
    pub fn new(
        config: SimulationConfig,
        attributes: Arc<dyn AttributeSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let runner = Runner::new();
        let registry = Registry::new(Arc::new(runner.clone()), attributes);
        Ok(Self {
            config,
            runner,
            registry,
            runner_thread: None,
            command_thread: None,
        })
    }

    /// The configuration in force.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Handle to the position runner.
    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Handle to the entity registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// True between [`start`](Self::start) and [`shutdown`](Self::shutdown).
    pub fn is_running(&self) -> bool {
        self.runner_thread.is_some() || self.command_thread.is_some()
    }

    /// Spawn `stellar-runner` and `stellar-commands`.
    ///
    /// The runner is ticked with the wall-clock time since its previous
    /// tick; the command scheduler with the current UNIX time.
    pub fn start(&mut self) -> Result<(), ConfigError> {
        if self.is_running() {
            return Err(ConfigError::AlreadyRunning);
        }

        let runner = self.runner.clone();
        let mut last = Instant::now();
        let runner_thread =
            Scheduler::spawn("stellar-runner", self.config.runner.interval(), move || {
                let now = Instant::now();
                let elapsed = now.duration_since(last).as_secs_f64();
                last = now;
                runner.tick(elapsed).map(|_| ())
            })?;

        let registry = self.registry.clone();
        // Dropping `runner_thread` on failure stops it again.
        let command_thread =
            Scheduler::spawn("stellar-commands", self.config.commands.interval(), move || {
                registry.tick_commands().map(|_| ())
            })?;

        tracing::info!(
            runner_ms = self.config.runner.tick_interval_ms,
            commands_ms = self.config.commands.tick_interval_ms,
            "simulation started"
        );
        self.runner_thread = Some(runner_thread);
        self.command_thread = Some(command_thread);
        Ok(())
    }

    /// Stop both schedulers, letting in-progress ticks finish. Safe to
    /// call when not running.
    pub fn shutdown(&mut self) -> ShutdownReport {
        let report = ShutdownReport {
            runner: self.runner_thread.take().map(|mut s| s.shutdown()).unwrap_or_default(),
            commands: self.command_thread.take().map(|mut s| s.shutdown()).unwrap_or_default(),
        };
        tracing::info!(
            runner_ticks = report.runner.ticks,
            command_ticks = report.commands.ticks,
            "simulation stopped"
        );
        report
    }

    /// Capture the whole world.
    ///
    /// The registry and runner are read one after the other, so a
    /// running simulation may advance in between. Shut down first for an
    /// exact snapshot.
    pub fn snapshot(&self) -> Result<WorldSnapshot, PersistError> {
        let (entities, commands) = self.registry.snapshot()?;
        let positions = self.runner.snapshot()?;
        Ok(WorldSnapshot {
            positions,
            entities,
            commands,
        })
    }

    /// [`snapshot`](Self::snapshot) encoded as JSON.
    pub fn save(&self) -> Result<String, PersistError> {
        let json = self.snapshot()?.to_json()?;
        tracing::info!(bytes = json.len(), "simulation saved");
        Ok(json)
    }

    /// Rebuild a stopped, empty simulation from `snapshot`. Commands
    /// resume from their saved scheduling state and positions keep their
    /// rule and accumulated motion.
    pub fn restore_snapshot(&self, snapshot: WorldSnapshot) -> Result<(), PersistError> {
        if self.is_running() {
            return Err(PersistError::Conflict {
                reason: "simulation is running".into(),
            });
        }
        if !self.runner.is_empty() || !self.registry.is_empty() {
            return Err(PersistError::Conflict {
                reason: "simulation is not empty".into(),
            });
        }
        let WorldSnapshot {
            positions,
            entities,
            commands,
        } = snapshot;
        let counts = (positions.len(), entities.len(), commands.len());
        self.runner.restore(positions)?;
        if let Err(e) = self.registry.restore(entities, commands) {
            // Leave both sides empty rather than half restored.
            self.runner.restore(Vec::new())?;
            return Err(e.into());
        }
        tracing::info!(
            positions = counts.0,
            entities = counts.1,
            commands = counts.2,
            "simulation restored"
        );
        Ok(())
    }

    /// [`restore_snapshot`](Self::restore_snapshot) from JSON produced by
    /// [`save`](Self::save).
    pub fn restore(&self, json: &str) -> Result<(), PersistError> {
        self.restore_snapshot(WorldSnapshot::from_json(json)?)
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("runner", &self.runner)
            .field("registry", &self.registry)
            .field("running", &self.is_running())
            .finish()
    }
}
