//! Runtime for the Stellar simulation backend.
//!
//! Two periodic schedulers share one world:
//!
//! - the [`Runner`] advances every tracked position along its motion
//!   rule and notifies movement, proximity and stop listeners;
//! - the [`Registry`] holds ships, stations, loot and deposits, and ticks
//!   long-running [`Command`]s such as [`Attack`] and [`Mine`] through
//!   their lifecycle.
//!
//! [`Simulation`] wires both to background [`Scheduler`] threads and
//! handles save and restore.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod attack;
pub mod command;
pub mod config;
pub mod entity;
pub mod mine;
pub mod persist;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod seams;
pub mod sim;

pub use attack::Attack;
pub use command::{run_tick, Command, CommandContext, CommandRecord, CommandState, TickOutcome};
pub use config::{ConfigError, SchedulerConfig, SimulationConfig};
pub use entity::{Cargo, Deposit, Entity, Loot, ResourceStack, Ship, Station};
pub use mine::Mine;
pub use persist::{PersistError, WorldSnapshot};
pub use registry::{CommandTickReport, Delivery, Entities, Registry};
pub use runner::{MotionStatus, Runner, TickReport, Tracked};
pub use scheduler::{Scheduler, SchedulerReport};
pub use seams::{AttributeSink, Locations, NoAttributes, SHIPS_USER_DESTROYED, USER_SHIPS_DESTROYED};
pub use sim::{ShutdownReport, Simulation};
