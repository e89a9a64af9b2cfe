//! Stellar: a persistent-world simulation backend.
//!
//! This is the facade crate re-exporting the public API of the Stellar
//! sub-crates. Entities own positions that evolve under pluggable motion
//! rules, and long-running actions such as combat and mining run as
//! periodic commands against a shared registry.
//!
//! # Quick start
//!
//! ```rust
//! use stellar::prelude::*;
//!
//! let runner = Runner::new();
//! let rule = Linear::new(Vec3::X, 5.0).unwrap().with_stop_distance(8.0);
//! runner
//!     .track(Position::new(PositionId(1)).with_rule(rule).unwrap())
//!     .unwrap();
//!
//! runner.tick(1.0).unwrap();
//! assert_eq!(runner.get(PositionId(1)).unwrap().coords(), Vec3::new(5.0, 0.0, 0.0));
//!
//! // The second step is clipped to the stop distance.
//! let report = runner.tick(1.0).unwrap();
//! assert_eq!(report.stopped, vec![PositionId(1)]);
//! assert_eq!(runner.status(PositionId(1)).unwrap(), MotionStatus::Stopped);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `stellar-core` | Ids, vector math, errors, entity events |
//! | [`motion`] | `stellar-motion` | Positions, motion rules, position listeners |
//! | [`engine`] | `stellar-engine` | Runner, registry, commands, schedulers, persistence |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Ids, vector math, error enums and entity-event dispatch
/// (`stellar-core`).
pub use stellar_core as types;

/// Positions and motion rules (`stellar-motion`).
///
/// [`motion::MotionRule`] is the closed set of rules a
/// [`motion::Position`] can follow.
pub use stellar_motion as motion;

/// Runtime (`stellar-engine`).
///
/// [`engine::Simulation`] runs the [`engine::Runner`] and the
/// [`engine::Registry`] on background threads.
pub use stellar_engine as engine;

/// Common imports.
///
/// ```rust
/// use stellar::prelude::*;
/// ```
pub mod prelude {
    // Core
    pub use stellar_core::{
        CommandId, EntityEvent, EntityId, EntityListener, EventKind, EventPayload, PositionId,
        Vec3,
    };

    // Errors
    pub use stellar_core::{CallbackError, CommandError, MotionError, RegistryError, RunnerError};

    // Motion
    pub use stellar_motion::{
        Elliptical, Follow, Linear, MotionRule, MovementCallback, Position, PositionEvent,
        PositionListener, ProximityCallback, ProximityTrigger, Rotation,
    };

    // Engine
    pub use stellar_engine::{
        Attack, AttributeSink, Command, CommandContext, CommandState, Deposit, Entity, Mine,
        MotionStatus, Registry, Runner, Ship, Simulation, SimulationConfig, Station,
    };
}
