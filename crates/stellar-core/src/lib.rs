//! Core types for the Stellar simulation backend.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental pieces used throughout the workspace: typed ids,
//! vector math, error types, and the entity-event dispatch table.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod event;
pub mod id;
pub mod math;

pub use error::{CallbackError, CommandError, MotionError, RegistryError, RunnerError};
pub use event::{
    dispatch, DispatchReport, EntityEvent, EntityListener, EventDispatch, EventKind, EventPayload,
    Subscription,
};
pub use id::{CommandId, EntityId, PositionId};
pub use math::Vec3;
