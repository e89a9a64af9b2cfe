//! Positions and motion rules for the Stellar simulation backend.
//!
//! A [`Position`] is the spatial record a runner advances each tick. It
//! carries coordinates, a unit orientation, cumulative distance and
//! angle, exactly one [`MotionRule`], and ordered movement and proximity
//! callback lists.
//!
//! Rules are a closed enum. Rotation is a component value
//! ([`Rotation`]) that [`Linear`] holds optionally and that
//! [`MotionRule::Rotate`] uses on its own.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod elliptical;
pub mod follow;
pub mod linear;
pub mod position;
pub mod rotation;
pub mod rule;

pub use elliptical::{EllipseOrigin, Elliptical};
pub use follow::Follow;
pub use linear::Linear;
pub use position::{
    Kinematics, MovementCallback, Position, PositionEvent, PositionListener, ProximityCallback,
    ProximityHit, ProximityTrigger,
};
pub use rotation::Rotation;
pub use rule::{MotionRule, NoTargets, TargetLookup};
