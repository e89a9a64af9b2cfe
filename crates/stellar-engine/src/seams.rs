//! Collaborator traits injected into the [`Registry`](crate::Registry).
//!
//! The registry never reaches into the runner or the user store
//! directly. It sees coordinates, halting and release through [`Locations`]
//! (implemented by [`Runner`](crate::Runner)) and bumps per-user
//! counters through [`AttributeSink`].

use stellar_core::{PositionId, Vec3};

/// Coordinate lookup and motion halting for tracked positions.
pub trait Locations: Send + Sync {
    /// Current coordinates of `id`, if tracked.
    fn coordinates_of(&self, id: PositionId) -> Option<Vec3>;

    /// Replace `id`'s rule with `Stationary`. Unknown ids are ignored.
    fn halt(&self, id: PositionId);

    /// Stop tracking `id` once no entity refers to it. Unknown ids are
    /// ignored.
    fn release(&self, id: PositionId);
}

/// Per-user attribute counters owned by the user store.
pub trait AttributeSink: Send + Sync {
    /// Add `by` to `attribute` for `user`.
    fn increment(&self, user: &str, attribute: &str, by: u64);
}

/// An [`AttributeSink`] that discards every update.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAttributes;

impl AttributeSink for NoAttributes {
    fn increment(&self, _user: &str, _attribute: &str, _by: u64) {}
}

/// Attribute bumped on the attacker's user when a ship is destroyed.
pub const SHIPS_USER_DESTROYED: &str = "ships_user_destroyed";

/// Attribute bumped on the defender's user when their ship is destroyed.
pub const USER_SHIPS_DESTROYED: &str = "user_ships_destroyed";
