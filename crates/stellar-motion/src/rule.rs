//! The [`MotionRule`] enum and the [`TargetLookup`] seam.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use stellar_core::{MotionError, PositionId, Vec3};

use crate::elliptical::Elliptical;
use crate::follow::Follow;
use crate::linear::Linear;
use crate::position::Kinematics;
use crate::rotation::Rotation;

/// Read access to other positions' coordinates during an advance.
///
/// The runner implements this over a tick-start snapshot of every
/// tracked position, so rules never observe a half-ticked neighbour.
pub trait TargetLookup {
    /// Coordinates of `id`, if tracked.
    fn coordinates_of(&self, id: PositionId) -> Option<Vec3>;
}

impl TargetLookup for HashMap<PositionId, Vec3> {
    fn coordinates_of(&self, id: PositionId) -> Option<Vec3> {
        self.get(&id).copied()
    }
}

/// A lookup that knows no positions. Useful for rules that never
/// reference another position.
pub struct NoTargets;

impl TargetLookup for NoTargets {
    fn coordinates_of(&self, _id: PositionId) -> Option<Vec3> {
        None
    }
}

/// How a position's coordinates and orientation evolve over time.
///
/// Each variant validates its own parameters; [`Position::set_rule`]
/// refuses an invalid rule and keeps the previous one.
///
/// [`Position::set_rule`]: crate::Position::set_rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MotionRule {
    /// Never moves, never terminates.
    #[default]
    Stationary,
    /// Straight line at constant speed, optionally rotating.
    Linear(Linear),
    /// Perpetual Keplerian orbit.
    Elliptical(Elliptical),
    /// Rotation in place.
    Rotate(Rotation),
    /// Chase another position.
    Follow(Follow),
}

impl MotionRule {
    /// Variant name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stationary => "stationary",
            Self::Linear(_) => "linear",
            Self::Elliptical(_) => "elliptical",
            Self::Rotate(_) => "rotate",
            Self::Follow(_) => "follow",
        }
    }

    /// Check the rule's parameters.
    pub fn validate(&self) -> Result<(), MotionError> {
        match self {
            Self::Stationary => Ok(()),
            Self::Linear(l) => l.validate(),
            Self::Elliptical(e) => e.validate(),
            Self::Rotate(r) => r.validate(),
            Self::Follow(f) => f.validate(),
        }
    }

    /// Advance `state` by `elapsed` seconds. Returns true if coordinates
    /// or orientation changed.
    pub fn advance(
        &mut self,
        state: &mut Kinematics,
        elapsed: f64,
        targets: &dyn TargetLookup,
    ) -> Result<bool, MotionError> {
        match self {
            Self::Stationary => Ok(false),
            Self::Linear(l) => Ok(l.advance(state, elapsed)),
            Self::Elliptical(e) => Ok(e.advance(state, elapsed)),
            Self::Rotate(r) => Ok(r.rotate(state, elapsed)),
            Self::Follow(f) => f.advance(state, elapsed, targets),
        }
    }

    /// True once the rule has nothing left to do.
    pub fn has_terminated(&self, state: &Kinematics) -> bool {
        match self {
            Self::Stationary | Self::Elliptical(_) | Self::Follow(_) => false,
            Self::Linear(l) => l.has_terminated(state),
            Self::Rotate(r) => r.is_complete(state),
        }
    }
}

impl From<Linear> for MotionRule {
    fn from(v: Linear) -> Self {
        Self::Linear(v)
    }
}

impl From<Elliptical> for MotionRule {
    fn from(v: Elliptical) -> Self {
        Self::Elliptical(v)
    }
}

impl From<Rotation> for MotionRule {
    fn from(v: Rotation) -> Self {
        Self::Rotate(v)
    }
}

impl From<Follow> for MotionRule {
    fn from(v: Follow) -> Self {
        Self::Follow(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stationary_never_moves_or_terminates() {
        let mut rule = MotionRule::Stationary;
        let mut state = Kinematics::default();
        assert!(!rule.advance(&mut state, 100.0, &NoTargets).unwrap());
        assert_eq!(state, Kinematics::default());
        assert!(!rule.has_terminated(&state));
    }

    #[test]
    fn rotate_terminates_at_stop_angle() {
        let mut rule: MotionRule = Rotation::new(Vec3::Y, 0.5)
            .unwrap()
            .with_stop_angle(1.0)
            .into();
        let mut state = Kinematics::default();
        rule.advance(&mut state, 1.0, &NoTargets).unwrap();
        assert!(!rule.has_terminated(&state));
        rule.advance(&mut state, 1.0, &NoTargets).unwrap();
        assert!(rule.has_terminated(&state));
    }

    #[test]
    fn serde_round_trip_keeps_variant_and_anomaly() {
        let rule: MotionRule = Elliptical::new(10.0, 0.3, 0.2, Vec3::X, Vec3::Y)
            .unwrap()
            .starting_at(1.25)
            .into();
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"rule\":\"elliptical\""));
        let back: MotionRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }
}
