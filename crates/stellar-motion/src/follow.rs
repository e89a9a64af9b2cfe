//! Chase another tracked position.

use serde::{Deserialize, Serialize};
use stellar_core::{MotionError, PositionId, Vec3};

use crate::position::Kinematics;
use crate::rule::TargetLookup;

/// Moves at constant speed towards `target + offset`, idling while within
/// `distance` of it and resuming when the target moves away.
///
/// Follow never terminates; it is cancelled by assigning another rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Follow {
    /// The position being followed.
    pub target: PositionId,
    /// Fixed offset from the target's coordinates.
    pub offset: Vec3,
    /// Stay at least this close, in units. Non-negative.
    pub distance: f64,
    /// Units per second, strictly positive.
    pub speed: f64,
    /// Turn to face the direction of travel while moving.
    pub point_to_target: bool,
}

impl Follow {
    /// Follow `target` at `speed`, stopping within `distance`.
    pub fn new(target: PositionId, distance: f64, speed: f64) -> Result<Self, MotionError> {
        let follow = Self {
            target,
            offset: Vec3::ZERO,
            distance,
            speed,
            point_to_target: true,
        };
        follow.validate()?;
        Ok(follow)
    }

    /// Aim for `target + offset` instead of the target itself.
    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }

    /// Check parameters.
    pub fn validate(&self) -> Result<(), MotionError> {
        if !self.distance.is_finite() || self.distance < 0.0 {
            return Err(MotionError::invalid(
                "follow",
                format!("distance must be non-negative, got {}", self.distance),
            ));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(MotionError::invalid(
                "follow",
                format!("speed must be positive, got {}", self.speed),
            ));
        }
        if !self.offset.is_finite() {
            return Err(MotionError::invalid("follow", "offset must be finite"));
        }
        Ok(())
    }

    fn aim_point(&self, targets: &dyn TargetLookup) -> Result<Vec3, MotionError> {
        targets
            .coordinates_of(self.target)
            .map(|c| c + self.offset)
            .ok_or(MotionError::TargetMissing {
                target: self.target,
            })
    }

    /// True if `state` is already within range of the aim point.
    pub fn on_target(
        &self,
        state: &Kinematics,
        targets: &dyn TargetLookup,
    ) -> Result<bool, MotionError> {
        Ok(state.coords.distance(self.aim_point(targets)?) <= self.distance)
    }

    pub(crate) fn advance(
        &self,
        state: &mut Kinematics,
        elapsed: f64,
        targets: &dyn TargetLookup,
    ) -> Result<bool, MotionError> {
        let to_target = self.aim_point(targets)? - state.coords;
        let gap = to_target.length();
        if gap <= self.distance {
            return Ok(false);
        }
        let Some(direction) = to_target.normalize() else {
            return Ok(false);
        };
        let step = (self.speed * elapsed).min(gap - self.distance);
        if step <= 0.0 {
            return Ok(false);
        }
        state.coords += direction * step;
        state.distance_moved += step;
        if self.point_to_target {
            state.orientation = direction;
        }
        Ok(true)
    }
}
