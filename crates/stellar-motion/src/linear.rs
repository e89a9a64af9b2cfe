//! Straight-line motion at constant speed.

use serde::{Deserialize, Serialize};
use stellar_core::{MotionError, Vec3};

use crate::position::Kinematics;
use crate::rotation::Rotation;

/// Moves along a fixed unit direction at constant speed, optionally
/// rotating at the same time.
///
/// With a `stop_distance` the final step is clipped so the cumulative
/// distance lands exactly on the boundary, after which the rule reports
/// terminated. A configured rotation that reaches its stop angle also
/// terminates the rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    /// Unit direction of travel.
    pub direction: Vec3,
    /// Units per second, strictly positive.
    pub speed: f64,
    /// Terminate after travelling this far.
    pub stop_distance: Option<f64>,
    /// Optional simultaneous rotation.
    pub rotation: Option<Rotation>,
}

impl Linear {
    /// Move along `direction` (normalized here) at `speed`.
    pub fn new(direction: Vec3, speed: f64) -> Result<Self, MotionError> {
        let direction = direction
            .normalize()
            .ok_or_else(|| MotionError::invalid("linear", "direction must be non-zero"))?;
        let linear = Self {
            direction,
            speed,
            stop_distance: None,
            rotation: None,
        };
        linear.validate()?;
        Ok(linear)
    }

    /// Terminate after `distance` units.
    pub fn with_stop_distance(mut self, distance: f64) -> Self {
        self.stop_distance = Some(distance);
        self
    }

    /// Rotate while moving.
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// Check parameters.
    pub fn validate(&self) -> Result<(), MotionError> {
        if !self.direction.is_normalized() {
            return Err(MotionError::invalid("linear", "direction must be normalized"));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(MotionError::invalid(
                "linear",
                format!("speed must be positive, got {}", self.speed),
            ));
        }
        if let Some(stop) = self.stop_distance {
            if !stop.is_finite() || stop <= 0.0 {
                return Err(MotionError::invalid(
                    "linear",
                    format!("stop distance must be positive, got {stop}"),
                ));
            }
        }
        if let Some(rotation) = &self.rotation {
            rotation.validate()?;
        }
        Ok(())
    }

    pub(crate) fn advance(&self, state: &mut Kinematics, elapsed: f64) -> bool {
        if self.has_terminated(state) {
            return false;
        }

        let mut step = self.speed * elapsed;
        let mut clipped = false;
        if let Some(stop) = self.stop_distance {
            let remaining = (stop - state.distance_moved).max(0.0);
            if step >= remaining {
                step = remaining;
                clipped = true;
            }
        }

        let moved = step > 0.0;
        if moved {
            state.coords += self.direction * step;
        }
        match (clipped, self.stop_distance) {
            (true, Some(stop)) => state.distance_moved = stop,
            _ => state.distance_moved += step,
        }

        let rotated = self
            .rotation
            .as_ref()
            .is_some_and(|r| r.rotate(state, elapsed));
        moved || rotated
    }

    /// True once the stop distance or the rotation stop angle is reached.
    pub fn has_terminated(&self, state: &Kinematics) -> bool {
        self.stop_distance
            .is_some_and(|stop| state.distance_moved >= stop)
            || self.rotation.as_ref().is_some_and(|r| r.is_complete(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_normalizes_direction() {
        let l = Linear::new(Vec3::new(1.0, 2.0, 3.0), 5.0).unwrap();
        assert!(l.direction.is_normalized());
    }

    #[test]
    fn rejects_non_positive_speed() {
        assert!(Linear::new(Vec3::X, 0.0).is_err());
        assert!(Linear::new(Vec3::X, -5.0).is_err());
        assert!(Linear::new(Vec3::X, f64::NAN).is_err());
    }

    #[test]
    fn rejects_unnormalized_direction() {
        let mut l = Linear::new(Vec3::X, 5.0).unwrap();
        l.direction = Vec3::new(10.0, 0.0, 0.0);
        assert!(l.validate().is_err());
    }

    #[test]
    fn stop_distance_clips_final_step() {
        let l = Linear::new(Vec3::X, 10.0).unwrap().with_stop_distance(25.0);
        let mut state = Kinematics::default();
        let mut xs = Vec::new();
        for _ in 0..3 {
            assert!(l.advance(&mut state, 1.0));
            xs.push(state.coords.x);
        }
        assert_eq!(xs, vec![10.0, 20.0, 25.0]);
        assert!(l.has_terminated(&state));
        assert!(!l.advance(&mut state, 1.0));
        assert_eq!(state.coords.x, 25.0);
    }

    #[test]
    fn completed_rotation_terminates() {
        let rotation = Rotation::new(Vec3::Z, 1.0).unwrap().with_stop_angle(0.5);
        let l = Linear::new(Vec3::X, 1.0).unwrap().with_rotation(rotation);
        let mut state = Kinematics::default();
        l.advance(&mut state, 1.0);
        assert!(l.has_terminated(&state));
    }

    fn arb_direction() -> impl Strategy<Value = Vec3> {
        (-1.0f64..1.0, -1.0f64..1.0, -1.0f64..1.0)
            .prop_filter("non-degenerate", |(x, y, z)| x * x + y * y + z * z > 1e-3)
            .prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    proptest! {
        #[test]
        fn moves_by_speed_times_elapsed(
            dir in arb_direction(),
            speed in 0.01f64..1000.0,
            elapsed in 0.0f64..100.0,
        ) {
            let l = Linear::new(dir, speed).unwrap();
            let mut state = Kinematics::default();
            l.advance(&mut state, elapsed);
            let expected = l.direction * (speed * elapsed);
            prop_assert!(state.coords.approx_eq(expected, 1e-9 * (1.0 + speed * elapsed)));
            prop_assert!(!l.has_terminated(&state));
        }

        #[test]
        fn never_overshoots_stop_distance(
            speed in 0.1f64..100.0,
            stop in 0.1f64..500.0,
            steps in proptest::collection::vec(0.0f64..10.0, 1..40),
        ) {
            let l = Linear::new(Vec3::Y, speed).unwrap().with_stop_distance(stop);
            let mut state = Kinematics::default();
            for dt in steps {
                l.advance(&mut state, dt);
                prop_assert!(state.distance_moved <= stop);
            }
            if state.distance_moved == stop {
                prop_assert!(l.has_terminated(&state));
            }
        }
    }
}
