//! Rotation component shared by motion rules.
//!
//! A [`Rotation`] turns a position's orientation about a fixed axis at a
//! constant angular speed. Rules that can rotate while doing something
//! else (currently [`Linear`](crate::Linear)) hold an optional
//! `Rotation` and call it from their own `advance`; the standalone
//! [`MotionRule::Rotate`](crate::MotionRule::Rotate) variant is just a
//! rotation on its own.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use stellar_core::{MotionError, Vec3};

use crate::position::Kinematics;

/// Constant-speed rotation about an axis, optionally stopping after a
/// fixed total angle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    /// Unit rotation axis.
    pub axis: Vec3,
    /// Angular speed in radians per second. Negative rotates clockwise
    /// about `axis`. Must satisfy `|speed| < 2π`.
    pub speed: f64,
    /// Stop once this many radians have been rotated in total.
    pub stop_angle: Option<f64>,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            axis: Vec3::Z,
            speed: 0.0,
            stop_angle: None,
        }
    }
}

impl Rotation {
    /// Rotation about `axis` at `speed` rad/s. The axis is normalized.
    pub fn new(axis: Vec3, speed: f64) -> Result<Self, MotionError> {
        let axis = axis
            .normalize()
            .ok_or_else(|| MotionError::invalid("rotation", "axis must be non-zero"))?;
        let rotation = Self {
            axis,
            speed,
            stop_angle: None,
        };
        rotation.validate()?;
        Ok(rotation)
    }

    /// Stop after `angle` radians.
    pub fn with_stop_angle(mut self, angle: f64) -> Self {
        self.stop_angle = Some(angle);
        self
    }

    /// Check parameters.
    pub fn validate(&self) -> Result<(), MotionError> {
        if !self.speed.is_finite() || self.speed.abs() >= TAU {
            return Err(MotionError::invalid(
                "rotation",
                format!("speed must be finite and below 2π rad/s, got {}", self.speed),
            ));
        }
        if !self.axis.is_normalized() {
            return Err(MotionError::invalid("rotation", "axis must be normalized"));
        }
        if let Some(stop) = self.stop_angle {
            if !stop.is_finite() || stop < 0.0 {
                return Err(MotionError::invalid(
                    "rotation",
                    format!("stop angle must be finite and non-negative, got {stop}"),
                ));
            }
        }
        Ok(())
    }

    /// True once the configured stop angle has been reached.
    pub fn is_complete(&self, state: &Kinematics) -> bool {
        self.stop_angle
            .is_some_and(|stop| state.angle_rotated >= stop)
    }

    /// True if the next [`rotate`](Self::rotate) would change orientation.
    pub fn is_rotating(&self, state: &Kinematics) -> bool {
        self.speed != 0.0 && !self.is_complete(state)
    }

    /// Rotate `state.orientation` by `speed * elapsed`, clipped so the
    /// total never passes the stop angle. Returns true if it changed.
    pub fn rotate(&self, state: &mut Kinematics, elapsed: f64) -> bool {
        if !self.is_rotating(state) {
            return false;
        }
        let mut angle = self.speed * elapsed;
        if let Some(stop) = self.stop_angle {
            let remaining = (stop - state.angle_rotated).max(0.0);
            if angle.abs() > remaining {
                angle = remaining.copysign(angle);
            }
        }
        if angle == 0.0 {
            return false;
        }
        let turned = state.orientation.rotate_about(self.axis, angle);
        // Renormalize to keep float drift from breaking the unit invariant.
        state.orientation = turned.normalize().unwrap_or(state.orientation);
        state.angle_rotated += angle.abs();
        true
    }
}
