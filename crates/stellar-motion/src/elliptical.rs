//! Keplerian elliptical orbits.
//!
//! The ellipse lies in the plane spanned by the unit vectors `major`
//! (towards periapsis) and `minor`, in the parent's frame. Distance from
//! the focus at true anomaly θ is `r(θ) = p / (1 + e·cos θ)` where `p` is
//! the semi-latus rectum and `e` the eccentricity.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use stellar_core::{MotionError, Vec3};

use crate::position::Kinematics;

/// Which point of the ellipse sits at the parent frame's origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EllipseOrigin {
    /// The occupied focus (the body being orbited).
    #[default]
    Focus,
    /// The geometric center.
    Center,
}

/// Perpetual orbit advancing the true anomaly at constant angular speed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Elliptical {
    /// Semi-latus rectum `p`, strictly positive.
    pub semi_latus_rectum: f64,
    /// Eccentricity `e` in `[0, 1)`.
    pub eccentricity: f64,
    /// True-anomaly rate in radians per second, strictly positive.
    pub speed: f64,
    /// Unit vector from the center towards periapsis.
    pub major: Vec3,
    /// Unit vector perpendicular to `major`, the direction of travel at
    /// periapsis.
    pub minor: Vec3,
    /// Frame origin.
    pub origin: EllipseOrigin,
    /// Current true anomaly in `[0, 2π)`.
    pub true_anomaly: f64,
}

impl Elliptical {
    /// Orbit in the plane of `major`/`minor` (both normalized here).
    pub fn new(
        semi_latus_rectum: f64,
        eccentricity: f64,
        speed: f64,
        major: Vec3,
        minor: Vec3,
    ) -> Result<Self, MotionError> {
        let norm = |v: Vec3| {
            v.normalize()
                .ok_or_else(|| MotionError::invalid("elliptical", "axes must be non-zero"))
        };
        let orbit = Self {
            semi_latus_rectum,
            eccentricity,
            speed,
            major: norm(major)?,
            minor: norm(minor)?,
            origin: EllipseOrigin::Focus,
            true_anomaly: 0.0,
        };
        orbit.validate()?;
        Ok(orbit)
    }

    /// Place the frame origin at the ellipse's center or focus.
    pub fn relative_to(mut self, origin: EllipseOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Start from true anomaly `theta` (wrapped into `[0, 2π)`).
    pub fn starting_at(mut self, theta: f64) -> Self {
        self.true_anomaly = theta.rem_euclid(TAU);
        self
    }

    /// Check parameters.
    pub fn validate(&self) -> Result<(), MotionError> {
        if !self.semi_latus_rectum.is_finite() || self.semi_latus_rectum <= 0.0 {
            return Err(MotionError::invalid(
                "elliptical",
                format!("semi-latus rectum must be positive, got {}", self.semi_latus_rectum),
            ));
        }
        if !(0.0..1.0).contains(&self.eccentricity) {
            return Err(MotionError::invalid(
                "elliptical",
                format!("eccentricity must be in [0, 1), got {}", self.eccentricity),
            ));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(MotionError::invalid(
                "elliptical",
                format!("speed must be positive, got {}", self.speed),
            ));
        }
        if !self.major.is_normalized() || !self.minor.is_normalized() {
            return Err(MotionError::invalid("elliptical", "axes must be normalized"));
        }
        if !self.major.is_orthogonal(self.minor) {
            return Err(MotionError::invalid("elliptical", "axes must be orthogonal"));
        }
        if !self.true_anomaly.is_finite() {
            return Err(MotionError::invalid("elliptical", "true anomaly must be finite"));
        }
        Ok(())
    }

    /// Semi-major axis `a = p / (1 - e²)`.
    pub fn semi_major_axis(&self) -> f64 {
        self.semi_latus_rectum / (1.0 - self.eccentricity * self.eccentricity)
    }

    /// Distance from the focus at true anomaly `theta`.
    pub fn radius_at(&self, theta: f64) -> f64 {
        self.semi_latus_rectum / (1.0 + self.eccentricity * theta.cos())
    }

    /// Where the occupied focus sits in the rule's frame.
    pub fn focus(&self) -> Vec3 {
        match self.origin {
            EllipseOrigin::Focus => Vec3::ZERO,
            EllipseOrigin::Center => self.major * (self.semi_major_axis() * self.eccentricity),
        }
    }

    /// Coordinates at true anomaly `theta`.
    pub fn position_at(&self, theta: f64) -> Vec3 {
        let r = self.radius_at(theta);
        let (sin, cos) = theta.sin_cos();
        self.focus() + self.major * (r * cos) + self.minor * (r * sin)
    }

    pub(crate) fn advance(&mut self, state: &mut Kinematics, elapsed: f64) -> bool {
        let previous = state.coords;
        self.true_anomaly = (self.true_anomaly + self.speed * elapsed).rem_euclid(TAU);
        state.coords = self.position_at(self.true_anomaly);
        state.distance_moved += previous.distance(state.coords);
        state.coords != previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    fn orbit(p: f64, e: f64) -> Elliptical {
        Elliptical::new(p, e, 0.1, Vec3::X, Vec3::Y).unwrap()
    }

    #[test]
    fn rejects_open_orbits() {
        assert!(Elliptical::new(10.0, 1.0, 0.1, Vec3::X, Vec3::Y).is_err());
        assert!(Elliptical::new(10.0, -0.1, 0.1, Vec3::X, Vec3::Y).is_err());
    }

    #[test]
    fn rejects_non_orthogonal_axes() {
        assert!(Elliptical::new(10.0, 0.5, 0.1, Vec3::X, Vec3::new(1.0, 1.0, 0.0)).is_err());
    }

    #[test]
    fn circle_is_constant_radius() {
        let o = orbit(50.0, 0.0);
        for deg in 0..360 {
            let theta = (deg as f64).to_radians();
            assert!((o.position_at(theta).length() - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn center_frame_vertices_are_at_semi_major_axis() {
        let o = orbit(30.0, 0.5).relative_to(EllipseOrigin::Center);
        let a = o.semi_major_axis();
        assert!(o.position_at(0.0).approx_eq(Vec3::new(a, 0.0, 0.0), 1e-9));
        assert!(o.position_at(PI).approx_eq(Vec3::new(-a, 0.0, 0.0), 1e-9));
    }

    #[test]
    fn advance_wraps_anomaly() {
        let mut o = Elliptical::new(10.0, 0.2, 1.0, Vec3::X, Vec3::Y)
            .unwrap()
            .starting_at(6.0);
        let mut state = Kinematics::default();
        assert!(o.advance(&mut state, 1.0));
        assert!((o.true_anomaly - (7.0 - TAU)).abs() < 1e-12);
        assert!(state.coords.approx_eq(o.position_at(7.0 - TAU), 1e-12));
    }

    #[test]
    fn full_revolution_samples_recover_ellipse() {
        for origin in [EllipseOrigin::Focus, EllipseOrigin::Center] {
            let mut o = Elliptical::new(40.0, 0.6, TAU / 360.0, Vec3::X, Vec3::Z)
                .unwrap()
                .relative_to(origin);
            let mut state = Kinematics::default();
            for _ in 0..360 {
                o.advance(&mut state, 1.0);
                let r = state.coords.distance(o.focus());
                assert!((r - o.radius_at(o.true_anomaly)).abs() < 1e-9);
            }
            assert!(o.true_anomaly < 1e-9 || (TAU - o.true_anomaly) < 1e-9);
        }
    }

    proptest! {
        #[test]
        fn distance_from_focus_matches_radius(
            p in 0.1f64..1e6,
            e in 0.0f64..0.99,
            theta in 0.0f64..TAU,
            center in any::<bool>(),
        ) {
            let origin = if center { EllipseOrigin::Center } else { EllipseOrigin::Focus };
            let o = orbit(p, e).relative_to(origin);
            let expected = p / (1.0 + e * theta.cos());
            let got = o.position_at(theta).distance(o.focus());
            prop_assert!((got - expected).abs() <= 1e-9 * expected.max(1.0));
        }
    }
}
