//! The [`Position`] record, its listeners, and callback bookkeeping.
//!
//! A position owns exactly one [`MotionRule`] plus two ordered callback
//! lists. Movement callbacks fire when coordinates or orientation change
//! (and on the stop transition); proximity callbacks fire when the
//! distance to a target crosses a threshold. Callbacks are runtime
//! subscriptions and are skipped by serialization.
//!
//! This module only decides *which* callbacks are due and updates their
//! bookkeeping. Invoking listeners is the runner's job, outside its lock.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use stellar_core::{CallbackError, MotionError, PositionId, Vec3};

use crate::rule::{MotionRule, TargetLookup};

/// The mutable spatial state a motion rule operates on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    /// Coordinates in the parent's frame.
    pub coords: Vec3,
    /// Unit orientation vector.
    pub orientation: Vec3,
    /// Cumulative distance moved under the current rule.
    pub distance_moved: f64,
    /// Cumulative radians rotated under the current rule.
    pub angle_rotated: f64,
}

impl Default for Kinematics {
    fn default() -> Self {
        Self {
            coords: Vec3::ZERO,
            orientation: Vec3::Z,
            distance_moved: 0.0,
            angle_rotated: 0.0,
        }
    }
}

/// A notification delivered to a [`PositionListener`].
#[derive(Debug)]
pub enum PositionEvent<'a> {
    /// Coordinates or orientation changed.
    Moved {
        /// The position after the change.
        position: &'a Position,
        /// Coordinates when this callback last fired (or was registered).
        previous: Vec3,
    },
    /// Distance to a target crossed a proximity threshold.
    Proximity {
        /// The position being tracked.
        position: &'a Position,
        /// The target it was measured against.
        target: PositionId,
        /// Current distance to the target.
        distance: f64,
        /// True if it moved into range, false if it left.
        entered: bool,
    },
    /// The motion rule terminated or the position was explicitly stopped.
    Stopped {
        /// The position that stopped.
        position: &'a Position,
    },
}

/// A handle notified of position events.
pub trait PositionListener: Send + Sync {
    /// Handle one event.
    fn notify(&self, event: &PositionEvent<'_>) -> Result<(), CallbackError>;
}

/// A movement subscription.
#[derive(Clone)]
pub struct MovementCallback {
    /// Who registered it.
    pub subscriber: String,
    /// Fire only once the position is at least this far from where the
    /// callback last fired. Zero fires on every change.
    pub min_distance: f64,
    anchor: Vec3,
    listener: Arc<dyn PositionListener>,
}

impl MovementCallback {
    /// Fire on every change.
    pub fn new(subscriber: impl Into<String>, listener: Arc<dyn PositionListener>) -> Self {
        Self {
            subscriber: subscriber.into(),
            min_distance: 0.0,
            anchor: Vec3::ZERO,
            listener,
        }
    }

    /// Only fire after moving `distance` units.
    pub fn with_min_distance(mut self, distance: f64) -> Self {
        self.min_distance = distance;
        self
    }

    /// The listener handle.
    pub fn listener(&self) -> &Arc<dyn PositionListener> {
        &self.listener
    }

    /// Coordinates when this callback last fired.
    pub fn anchor(&self) -> Vec3 {
        self.anchor
    }
}

impl fmt::Debug for MovementCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MovementCallback")
            .field("subscriber", &self.subscriber)
            .field("min_distance", &self.min_distance)
            .field("anchor", &self.anchor)
            .finish_non_exhaustive()
    }
}

/// Which threshold crossings a proximity callback reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProximityTrigger {
    /// Moving into range.
    Entered,
    /// Moving out of range.
    Left,
    /// Either direction.
    Crossed,
}

/// A proximity subscription.
#[derive(Clone)]
pub struct ProximityCallback {
    /// Who registered it.
    pub subscriber: String,
    /// Position to measure against.
    pub target: PositionId,
    /// Range threshold.
    pub distance: f64,
    /// Which crossings to report.
    pub trigger: ProximityTrigger,
    within: bool,
    listener: Arc<dyn PositionListener>,
}

impl ProximityCallback {
    /// Report `trigger` crossings of `distance` around `target`.
    ///
    /// A fresh callback treats the target as out of range, so a position
    /// that is already close reports `Entered` on its first evaluation.
    pub fn new(
        subscriber: impl Into<String>,
        target: PositionId,
        distance: f64,
        trigger: ProximityTrigger,
        listener: Arc<dyn PositionListener>,
    ) -> Self {
        Self {
            subscriber: subscriber.into(),
            target,
            distance,
            trigger,
            within: false,
            listener,
        }
    }

    /// The listener handle.
    pub fn listener(&self) -> &Arc<dyn PositionListener> {
        &self.listener
    }

    /// Update the in-range flag. Returns `Some(entered)` if the crossing
    /// matches the trigger.
    fn observe(&mut self, distance: f64) -> Option<bool> {
        let within = distance <= self.distance;
        if within == self.within {
            return None;
        }
        self.within = within;
        match self.trigger {
            ProximityTrigger::Crossed => Some(within),
            ProximityTrigger::Entered if within => Some(true),
            ProximityTrigger::Left if !within => Some(false),
            _ => None,
        }
    }
}

impl fmt::Debug for ProximityCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProximityCallback")
            .field("subscriber", &self.subscriber)
            .field("target", &self.target)
            .field("distance", &self.distance)
            .field("trigger", &self.trigger)
            .field("within", &self.within)
            .finish_non_exhaustive()
    }
}

/// A proximity callback that fired this tick.
#[derive(Clone, Debug)]
pub struct ProximityHit {
    /// The callback (cloned; cheap, the listener is shared).
    pub callback: ProximityCallback,
    /// Distance at evaluation time.
    pub distance: f64,
    /// True if entering range.
    pub entered: bool,
}

/// Spatial record tracked by the runner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Position {
    /// Identity.
    pub id: PositionId,
    /// Parent frame, if any.
    pub parent_id: Option<PositionId>,
    state: Kinematics,
    rule: MotionRule,
    #[serde(skip)]
    movement_callbacks: SmallVec<[MovementCallback; 2]>,
    #[serde(skip)]
    proximity_callbacks: SmallVec<[ProximityCallback; 2]>,
}

impl Position {
    /// A stationary position at the origin facing +Z.
    pub fn new(id: PositionId) -> Self {
        Self {
            id,
            parent_id: None,
            state: Kinematics::default(),
            rule: MotionRule::Stationary,
            movement_callbacks: SmallVec::new(),
            proximity_callbacks: SmallVec::new(),
        }
    }

    /// Place at `coords`.
    pub fn at(mut self, coords: Vec3) -> Self {
        self.state.coords = coords;
        self
    }

    /// Set the parent frame.
    pub fn with_parent(mut self, parent: PositionId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    /// Face `orientation` (normalized here).
    pub fn with_orientation(mut self, orientation: Vec3) -> Result<Self, MotionError> {
        self.state.orientation = orientation
            .normalize()
            .ok_or_else(|| MotionError::invalid("orientation", "must be non-zero"))?;
        Ok(self)
    }

    /// Assign a rule, validating it first.
    pub fn with_rule(mut self, rule: impl Into<MotionRule>) -> Result<Self, MotionError> {
        self.set_rule(rule)?;
        Ok(self)
    }

    /// Current coordinates.
    pub fn coords(&self) -> Vec3 {
        self.state.coords
    }

    /// Current unit orientation.
    pub fn orientation(&self) -> Vec3 {
        self.state.orientation
    }

    /// Distance moved under the current rule.
    pub fn distance_moved(&self) -> f64 {
        self.state.distance_moved
    }

    /// Radians rotated under the current rule.
    pub fn angle_rotated(&self) -> f64 {
        self.state.angle_rotated
    }

    /// Full kinematic state.
    pub fn state(&self) -> &Kinematics {
        &self.state
    }

    /// The assigned rule.
    pub fn rule(&self) -> &MotionRule {
        &self.rule
    }

    /// Replace the rule. An invalid rule is rejected and the previous one
    /// is kept. Accumulated distance and angle restart from zero, since
    /// stop conditions are measured from the moment of assignment.
    pub fn set_rule(&mut self, rule: impl Into<MotionRule>) -> Result<(), MotionError> {
        let rule = rule.into();
        rule.validate()?;
        self.rule = rule;
        self.state.distance_moved = 0.0;
        self.state.angle_rotated = 0.0;
        Ok(())
    }

    /// True once the rule reports it has nothing left to do.
    pub fn has_terminated(&self) -> bool {
        self.rule.has_terminated(&self.state)
    }

    /// Jump to `coords` without moving through the space between. Movement
    /// callback anchors are reset so the next notification reports
    /// motion from the new spot.
    pub fn teleport(&mut self, coords: Vec3) -> Result<(), MotionError> {
        if !coords.is_finite() {
            return Err(MotionError::NonFinite { id: self.id });
        }
        self.state.coords = coords;
        for cb in &mut self.movement_callbacks {
            cb.anchor = coords;
        }
        Ok(())
    }

    /// Advance by `elapsed` seconds. On error the position is left as it
    /// was before the call.
    pub fn advance(
        &mut self,
        elapsed: f64,
        targets: &dyn TargetLookup,
    ) -> Result<bool, MotionError> {
        let before = self.state;
        let rule_before = self.rule.clone();
        let changed = match self.rule.advance(&mut self.state, elapsed, targets) {
            Ok(changed) => changed,
            Err(e) => {
                self.state = before;
                self.rule = rule_before;
                return Err(e);
            }
        };
        if !self.state.coords.is_finite() || !self.state.orientation.is_finite() {
            self.state = before;
            self.rule = rule_before;
            return Err(MotionError::NonFinite { id: self.id });
        }
        Ok(changed)
    }

    // ── Callbacks ────────────────────────────────────────────────

    /// Subscribe to movement. The callback's anchor starts at the current
    /// coordinates.
    pub fn add_movement_callback(&mut self, mut callback: MovementCallback) {
        callback.anchor = self.state.coords;
        self.movement_callbacks.push(callback);
    }

    /// Subscribe to proximity crossings.
    pub fn add_proximity_callback(&mut self, callback: ProximityCallback) {
        self.proximity_callbacks.push(callback);
    }

    /// Registered movement callbacks in order.
    pub fn movement_callbacks(&self) -> &[MovementCallback] {
        &self.movement_callbacks
    }

    /// Registered proximity callbacks in order.
    pub fn proximity_callbacks(&self) -> &[ProximityCallback] {
        &self.proximity_callbacks
    }

    /// Drop `subscriber`'s movement callbacks. Returns the count removed.
    pub fn remove_movement_callbacks_for(&mut self, subscriber: &str) -> usize {
        let before = self.movement_callbacks.len();
        self.movement_callbacks.retain(|cb| cb.subscriber != subscriber);
        before - self.movement_callbacks.len()
    }

    /// Drop `subscriber`'s proximity callbacks. Returns the count removed.
    pub fn remove_proximity_callbacks_for(&mut self, subscriber: &str) -> usize {
        let before = self.proximity_callbacks.len();
        self.proximity_callbacks.retain(|cb| cb.subscriber != subscriber);
        before - self.proximity_callbacks.len()
    }

    /// Movement callbacks due after a change, as `(callback, previous)`.
    /// Anchors of the returned callbacks move to the current coordinates.
    pub fn due_movement_callbacks(&mut self) -> Vec<(MovementCallback, Vec3)> {
        let coords = self.state.coords;
        let mut due = Vec::new();
        for cb in &mut self.movement_callbacks {
            if coords.distance(cb.anchor) >= cb.min_distance {
                let previous = cb.anchor;
                cb.anchor = coords;
                due.push((cb.clone(), previous));
            }
        }
        due
    }

    /// Evaluate every proximity callback against `targets` and return the
    /// ones whose threshold crossing matches their trigger. Callbacks
    /// whose target is not tracked are left untouched.
    pub fn due_proximity_callbacks(&mut self, targets: &dyn TargetLookup) -> Vec<ProximityHit> {
        let coords = self.state.coords;
        let mut hits = Vec::new();
        for cb in &mut self.proximity_callbacks {
            let Some(target) = targets.coordinates_of(cb.target) else {
                continue;
            };
            let distance = coords.distance(target);
            if let Some(entered) = cb.observe(distance) {
                hits.push(ProximityHit {
                    callback: cb.clone(),
                    distance,
                    entered,
                });
            }
        }
        hits
    }
}
