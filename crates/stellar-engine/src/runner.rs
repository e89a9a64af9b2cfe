//! The position runner: owns every tracked [`Position`] and advances
//! them each tick.
//!
//! All state sits behind one mutex. A tick holds it while advancing
//! positions and working out which callbacks are due, releases it to
//! invoke listeners, then relocks briefly to drop revoked callbacks.
//! Listeners therefore see a consistent snapshot and may call back into
//! the runner without deadlocking.
//!
//! Positions are processed in registration order ([`IndexMap`]), so runs
//! are reproducible.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stellar_core::{CallbackError, MotionError, PositionId, RunnerError, Vec3};
use stellar_motion::{
    MotionRule, MovementCallback, Position, PositionEvent, ProximityCallback, ProximityHit,
};

use crate::seams::Locations;

/// Per-position state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionStatus {
    /// Advanced every tick.
    #[default]
    Active,
    /// Rule terminated or explicitly stopped. Re-armed by a new rule.
    Stopped,
}

/// A tracked position and its status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tracked {
    /// The position.
    pub position: Position,
    /// Where it is in the Active/Stopped cycle.
    pub status: MotionStatus,
}

/// What one [`Runner::tick`] did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    /// Active positions advanced without error.
    pub advanced: usize,
    /// Positions whose coordinates or orientation changed.
    pub moved: usize,
    /// Positions that transitioned to Stopped this tick.
    pub stopped: Vec<PositionId>,
    /// Positions skipped because their advance failed.
    pub failed: Vec<(PositionId, MotionError)>,
    /// Listener invocations that returned `Ok`.
    pub notified: usize,
    /// Listener invocations that returned [`CallbackError::Failed`].
    pub callback_failures: usize,
    /// Callbacks removed after their subscriber was revoked.
    pub revoked: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CallbackKind {
    Movement,
    Proximity,
}

enum Notice {
    Moved {
        callback: MovementCallback,
        previous: Vec3,
    },
    Proximity(ProximityHit),
    Stopped(MovementCallback),
}

/// Notices for one position, with the snapshot listeners will see.
struct Batch {
    position: Position,
    notices: Vec<Notice>,
}

struct Revocation {
    id: PositionId,
    kind: CallbackKind,
    subscriber: String,
}

/// Shared handle to the tracked set. Clones refer to the same positions.
#[derive(Clone, Default)]
pub struct Runner {
    inner: Arc<Mutex<IndexMap<PositionId, Tracked>>>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner").field("tracked", &self.len()).finish()
    }
}

impl Runner {
    /// An empty runner.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, IndexMap<PositionId, Tracked>>, RunnerError> {
        self.inner.lock().map_err(|_| RunnerError::Poisoned)
    }

    // ── Tracking ─────────────────────────────────────────────────

    /// Start tracking `position` as Active.
    pub fn track(&self, position: Position) -> Result<(), RunnerError> {
        position.rule().validate()?;
        let mut tracked = self.lock()?;
        if tracked.contains_key(&position.id) {
            return Err(RunnerError::AlreadyTracked { id: position.id });
        }
        tracing::debug!(id = %position.id, rule = position.rule().name(), "tracking position");
        tracked.insert(
            position.id,
            Tracked {
                position,
                status: MotionStatus::Active,
            },
        );
        Ok(())
    }

    /// Stop tracking `id`. Absent ids are a no-op. Returns the removed
    /// position, if any.
    pub fn untrack(&self, id: PositionId) -> Result<Option<Position>, RunnerError> {
        let removed = self.lock()?.shift_remove(&id).map(|t| t.position);
        if removed.is_some() {
            tracing::debug!(%id, "untracked position");
        }
        Ok(removed)
    }

    /// Snapshot of a tracked position.
    pub fn get(&self, id: PositionId) -> Result<Position, RunnerError> {
        self.lock()?
            .get(&id)
            .map(|t| t.position.clone())
            .ok_or(RunnerError::NotFound { id })
    }

    /// Status of a tracked position.
    pub fn status(&self, id: PositionId) -> Result<MotionStatus, RunnerError> {
        self.lock()?
            .get(&id)
            .map(|t| t.status)
            .ok_or(RunnerError::NotFound { id })
    }

    /// True if `id` is tracked.
    pub fn contains(&self, id: PositionId) -> bool {
        self.lock().is_ok_and(|t| t.contains_key(&id))
    }

    /// Number of tracked positions.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |t| t.len())
    }

    /// True if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked ids in registration order.
    pub fn ids(&self) -> Result<Vec<PositionId>, RunnerError> {
        Ok(self.lock()?.keys().copied().collect())
    }

    // ── Mutation ─────────────────────────────────────────────────

    fn with_tracked<T>(
        &self,
        id: PositionId,
        f: impl FnOnce(&mut Tracked) -> Result<T, RunnerError>,
    ) -> Result<T, RunnerError> {
        let mut tracked = self.lock()?;
        let slot = tracked.get_mut(&id).ok_or(RunnerError::NotFound { id })?;
        f(slot)
    }

    /// Assign a new rule and re-arm the position. An invalid rule is
    /// rejected and the previous one kept.
    pub fn set_rule(&self, id: PositionId, rule: impl Into<MotionRule>) -> Result<(), RunnerError> {
        let rule = rule.into();
        self.with_tracked(id, |t| {
            t.position.set_rule(rule)?;
            t.status = MotionStatus::Active;
            tracing::debug!(%id, rule = t.position.rule().name(), "motion rule assigned");
            Ok(())
        })
    }

    /// Move `id` to `coords`. The position is halted, moved, and re-armed
    /// with its current rule inside one critical section, so no tick
    /// observes the intermediate state.
    pub fn teleport(&self, id: PositionId, coords: Vec3) -> Result<(), RunnerError> {
        self.with_tracked(id, |t| {
            let resume = t.status;
            t.status = MotionStatus::Stopped;
            if let Err(e) = t.position.teleport(coords) {
                t.status = resume;
                return Err(e.into());
            }
            if !t.position.has_terminated() {
                t.status = MotionStatus::Active;
            }
            Ok(())
        })
    }

    /// Transition `id` to Stopped and notify its movement listeners.
    /// Stopping an already stopped position does nothing.
    pub fn stop(&self, id: PositionId) -> Result<TickReport, RunnerError> {
        let batch = self.with_tracked(id, |t| {
            if t.status == MotionStatus::Stopped {
                return Ok(None);
            }
            t.status = MotionStatus::Stopped;
            let notices = t
                .position
                .movement_callbacks()
                .iter()
                .cloned()
                .map(Notice::Stopped)
                .collect();
            Ok(Some(Batch {
                position: t.position.clone(),
                notices,
            }))
        })?;
        let mut report = TickReport::default();
        if let Some(batch) = batch {
            report.stopped.push(id);
            let revocations = deliver(vec![batch], &mut report);
            report.revoked = self.apply_revocations(revocations)?;
        }
        Ok(report)
    }

    /// Subscribe to movement (and stop) notifications for `id`.
    pub fn add_movement_callback(
        &self,
        id: PositionId,
        callback: MovementCallback,
    ) -> Result<(), RunnerError> {
        self.with_tracked(id, |t| {
            t.position.add_movement_callback(callback);
            Ok(())
        })
    }

    /// Subscribe to proximity crossings for `id`.
    pub fn add_proximity_callback(
        &self,
        id: PositionId,
        callback: ProximityCallback,
    ) -> Result<(), RunnerError> {
        self.with_tracked(id, |t| {
            t.position.add_proximity_callback(callback);
            Ok(())
        })
    }

    /// Drop every callback `subscriber` registered on `id`.
    pub fn remove_callbacks_for(
        &self,
        id: PositionId,
        subscriber: &str,
    ) -> Result<usize, RunnerError> {
        self.with_tracked(id, |t| {
            Ok(t.position.remove_movement_callbacks_for(subscriber)
                + t.position.remove_proximity_callbacks_for(subscriber))
        })
    }

    // ── Tick ─────────────────────────────────────────────────────

    /// Advance every Active position by `elapsed` seconds, then deliver
    /// movement, proximity and stop notifications.
    ///
    /// A failing advance skips that position for the rest of the tick.
    /// A failing listener is logged and the others still run. The only
    /// error returned is [`RunnerError::Poisoned`].
    pub fn tick(&self, elapsed: f64) -> Result<TickReport, RunnerError> {
        let mut report = TickReport::default();
        let batches = {
            let mut tracked = self.lock()?;
            let start = coordinates(&tracked);

            // Rules that chase a target see where it was at the start of
            // the tick, so the outcome does not depend on registration order.
            let mut pending: Vec<Option<Vec<Notice>>> = Vec::with_capacity(tracked.len());
            for (id, t) in tracked.iter_mut() {
                let mut notices = Vec::new();
                if t.status == MotionStatus::Active {
                    match t.position.advance(elapsed, &start) {
                        Ok(changed) => {
                            report.advanced += 1;
                            if changed {
                                report.moved += 1;
                                notices.extend(t.position.due_movement_callbacks().into_iter().map(
                                    |(callback, previous)| Notice::Moved { callback, previous },
                                ));
                            }
                        }
                        Err(e) => {
                            tracing::warn!(%id, error = %e, "advance failed; position skipped");
                            report.failed.push((*id, e));
                            pending.push(None);
                            continue;
                        }
                    }
                }
                pending.push(Some(notices));
            }

            // Proximity compares positions at the same instant: after every advance.
            let current = coordinates(&tracked);
            let mut batches = Vec::new();
            for ((id, t), notices) in tracked.iter_mut().zip(pending) {
                let Some(mut notices) = notices else {
                    continue;
                };
                notices.extend(
                    t.position
                        .due_proximity_callbacks(&current)
                        .into_iter()
                        .map(Notice::Proximity),
                );

                if t.status == MotionStatus::Active && t.position.has_terminated() {
                    t.status = MotionStatus::Stopped;
                    report.stopped.push(*id);
                    tracing::debug!(%id, "motion terminated");
                    notices.extend(
                        t.position
                            .movement_callbacks()
                            .iter()
                            .cloned()
                            .map(Notice::Stopped),
                    );
                }

                if !notices.is_empty() {
                    batches.push(Batch {
                        position: t.position.clone(),
                        notices,
                    });
                }
            }
            batches
        };

        let revocations = deliver(batches, &mut report);
        report.revoked = self.apply_revocations(revocations)?;
        tracing::trace!(
            advanced = report.advanced,
            moved = report.moved,
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            "runner tick"
        );
        Ok(report)
    }

    fn apply_revocations(&self, revocations: Vec<Revocation>) -> Result<usize, RunnerError> {
        if revocations.is_empty() {
            return Ok(0);
        }
        let mut tracked = self.lock()?;
        let mut removed = 0;
        for r in revocations {
            let Some(t) = tracked.get_mut(&r.id) else {
                continue;
            };
            removed += match r.kind {
                CallbackKind::Movement => t.position.remove_movement_callbacks_for(&r.subscriber),
                CallbackKind::Proximity => t.position.remove_proximity_callbacks_for(&r.subscriber),
            };
        }
        Ok(removed)
    }

    // ── Persistence ──────────────────────────────────────────────

    /// Every tracked position and status in registration order.
    pub fn snapshot(&self) -> Result<Vec<Tracked>, RunnerError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    /// Replace the tracked set with `tracked`. Fails without changing
    /// anything if an id repeats or a rule is invalid.
    pub fn restore(&self, tracked: Vec<Tracked>) -> Result<(), RunnerError> {
        let mut rebuilt = IndexMap::with_capacity(tracked.len());
        for t in tracked {
            t.position.rule().validate()?;
            let id = t.position.id;
            if rebuilt.insert(id, t).is_some() {
                return Err(RunnerError::AlreadyTracked { id });
            }
        }
        *self.lock()? = rebuilt;
        Ok(())
    }
}

fn coordinates(tracked: &IndexMap<PositionId, Tracked>) -> HashMap<PositionId, Vec3> {
    tracked
        .iter()
        .map(|(id, t)| (*id, t.position.coords()))
        .collect()
}

impl Locations for Runner {
    fn coordinates_of(&self, id: PositionId) -> Option<Vec3> {
        self.lock().ok()?.get(&id).map(|t| t.position.coords())
    }

    fn halt(&self, id: PositionId) {
        match self.set_rule(id, MotionRule::Stationary) {
            Ok(()) | Err(RunnerError::NotFound { .. }) => {}
            Err(e) => tracing::warn!(%id, error = %e, "failed to halt position"),
        }
    }

    fn release(&self, id: PositionId) {
        if let Err(e) = self.untrack(id) {
            tracing::warn!(%id, error = %e, "failed to release position");
        }
    }
}

fn deliver(batches: Vec<Batch>, report: &mut TickReport) -> Vec<Revocation> {
    let mut revocations: Vec<Revocation> = Vec::new();
    for batch in batches {
        let position = &batch.position;
        for notice in batch.notices {
            let (kind, subscriber, result) = match &notice {
                Notice::Moved { callback, previous } => (
                    CallbackKind::Movement,
                    &callback.subscriber,
                    callback.listener().notify(&PositionEvent::Moved {
                        position,
                        previous: *previous,
                    }),
                ),
                Notice::Proximity(hit) => (
                    CallbackKind::Proximity,
                    &hit.callback.subscriber,
                    hit.callback.listener().notify(&PositionEvent::Proximity {
                        position,
                        target: hit.callback.target,
                        distance: hit.distance,
                        entered: hit.entered,
                    }),
                ),
                Notice::Stopped(callback) => (
                    CallbackKind::Movement,
                    &callback.subscriber,
                    callback.listener().notify(&PositionEvent::Stopped { position }),
                ),
            };
            match result {
                Ok(()) => report.notified += 1,
                Err(CallbackError::Revoked { subscriber }) => {
                    tracing::info!(
                        id = %position.id,
                        %subscriber,
                        ?kind,
                        "subscriber revoked; dropping its callbacks of this type"
                    );
                    let seen = revocations.iter().any(|r| {
                        r.id == position.id && r.kind == kind && r.subscriber == subscriber
                    });
                    if !seen {
                        revocations.push(Revocation {
                            id: position.id,
                            kind,
                            subscriber,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        id = %position.id,
                        %subscriber,
                        error = %e,
                        "position listener failed"
                    );
                    report.callback_failures += 1;
                }
            }
        }
    }
    revocations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use stellar_motion::{Linear, ProximityTrigger, Rotation};

    #[derive(Default)]
    struct Log {
        events: StdMutex<Vec<String>>,
        reply: StdMutex<Option<CallbackError>>,
    }

    impl stellar_motion::PositionListener for Log {
        fn notify(&self, event: &PositionEvent<'_>) -> Result<(), CallbackError> {
            let line = match event {
                PositionEvent::Moved { position, previous } => {
                    format!("moved {} from {}", position.coords().x, previous.x)
                }
                PositionEvent::Proximity { entered, .. } => format!("proximity {entered}"),
                PositionEvent::Stopped { position } => format!("stopped {}", position.id),
            };
            self.events.lock().unwrap().push(line);
            match self.reply.lock().unwrap().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    #[derive(Default)]
    struct Ranges(StdMutex<Vec<(bool, f64)>>);

    impl stellar_motion::PositionListener for Ranges {
        fn notify(&self, event: &PositionEvent<'_>) -> Result<(), CallbackError> {
            if let PositionEvent::Proximity {
                distance, entered, ..
            } = event
            {
                self.0.lock().unwrap().push((*entered, *distance));
            }
            Ok(())
        }
    }

    fn linear(id: u64, speed: f64) -> Position {
        Position::new(PositionId(id))
            .with_rule(Linear::new(Vec3::X, speed).unwrap())
            .unwrap()
    }

    // ── Tracking ─────────────────────────────────────────────────

    #[test]
    fn duplicate_track_rejected() {
        let runner = Runner::new();
        runner.track(linear(1, 1.0)).unwrap();
        assert_eq!(
            runner.track(linear(1, 2.0)),
            Err(RunnerError::AlreadyTracked { id: PositionId(1) })
        );
    }

    #[test]
    fn untrack_is_idempotent() {
        let runner = Runner::new();
        runner.track(linear(1, 1.0)).unwrap();
        assert!(runner.untrack(PositionId(1)).unwrap().is_some());
        assert!(runner.untrack(PositionId(1)).unwrap().is_none());
        assert!(runner.is_empty());
    }

    #[test]
    fn untrack_preserves_order() {
        let runner = Runner::new();
        for id in 1..=4 {
            runner.track(linear(id, 1.0)).unwrap();
        }
        runner.untrack(PositionId(2)).unwrap();
        assert_eq!(
            runner.ids().unwrap(),
            vec![PositionId(1), PositionId(3), PositionId(4)]
        );
    }

    // ── Tick ─────────────────────────────────────────────────────

    #[test]
    fn stop_distance_stops_and_notifies_once() {
        let runner = Runner::new();
        let p = Position::new(PositionId(1))
            .with_rule(Linear::new(Vec3::X, 10.0).unwrap().with_stop_distance(25.0))
            .unwrap();
        runner.track(p).unwrap();
        let log = Arc::new(Log::default());
        runner
            .add_movement_callback(PositionId(1), MovementCallback::new("s", log.clone()))
            .unwrap();

        for _ in 0..2 {
            assert!(runner.tick(1.0).unwrap().stopped.is_empty());
        }
        let third = runner.tick(1.0).unwrap();
        assert_eq!(third.stopped, vec![PositionId(1)]);
        assert_eq!(runner.status(PositionId(1)).unwrap(), MotionStatus::Stopped);

        let fourth = runner.tick(1.0).unwrap();
        assert_eq!(fourth.advanced, 0);
        assert_eq!(runner.get(PositionId(1)).unwrap().coords().x, 25.0);
        assert_eq!(
            *log.events.lock().unwrap(),
            vec![
                "moved 10 from 0",
                "moved 20 from 10",
                "moved 25 from 20",
                "stopped 1"
            ]
        );
    }

    #[test]
    fn new_rule_rearms_stopped_position() {
        let runner = Runner::new();
        runner.track(linear(1, 1.0)).unwrap();
        runner.stop(PositionId(1)).unwrap();
        assert_eq!(runner.tick(1.0).unwrap().advanced, 0);
        runner
            .set_rule(PositionId(1), Linear::new(Vec3::Y, 2.0).unwrap())
            .unwrap();
        assert_eq!(runner.status(PositionId(1)).unwrap(), MotionStatus::Active);
        runner.tick(1.0).unwrap();
        assert_eq!(runner.get(PositionId(1)).unwrap().coords(), Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn invalid_rule_keeps_previous() {
        let runner = Runner::new();
        runner.track(linear(1, 1.0)).unwrap();
        let err = runner
            .set_rule(
                PositionId(1),
                MotionRule::Rotate(Rotation {
                    speed: 9.0,
                    ..Rotation::default()
                }),
            )
            .unwrap_err();
        assert!(matches!(err, RunnerError::InvalidMotionRule(_)));
        assert_eq!(runner.get(PositionId(1)).unwrap().rule().name(), "linear");
    }

    #[test]
    fn failing_advance_skips_only_that_position() {
        let runner = Runner::new();
        let orphan = Position::new(PositionId(1))
            .with_rule(stellar_motion::Follow::new(PositionId(99), 1.0, 1.0).unwrap())
            .unwrap();
        runner.track(orphan).unwrap();
        runner.track(linear(2, 1.0)).unwrap();

        let report = runner.tick(1.0).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, PositionId(1));
        assert_eq!(report.advanced, 1);
        assert_eq!(runner.get(PositionId(2)).unwrap().coords().x, 1.0);
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let runner = Runner::new();
        runner.track(linear(1, 1.0)).unwrap();
        let bad = Arc::new(Log::default());
        *bad.reply.lock().unwrap() = Some(CallbackError::Failed {
            reason: "boom".into(),
        });
        let good = Arc::new(Log::default());
        runner
            .add_movement_callback(PositionId(1), MovementCallback::new("bad", bad))
            .unwrap();
        runner
            .add_movement_callback(PositionId(1), MovementCallback::new("good", good.clone()))
            .unwrap();
        let report = runner.tick(1.0).unwrap();
        assert_eq!(report.callback_failures, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(good.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn revocation_drops_only_triggered_type() {
        let runner = Runner::new();
        runner.track(linear(1, 1.0)).unwrap();
        runner.track(Position::new(PositionId(2)).at(Vec3::new(100.0, 0.0, 0.0))).unwrap();
        let log = Arc::new(Log::default());
        *log.reply.lock().unwrap() = Some(CallbackError::Revoked {
            subscriber: "node".into(),
        });
        runner
            .add_movement_callback(PositionId(1), MovementCallback::new("node", log.clone()))
            .unwrap();
        runner
            .add_proximity_callback(
                PositionId(1),
                ProximityCallback::new(
                    "node",
                    PositionId(2),
                    10.0,
                    ProximityTrigger::Entered,
                    log.clone(),
                ),
            )
            .unwrap();

        let report = runner.tick(1.0).unwrap();
        assert_eq!(report.revoked, 1);
        let p = runner.get(PositionId(1)).unwrap();
        assert!(p.movement_callbacks().is_empty());
        assert_eq!(p.proximity_callbacks().len(), 1);
    }

    #[test]
    fn proximity_fires_on_crossing() {
        let runner = Runner::new();
        runner.track(linear(1, 1.0)).unwrap();
        runner.track(Position::new(PositionId(2)).at(Vec3::new(5.0, 0.0, 0.0))).unwrap();
        let log = Arc::new(Log::default());
        runner
            .add_proximity_callback(
                PositionId(1),
                ProximityCallback::new(
                    "s",
                    PositionId(2),
                    2.0,
                    ProximityTrigger::Crossed,
                    log.clone(),
                ),
            )
            .unwrap();
        for _ in 0..10 {
            runner.tick(1.0).unwrap();
        }
        assert_eq!(
            *log.events.lock().unwrap(),
            vec!["proximity true", "proximity false"]
        );
    }

    #[test]
    fn proximity_uses_target_after_its_advance() {
        let runner = Runner::new();
        runner.track(Position::new(PositionId(1))).unwrap();
        let inbound = Linear::new(Vec3::new(-1.0, 0.0, 0.0), 10.0).unwrap();
        runner
            .track(
                Position::new(PositionId(2))
                    .at(Vec3::new(30.0, 0.0, 0.0))
                    .with_rule(inbound)
                    .unwrap(),
            )
            .unwrap();
        let ranges = Arc::new(Ranges::default());
        runner
            .add_proximity_callback(
                PositionId(1),
                ProximityCallback::new(
                    "s",
                    PositionId(2),
                    5.0,
                    ProximityTrigger::Crossed,
                    ranges.clone(),
                ),
            )
            .unwrap();

        // Target at 20, 10, then 0.
        for _ in 0..3 {
            runner.tick(1.0).unwrap();
        }
        assert_eq!(*ranges.0.lock().unwrap(), vec![(true, 0.0)]);

        runner.tick(1.0).unwrap();
        assert_eq!(*ranges.0.lock().unwrap(), vec![(true, 0.0), (false, 10.0)]);
    }

    #[test]
    fn proximity_ignores_target_start_of_tick() {
        let runner = Runner::new();
        runner.track(Position::new(PositionId(1))).unwrap();
        runner.track(linear(2, 10.0)).unwrap();
        let ranges = Arc::new(Ranges::default());
        runner
            .add_proximity_callback(
                PositionId(1),
                ProximityCallback::new(
                    "s",
                    PositionId(2),
                    5.0,
                    ProximityTrigger::Crossed,
                    ranges.clone(),
                ),
            )
            .unwrap();

        // The target leaves the origin within the first tick.
        runner.tick(1.0).unwrap();
        assert!(ranges.0.lock().unwrap().is_empty());
    }

    #[test]
    fn release_untracks() {
        let runner = Runner::new();
        runner.track(linear(1, 1.0)).unwrap();
        runner.release(PositionId(1));
        runner.release(PositionId(1));
        assert!(!runner.contains(PositionId(1)));
    }

    #[test]
    fn teleport_moves_and_rearms() {
        let runner = Runner::new();
        runner.track(linear(1, 1.0)).unwrap();
        runner.stop(PositionId(1)).unwrap();
        runner.teleport(PositionId(1), Vec3::new(50.0, 0.0, 0.0)).unwrap();
        assert_eq!(runner.status(PositionId(1)).unwrap(), MotionStatus::Active);
        runner.tick(1.0).unwrap();
        assert_eq!(runner.get(PositionId(1)).unwrap().coords().x, 51.0);
        assert_eq!(
            runner.teleport(PositionId(9), Vec3::ZERO),
            Err(RunnerError::NotFound { id: PositionId(9) })
        );
    }

    #[test]
    fn halt_sets_stationary() {
        let runner = Runner::new();
        runner.track(linear(1, 1.0)).unwrap();
        runner.halt(PositionId(1));
        runner.halt(PositionId(42));
        runner.tick(1.0).unwrap();
        let p = runner.get(PositionId(1)).unwrap();
        assert_eq!(p.rule(), &MotionRule::Stationary);
        assert_eq!(p.coords(), Vec3::ZERO);
    }

    // ── Persistence ──────────────────────────────────────────────

    #[test]
    fn restore_rejects_duplicates_without_change() {
        let runner = Runner::new();
        runner.track(linear(7, 1.0)).unwrap();
        let dup = vec![
            Tracked { position: linear(1, 1.0), status: MotionStatus::Active },
            Tracked { position: linear(1, 1.0), status: MotionStatus::Active },
        ];
        assert!(runner.restore(dup).is_err());
        assert_eq!(runner.ids().unwrap(), vec![PositionId(7)]);
    }
}
