//! Typed entity-event dispatch.
//!
//! Entities keep an [`EventDispatch`] table keyed by [`EventKind`]. Each
//! entry holds [`Subscription`]s: a subscriber name plus a listener handle
//! implementing [`EntityListener`]. Dispatch is ordered (subscription
//! order) and isolates failures: one listener's error never prevents the
//! remaining listeners from running.
//!
//! Dispatch normally happens outside the registry lock. Callers clone the
//! relevant subscriptions with [`EventDispatch::subscriptions`] while
//! holding the lock, release it, then call [`dispatch`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::CallbackError;
use crate::id::EntityId;

/// Named entity events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// The entity launched an attack.
    Attacked,
    /// The entity was hit by an attack.
    Defended,
    /// The entity stopped attacking.
    AttackedStop,
    /// The entity is no longer being attacked.
    DefendedStop,
    /// The entity was destroyed by `other`.
    DestroyedBy,
    /// The entity collected resources from a deposit.
    ResourceCollected,
    /// The entity stopped mining.
    MiningStopped,
    /// The entity transferred resources to `other`.
    TransferredTo,
    /// The entity received resources from `other`.
    TransferredFrom,
}

impl EventKind {
    /// Wire-style name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attacked => "attacked",
            Self::Defended => "defended",
            Self::AttackedStop => "attacked_stop",
            Self::DefendedStop => "defended_stop",
            Self::DestroyedBy => "destroyed_by",
            Self::ResourceCollected => "resource_collected",
            Self::MiningStopped => "mining_stopped",
            Self::TransferredTo => "transferred_to",
            Self::TransferredFrom => "transferred_from",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra data carried by an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventPayload {
    /// Nothing beyond the entities involved.
    None,
    /// A quantity of some material changed hands.
    Resource {
        /// Material identifier.
        material_id: String,
        /// Units moved.
        quantity: u32,
    },
    /// Why something stopped.
    Reason(String),
}

/// A single entity notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityEvent {
    /// What happened.
    pub kind: EventKind,
    /// The entity the event is delivered to.
    pub entity: EntityId,
    /// The counterpart (attacker, defender, transfer peer), if any.
    pub other: Option<EntityId>,
    /// Additional data.
    pub payload: EventPayload,
}

impl EntityEvent {
    /// An event between two entities with no payload.
    pub fn between(kind: EventKind, entity: &EntityId, other: &EntityId) -> Self {
        Self {
            kind,
            entity: entity.clone(),
            other: Some(other.clone()),
            payload: EventPayload::None,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }
}

/// A handle notified of entity events.
pub trait EntityListener: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &EntityEvent) -> Result<(), CallbackError>;
}

/// One registered listener.
#[derive(Clone)]
pub struct Subscription {
    /// Who registered the listener (endpoint, session, or mission id).
    pub subscriber: String,
    listener: Arc<dyn EntityListener>,
}

impl Subscription {
    /// Wrap a listener.
    pub fn new(subscriber: impl Into<String>, listener: Arc<dyn EntityListener>) -> Self {
        Self {
            subscriber: subscriber.into(),
            listener,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subscriber", &self.subscriber)
            .finish_non_exhaustive()
    }
}

/// Per-entity table of listeners keyed by event kind.
#[derive(Clone, Debug, Default)]
pub struct EventDispatch {
    table: IndexMap<EventKind, SmallVec<[Subscription; 2]>>,
}

impl EventDispatch {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind` on behalf of `subscriber`.
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        subscriber: impl Into<String>,
        listener: Arc<dyn EntityListener>,
    ) {
        self.table
            .entry(kind)
            .or_default()
            .push(Subscription::new(subscriber, listener));
    }

    /// Remove `subscriber`'s listeners for a single event kind.
    /// Returns the number removed.
    pub fn remove_kind_for(&mut self, kind: EventKind, subscriber: &str) -> usize {
        let Some(subs) = self.table.get_mut(&kind) else {
            return 0;
        };
        let before = subs.len();
        subs.retain(|s| s.subscriber != subscriber);
        before - subs.len()
    }

    /// Remove every listener registered by `subscriber`.
    /// Returns the number removed.
    pub fn unsubscribe(&mut self, subscriber: &str) -> usize {
        self.table
            .values_mut()
            .map(|subs| {
                let before = subs.len();
                subs.retain(|s| s.subscriber != subscriber);
                before - subs.len()
            })
            .sum()
    }

    /// Clone the subscriptions for `kind` in registration order.
    pub fn subscriptions(&self, kind: EventKind) -> Vec<Subscription> {
        self.table
            .get(&kind)
            .map(|subs| subs.to_vec())
            .unwrap_or_default()
    }

    /// Total number of subscriptions across all kinds.
    pub fn len(&self) -> usize {
        self.table.values().map(|s| s.len()).sum()
    }

    /// True if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one [`dispatch`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned [`CallbackError::Failed`].
    pub failed: usize,
    /// Subscribers that returned [`CallbackError::Revoked`].
    pub revoked: Vec<String>,
}

/// Invoke every subscription in order with `event`.
pub fn dispatch(subscriptions: &[Subscription], event: &EntityEvent) -> DispatchReport {
    let mut report = DispatchReport::default();
    for sub in subscriptions {
        match sub.listener.on_event(event) {
            Ok(()) => report.delivered += 1,
            Err(CallbackError::Revoked { subscriber }) => {
                tracing::info!(
                    event = %event.kind,
                    entity = %event.entity,
                    %subscriber,
                    "subscriber revoked; dropping its callbacks for this event"
                );
                if !report.revoked.contains(&subscriber) {
                    report.revoked.push(subscriber);
                }
            }
            Err(e) => {
                tracing::warn!(
                    event = %event.kind,
                    entity = %event.entity,
                    subscriber = %sub.subscriber,
                    error = %e,
                    "entity listener failed"
                );
                report.failed += 1;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<EventKind>>);

    impl EntityListener for Recorder {
        fn on_event(&self, event: &EntityEvent) -> Result<(), CallbackError> {
            self.0.lock().unwrap().push(event.kind);
            Ok(())
        }
    }

    struct Failing;

    impl EntityListener for Failing {
        fn on_event(&self, _event: &EntityEvent) -> Result<(), CallbackError> {
            Err(CallbackError::Failed {
                reason: "boom".into(),
            })
        }
    }

    struct Revoking;

    impl EntityListener for Revoking {
        fn on_event(&self, _event: &EntityEvent) -> Result<(), CallbackError> {
            Err(CallbackError::Revoked {
                subscriber: "node-b".into(),
            })
        }
    }

    fn event(kind: EventKind) -> EntityEvent {
        EntityEvent::between(kind, &EntityId::from("a"), &EntityId::from("b"))
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let rec = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut table = EventDispatch::new();
        table.subscribe(EventKind::Attacked, "node-a", Arc::new(Failing));
        table.subscribe(EventKind::Attacked, "node-a", rec.clone());

        let report = dispatch(
            &table.subscriptions(EventKind::Attacked),
            &event(EventKind::Attacked),
        );
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(*rec.0.lock().unwrap(), vec![EventKind::Attacked]);
    }

    #[test]
    fn revoked_subscriber_is_reported_once() {
        let mut table = EventDispatch::new();
        table.subscribe(EventKind::Defended, "node-b", Arc::new(Revoking));
        table.subscribe(EventKind::Defended, "node-b", Arc::new(Revoking));
        let report = dispatch(
            &table.subscriptions(EventKind::Defended),
            &event(EventKind::Defended),
        );
        assert_eq!(report.revoked, vec!["node-b".to_string()]);
    }

    #[test]
    fn remove_kind_leaves_other_kinds() {
        let rec = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut table = EventDispatch::new();
        table.subscribe(EventKind::Attacked, "node-a", rec.clone());
        table.subscribe(EventKind::Defended, "node-a", rec.clone());
        table.subscribe(EventKind::Attacked, "node-b", rec);

        assert_eq!(table.remove_kind_for(EventKind::Attacked, "node-a"), 1);
        assert_eq!(table.subscriptions(EventKind::Attacked).len(), 1);
        assert_eq!(table.subscriptions(EventKind::Defended).len(), 1);
        assert_eq!(table.unsubscribe("node-a"), 1);
        assert_eq!(table.len(), 1);
    }
}
