//! Test utilities and recording listeners for Stellar development.
//!
//! Listeners here record what they see so tests can assert on delivery
//! order, and can be told to fail or revoke to exercise isolation.
//! [`fixtures`] builds small worlds of ships, stations and deposits.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::HashMap;
use std::sync::Mutex;

use stellar_core::{CallbackError, EntityEvent, EntityListener, EventKind, PositionId, Vec3};
use stellar_engine::AttributeSink;
use stellar_motion::{PositionEvent, PositionListener};

/// What a recording listener answers with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Reply {
    #[default]
    Ok,
    /// `CallbackError::Failed`.
    Fail,
    /// `CallbackError::Revoked` for this subscriber.
    Revoke(String),
}

impl Reply {
    fn result(&self) -> Result<(), CallbackError> {
        match self {
            Self::Ok => Ok(()),
            Self::Fail => Err(CallbackError::Failed {
                reason: "recording listener told to fail".into(),
            }),
            Self::Revoke(subscriber) => Err(CallbackError::Revoked {
                subscriber: subscriber.clone(),
            }),
        }
    }
}

// ── Position listener ──────────────────────────────────────────────

/// Owned copy of a [`PositionEvent`].
#[derive(Clone, Debug, PartialEq)]
pub enum PositionRecord {
    Moved {
        id: PositionId,
        coords: Vec3,
        previous: Vec3,
    },
    Proximity {
        id: PositionId,
        target: PositionId,
        entered: bool,
    },
    Stopped {
        id: PositionId,
        coords: Vec3,
    },
}

/// Records every position event it receives.
#[derive(Debug, Default)]
pub struct RecordingPositionListener {
    records: Mutex<Vec<PositionRecord>>,
    reply: Reply,
}

impl RecordingPositionListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record, then answer with `reply`.
    pub fn replying(reply: Reply) -> Self {
        Self {
            records: Mutex::default(),
            reply,
        }
    }

    pub fn records(&self) -> Vec<PositionRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `Stopped` records.
    pub fn stops(&self) -> usize {
        self.records()
            .iter()
            .filter(|r| matches!(r, PositionRecord::Stopped { .. }))
            .count()
    }
}

impl PositionListener for RecordingPositionListener {
    fn notify(&self, event: &PositionEvent<'_>) -> Result<(), CallbackError> {
        let record = match event {
            PositionEvent::Moved { position, previous } => PositionRecord::Moved {
                id: position.id,
                coords: position.coords(),
                previous: *previous,
            },
            PositionEvent::Proximity {
                position,
                target,
                entered,
                ..
            } => PositionRecord::Proximity {
                id: position.id,
                target: *target,
                entered: *entered,
            },
            PositionEvent::Stopped { position } => PositionRecord::Stopped {
                id: position.id,
                coords: position.coords(),
            },
        };
        self.records.lock().unwrap().push(record);
        self.reply.result()
    }
}

// ── Entity listener ────────────────────────────────────────────────

/// Records every entity event it receives.
#[derive(Debug, Default)]
pub struct RecordingEntityListener {
    events: Mutex<Vec<EntityEvent>>,
    reply: Reply,
}

impl RecordingEntityListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying(reply: Reply) -> Self {
        Self {
            events: Mutex::default(),
            reply,
        }
    }

    pub fn events(&self) -> Vec<EntityEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    /// How many events of `kind` arrived.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl EntityListener for RecordingEntityListener {
    fn on_event(&self, event: &EntityEvent) -> Result<(), CallbackError> {
        self.events.lock().unwrap().push(event.clone());
        self.reply.result()
    }
}

// ── Attribute sink ─────────────────────────────────────────────────

/// In-memory [`AttributeSink`] keyed by `(user, attribute)`.
#[derive(Debug, Default)]
pub struct RecordingAttributes {
    counts: Mutex<HashMap<(String, String), u64>>,
}

impl RecordingAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user: &str, attribute: &str) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .get(&(user.to_owned(), attribute.to_owned()))
            .copied()
            .unwrap_or(0)
    }
}

impl AttributeSink for RecordingAttributes {
    fn increment(&self, user: &str, attribute: &str, by: u64) {
        *self
            .counts
            .lock()
            .unwrap()
            .entry((user.to_owned(), attribute.to_owned()))
            .or_default() += by;
    }
}
