//! Whole-world save and restore.
//!
//! A [`WorldSnapshot`] holds every tracked position (rule parameters,
//! accumulated distance and angle, status), every entity, and every
//! in-flight command with its scheduling state. Listener subscriptions
//! are runtime-only and are not part of it.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use stellar_core::{RegistryError, RunnerError};

use crate::command::CommandRecord;
use crate::entity::Entity;
use crate::runner::Tracked;

/// Serializable state of a whole simulation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Tracked positions in registration order.
    pub positions: Vec<Tracked>,
    /// Entities in creation order.
    pub entities: Vec<Entity>,
    /// Persistable commands in scheduling order.
    pub commands: Vec<CommandRecord>,
}

impl WorldSnapshot {
    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String, PersistError> {
        serde_json::to_string(self).map_err(|e| PersistError::Encode {
            reason: e.to_string(),
        })
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        serde_json::from_str(json).map_err(|e| PersistError::Decode {
            reason: e.to_string(),
        })
    }

    /// True if there is nothing to restore.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.entities.is_empty() && self.commands.is_empty()
    }
}

/// Errors from saving or restoring a simulation.
#[derive(Clone, Debug, PartialEq)]
pub enum PersistError {
    /// Serialization failed.
    Encode {
        /// Serializer message.
        reason: String,
    },
    /// The input is not a valid snapshot.
    Decode {
        /// Parser message.
        reason: String,
    },
    /// The simulation cannot accept this snapshot as it stands.
    Conflict {
        /// What is in the way.
        reason: String,
    },
    /// Reading or rebuilding the position runner failed.
    Runner(RunnerError),
    /// Reading or rebuilding the registry failed.
    Registry(RegistryError),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode { reason } => write!(f, "snapshot encode failed: {reason}"),
            Self::Decode { reason } => write!(f, "snapshot decode failed: {reason}"),
            Self::Conflict { reason } => write!(f, "cannot restore: {reason}"),
            Self::Runner(e) => write!(f, "runner: {e}"),
            Self::Registry(e) => write!(f, "registry: {e}"),
        }
    }
}

impl Error for PersistError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Runner(e) => Some(e),
            Self::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RunnerError> for PersistError {
    fn from(e: RunnerError) -> Self {
        Self::Runner(e)
    }
}

impl From<RegistryError> for PersistError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}
