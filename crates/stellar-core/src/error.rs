//! Error types for the Stellar simulation backend.
//!
//! Organized by subsystem: motion rules, the position runner, the entity
//! registry, periodic commands, and listener callbacks.

use std::error::Error;
use std::fmt;

use crate::id::{CommandId, EntityId, PositionId};

/// Errors from motion rule validation and advancement.
#[derive(Clone, Debug, PartialEq)]
pub enum MotionError {
    /// A rule's parameters failed validation. The rule is rejected at
    /// assignment time and the position keeps its previous rule.
    InvalidParameter {
        /// Name of the rule variant.
        rule: &'static str,
        /// What was wrong with it.
        reason: String,
    },
    /// A follow rule's target is not tracked.
    TargetMissing {
        /// The missing target.
        target: PositionId,
    },
    /// An advance produced a NaN or infinite coordinate.
    NonFinite {
        /// The position that was being advanced.
        id: PositionId,
    },
}

impl MotionError {
    /// Shorthand for [`MotionError::InvalidParameter`].
    pub fn invalid(rule: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            rule,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter { rule, reason } => {
                write!(f, "invalid {rule} motion rule: {reason}")
            }
            Self::TargetMissing { target } => write!(f, "follow target {target} is not tracked"),
            Self::NonFinite { id } => write!(f, "position {id} advanced to a non-finite value"),
        }
    }
}

impl Error for MotionError {}

/// Errors from the position runner.
#[derive(Clone, Debug, PartialEq)]
pub enum RunnerError {
    /// A position with this id is already tracked.
    AlreadyTracked {
        /// The colliding id.
        id: PositionId,
    },
    /// No tracked position has this id.
    NotFound {
        /// The requested id.
        id: PositionId,
    },
    /// The supplied motion rule failed validation.
    InvalidMotionRule(MotionError),
    /// The tracked set's lock was poisoned by a panic mid-update.
    /// Unrecoverable; the runner scheduler halts.
    Poisoned,
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyTracked { id } => write!(f, "position {id} is already tracked"),
            Self::NotFound { id } => write!(f, "position {id} not found"),
            Self::InvalidMotionRule(e) => write!(f, "{e}"),
            Self::Poisoned => write!(f, "runner state poisoned"),
        }
    }
}

impl Error for RunnerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidMotionRule(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MotionError> for RunnerError {
    fn from(e: MotionError) -> Self {
        Self::InvalidMotionRule(e)
    }
}

/// Errors from the entity registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// An entity or command with this id already exists.
    DuplicateId {
        /// The colliding id.
        id: String,
    },
    /// Nothing with this id exists.
    NotFound {
        /// The requested id.
        id: String,
    },
    /// The entity exists but is not of the kind the operation needs.
    WrongKind {
        /// The entity.
        id: EntityId,
        /// Kind the operation expected.
        expected: &'static str,
    },
    /// A resource transfer failed validation; nothing was changed.
    TransferRejected {
        /// Why the transfer was refused.
        reason: String,
    },
    /// The registry lock was poisoned by a panic mid-update.
    Poisoned,
}

impl RegistryError {
    /// [`RegistryError::NotFound`] for an entity id.
    pub fn not_found(id: &EntityId) -> Self {
        Self::NotFound { id: id.to_string() }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId { id } => write!(f, "duplicate id '{id}'"),
            Self::NotFound { id } => write!(f, "'{id}' not found"),
            Self::WrongKind { id, expected } => write!(f, "'{id}' is not a {expected}"),
            Self::TransferRejected { reason } => write!(f, "transfer rejected: {reason}"),
            Self::Poisoned => write!(f, "registry state poisoned"),
        }
    }
}

impl Error for RegistryError {}

/// Errors raised by a command hook.
///
/// Hook failures are isolated per command: the scheduler logs them and
/// moves on to the next command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// A hook failed.
    Failed {
        /// The failing command.
        command: CommandId,
        /// Human-readable description.
        reason: String,
    },
    /// A registry lookup inside a hook failed.
    Registry(RegistryError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { command, reason } => write!(f, "command '{command}' failed: {reason}"),
            Self::Registry(e) => write!(f, "registry: {e}"),
        }
    }
}

impl Error for CommandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RegistryError> for CommandError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

/// Errors returned by listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackError {
    /// The listener failed; other listeners still run.
    Failed {
        /// Human-readable description.
        reason: String,
    },
    /// The subscriber no longer holds the privilege to receive this
    /// notification. Its callbacks of the triggered type are removed.
    Revoked {
        /// The subscriber that lost access.
        subscriber: String,
    },
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "callback failed: {reason}"),
            Self::Revoked { subscriber } => write!(f, "subscriber '{subscriber}' revoked"),
        }
    }
}

impl Error for CallbackError {}
