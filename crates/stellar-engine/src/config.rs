//! Scheduler configuration, validation, and error types.
//!
//! [`SimulationConfig`] is checked with [`validate()`](SimulationConfig::validate)
//! before any background thread is spawned.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── SchedulerConfig ────────────────────────────────────────────────

/// Interval settings for one periodic scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Milliseconds between tick starts. Minimum: 1.
    pub tick_interval_ms: u64,
}

impl SchedulerConfig {
    /// Tick every `ms` milliseconds.
    pub fn every_ms(ms: u64) -> Self {
        Self {
            tick_interval_ms: ms,
        }
    }

    /// The interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    fn validate(&self, scheduler: &'static str) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval { scheduler });
        }
        Ok(())
    }
}

// ── SimulationConfig ───────────────────────────────────────────────

/// Settings for both background schedulers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Position runner. Default: 250 ms.
    pub runner: SchedulerConfig,
    /// Command scheduler. Default: 500 ms.
    pub commands: SchedulerConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            runner: SchedulerConfig::every_ms(250),
            commands: SchedulerConfig::every_ms(500),
        }
    }
}

impl SimulationConfig {
    /// Check all intervals.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.runner.validate("runner")?;
        self.commands.validate("commands")?;
        Ok(())
    }

    /// Parse from JSON. Missing sections take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while loading or validating configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A scheduler interval is zero.
    ZeroInterval {
        /// Which scheduler.
        scheduler: &'static str,
    },
    /// The configuration text could not be parsed.
    Parse {
        /// Parser message.
        reason: String,
    },
    /// A background thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
    /// `start()` was called while the schedulers were already running.
    AlreadyRunning,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroInterval { scheduler } => {
                write!(f, "{scheduler} tick_interval_ms must be at least 1")
            }
            Self::Parse { reason } => write!(f, "invalid config: {reason}"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
            Self::AlreadyRunning => write!(f, "schedulers are already running"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.runner.interval(), Duration::from_millis(250));
        assert_eq!(config.commands.interval(), Duration::from_millis(500));
    }

    #[test]
    fn zero_interval_rejected() {
        let config = SimulationConfig {
            commands: SchedulerConfig::every_ms(0),
            ..SimulationConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval {
                scheduler: "commands"
            })
        );
    }

    #[test]
    fn json_fills_missing_sections() {
        let config = SimulationConfig::from_json(r#"{"runner":{"tick_interval_ms":10}}"#).unwrap();
        assert_eq!(config.runner.tick_interval_ms, 10);
        assert_eq!(config.commands.tick_interval_ms, 500);
    }

    #[test]
    fn json_rejects_zero_interval() {
        let err = SimulationConfig::from_json(r#"{"runner":{"tick_interval_ms":0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval { .. }));
        assert!(matches!(
            SimulationConfig::from_json("not json"),
            Err(ConfigError::Parse { .. })
        ));
    }
}
