//! # Migration Configuration
//!
//! Layered configuration for the migration orchestration core.
//!
//! ## Overview
//!
//! Values are resolved from three layers, later layers overriding earlier ones:
//!
//! 1. Built-in defaults (`MigrationConfig::default()`)
//! 2. An optional TOML file (`config/dbrefactor.toml`, or the path in `DBREFACTOR_CONFIG`)
//! 3. Environment variables of the form `DBREFACTOR__SECTION__KEY`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dbrefactor_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let concurrency = manager.config().execution.max_concurrency;
//! let timeout = manager.config().execution.step_timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::graph::{DanglingPolicy, GraphPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub execution: ExecutionConfig,
    pub backoff: BackoffConfig,
    pub dependency_graph: DependencyGraphConfig,
    pub events: EventsConfig,
    pub persistence: PersistenceConfig,
}

/// Step dispatch and retry limits
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Maximum number of steps in `running` at once, per job
    pub max_concurrency: usize,
    /// Attempt budget per step, including the first attempt
    pub max_attempts: u32,
    /// Number of prior conversion attempts handed to the conversion provider
    pub history_window: usize,
    /// Re-conversions allowed after validation rejections, separate from retries
    pub reconversion_budget: u32,
    pub step_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_attempts: 3,
            history_window: 5,
            reconversion_budget: 1,
            step_timeout_ms: 600_000,
        }
    }
}

impl ExecutionConfig {
    /// Get step timeout as Duration
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

/// Exponential backoff between retry attempts
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 300_000,
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Graph construction policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DependencyGraphConfig {
    pub dangling_policy: DanglingPolicy,
    pub allow_replace: bool,
    pub auto_break_cycles: bool,
}

impl Default for DependencyGraphConfig {
    fn default() -> Self {
        Self {
            dangling_policy: DanglingPolicy::Placeholder,
            allow_replace: true,
            auto_break_cycles: false,
        }
    }
}

impl DependencyGraphConfig {
    pub fn graph_policy(&self) -> GraphPolicy {
        GraphPolicy {
            dangling: self.dangling_policy,
            allow_replace: self.allow_replace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast buffer; slower subscribers skip events beyond it
    pub buffer_size: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { buffer_size: 1024 }
    }
}

/// Checkpoint store settings; without a database URL checkpoints stay in memory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
        }
    }
}

impl MigrationConfig {
    /// Configuration with short timings for tests
    pub fn for_testing() -> Self {
        Self {
            execution: ExecutionConfig {
                step_timeout_ms: 5_000,
                ..ExecutionConfig::default()
            },
            backoff: BackoffConfig {
                base_delay_ms: 1,
                max_delay_ms: 10,
                multiplier: 2.0,
            },
            ..Self::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.execution.max_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_concurrency",
                0,
                "concurrency limit must be greater than 0",
            ));
        }

        if self.execution.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_attempts",
                0,
                "at least one attempt is required",
            ));
        }

        if self.execution.history_window == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.history_window",
                0,
                "history window must be greater than 0",
            ));
        }

        if self.execution.step_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.step_timeout_ms",
                0,
                "step timeout must be greater than 0",
            ));
        }

        if self.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                self.backoff.multiplier,
                "multiplier must be at least 1.0",
            ));
        }

        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(ConfigurationError::validation_error(format!(
                "backoff.max_delay_ms ({}) is smaller than backoff.base_delay_ms ({})",
                self.backoff.max_delay_ms, self.backoff.base_delay_ms
            )));
        }

        if self.events.buffer_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.buffer_size",
                0,
                "event buffer must hold at least one event",
            ));
        }

        if self.persistence.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "persistence.max_connections",
                0,
                "pool size must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MigrationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.execution.max_concurrency, 4);
        assert_eq!(config.execution.max_attempts, 3);
        assert_eq!(config.execution.history_window, 5);
        assert_eq!(config.execution.step_timeout(), Duration::from_secs(600));
        assert_eq!(
            config.dependency_graph.graph_policy(),
            GraphPolicy::default()
        );
        MigrationConfig::for_testing().validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = MigrationConfig::default();
        config.execution.max_concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));

        let mut config = MigrationConfig::default();
        config.backoff.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = MigrationConfig::default();
        config.backoff.max_delay_ms = 10;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ValidationError { .. })
        ));
    }
}
