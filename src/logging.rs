//! # Tracing Module
//!
//! Environment-aware console logging using the tracing ecosystem.
//!
//! This module provides:
//! - Console logging, human readable or JSON (`DBREFACTOR_LOG_FORMAT=json`)
//! - Environment-based log level configuration
//! - Domain-specific structured logging macros (`log_job!`, `log_step!`, `log_graph!`,
//!   `log_config!`)
//! - TTY-aware ANSI color output

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Output format for the console layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("DBREFACTOR_LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Initialize console logging.
///
/// Safe to call more than once, and safe to call when another global subscriber is
/// already installed (e.g. by a host application or a test harness).
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let format = LogFormat::from_env();

        // Determine if we're in a TTY for ANSI color support
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = match format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_filter(EnvFilter::new(&log_level))
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level))
                .boxed(),
        };

        if tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                log_level = %log_level,
                ansi_colors = use_ansi,
                json = format == LogFormat::Json,
                "Console logging initialized"
            );
        }
    });
}

/// Get current environment from environment variables
pub fn get_environment() -> String {
    std::env::var("DBREFACTOR_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment variables or environment defaults
pub fn get_log_level(environment: &str) -> String {
    // First check for explicit LOG_LEVEL environment variable
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        return level.to_lowercase();
    }

    // Then check for RUST_LOG environment variable
    if let Ok(level) = std::env::var("RUST_LOG") {
        return level.to_lowercase();
    }

    level_for_environment(environment).to_string()
}

fn level_for_environment(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log job lifecycle operations
#[macro_export]
macro_rules! log_job {
    // Full form with job_id
    ($level:ident, $operation:expr, job_id: $job_id:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            job_id = %$job_id,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "{}", $operation
        );
    };
    // Simple form - just operation
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "{}", $operation
        );
    };
    // Generic form with additional fields
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "{}", $operation
        );
    };
}

/// Log step operations
#[macro_export]
macro_rules! log_step {
    // Full form with step_id and job_id
    ($level:ident, $operation:expr, step_id: $step_id:expr, job_id: $job_id:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            step_id = %$step_id,
            job_id = %$job_id,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "{}", $operation
        );
    };
    // Simple form - just operation
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "{}", $operation
        );
    };
    // Generic form with additional fields
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "{}", $operation
        );
    };
}

/// Log dependency graph and catalog operations
#[macro_export]
macro_rules! log_graph {
    // Simple form - just operation
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "{}", $operation
        );
    };
    // Generic form with additional fields
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "{}", $operation
        );
    };
}

/// Log configuration operations
#[macro_export]
macro_rules! log_config {
    // Simple form - just operation
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "{}", $operation
        );
    };
    // Generic form with additional fields
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "{}", $operation
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(level_for_environment("test"), "debug");
        assert_eq!(level_for_environment("development"), "debug");
        assert_eq!(level_for_environment("production"), "info");
        assert_eq!(level_for_environment("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
        log_job!(info, "job_started", job_id: uuid::Uuid::nil(), objects: 2);
        log_step!(debug, "step_dispatched", step_id: "app.t::fetch", job_id: uuid::Uuid::nil(), attempt: 1);
        log_graph!(info, "graph_built");
    }
}
