//! Configuration Loader
//!
//! Merges built-in defaults, an optional TOML file and `DBREFACTOR__*` environment
//! overrides into a validated `MigrationConfig`.

use super::error::{ConfigResult, ConfigurationError};
use super::MigrationConfig;
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "DBREFACTOR_CONFIG";

/// Default configuration file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/dbrefactor.toml";

const ENV_PREFIX: &str = "DBREFACTOR";
const ENV_SEPARATOR: &str = "__";

pub struct ConfigManager {
    config: MigrationConfig,
    environment: String,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with file discovery and environment overrides
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load_from_path(path),
            _ => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
                let path = default_path.exists().then_some(default_path);
                Self::build(path, None)
            }
        }
    }

    /// Load configuration from a specific TOML file; the file must exist
    pub fn load_from_path(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigurationError::config_file_not_found(path));
        }
        Self::build(Some(path.to_path_buf()), None)
    }

    /// Load from an optional file with an explicit override map instead of the process
    /// environment. Keys use the `DBREFACTOR__SECTION__KEY` form.
    /// This is useful for testing without modifying global environment variables
    pub fn load_with_overrides(
        path: Option<&Path>,
        overrides: HashMap<String, String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::build(path.map(Path::to_path_buf), Some(overrides))
    }

    /// Wrap an already-built configuration after validating it
    pub fn from_config(config: MigrationConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: crate::logging::get_environment(),
            config_path: None,
        }))
    }

    fn build(
        path: Option<PathBuf>,
        env_source: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let environment = crate::logging::get_environment();

        let mut builder =
            Config::builder().add_source(Config::try_from(&MigrationConfig::default())?);

        if let Some(path) = &path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env_source),
        );

        let config: MigrationConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        crate::log_config!(
            info,
            "Configuration loaded successfully",
            environment: environment.as_str(),
            max_concurrency: config.execution.max_concurrency,
            max_attempts: config.execution.max_attempts,
            persistent: config.persistence.database_url.is_some()
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_path: path,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// File the configuration was read from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DanglingPolicy;
    use std::io::Write;

    #[test]
    fn test_file_and_override_layers() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[execution]
max_concurrency = 8
history_window = 3

[dependency_graph]
dangling_policy = "drop"
"#
        )
        .unwrap();

        let overrides = HashMap::from([(
            "DBREFACTOR__EXECUTION__MAX_CONCURRENCY".to_string(),
            "2".to_string(),
        )]);
        let manager = ConfigManager::load_with_overrides(Some(file.path()), overrides).unwrap();
        let config = manager.config();

        assert_eq!(config.execution.max_concurrency, 2);
        assert_eq!(config.execution.history_window, 3);
        assert_eq!(config.execution.max_attempts, 3);
        assert_eq!(config.dependency_graph.dangling_policy, DanglingPolicy::Drop);
        assert_eq!(manager.config_path(), Some(file.path()));
    }

    #[test]
    fn test_missing_file_rejected() {
        let result = ConfigManager::load_from_path("/nonexistent/dbrefactor.toml");
        assert!(matches!(
            result,
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let overrides = HashMap::from([(
            "DBREFACTOR__EXECUTION__MAX_ATTEMPTS".to_string(),
            "0".to_string(),
        )]);
        assert!(ConfigManager::load_with_overrides(None, overrides).is_err());
    }
}
