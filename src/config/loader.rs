//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles file discovery,
//! environment detection, and merging of file and environment-variable sources.

use super::error::{ConfigResult, ConfigurationError};
use super::DiscoveryConfig;
use crate::constants::{CONFIG_ENV_PREFIX, CONFIG_FILE_STEM, ENVIRONMENT_VARIABLE};
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded and validated discovery configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: DiscoveryConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Reads `discovery.toml`, then `discovery.{environment}.toml`, then
    /// `DISCOVERY_*` environment variables. Missing files are skipped.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_environment_source(config_dir, environment, None)
    }

    /// Load a single configuration file, still honouring environment variables
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(Self::environment_source(None))
            .build()?;

        let config: DiscoveryConfig = settings.try_deserialize()?;
        config.validate()?;

        info!(
            config_file = %path.display(),
            registry = %config.registry.base_url(),
            "Configuration loaded from file"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }))
    }

    /// Build a manager around an already constructed configuration
    pub fn from_config(config: DiscoveryConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// `env_vars` replaces the process environment when given
    pub(crate) fn load_with_environment_source(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_vars: Option<config::Map<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let base_file = config_directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let env_file = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        let settings = Config::builder()
            .add_source(
                File::from(base_file.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                File::from(env_file.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Self::environment_source(env_vars))
            .build()?;

        let config: DiscoveryConfig = settings.try_deserialize()?;
        config.validate()?;

        info!(
            environment = %environment,
            registry = %config.registry.base_url(),
            watch_restart = config.watch.restart_on_failure,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    fn environment_source(env_vars: Option<config::Map<String, String>>) -> Environment {
        Environment::with_prefix(CONFIG_ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env_vars)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Environment the configuration was loaded for
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Directory configuration files were read from
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect the current environment from `DISCOVERY_ENV`
    pub fn detect_environment() -> String {
        env::var(ENVIRONMENT_VARIABLE).unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        PathBuf::from("config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    fn no_env() -> Option<config::Map<String, String>> {
        Some(config::Map::new())
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::load_with_environment_source(
            Some(dir.path().to_path_buf()),
            "test",
            no_env(),
        )
        .unwrap();

        assert_eq!(manager.config(), &DiscoveryConfig::default());
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_environment_file_overrides_base_file() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "discovery.toml",
            "[registry]\nhost = \"consul.internal\"\nport = 8600\n",
        );
        write(
            dir.path(),
            "discovery.production.toml",
            "[registry]\nport = 8501\nscheme = \"https\"\n\n[watch]\nrestart_on_failure = false\n",
        );

        let manager = ConfigManager::load_with_environment_source(
            Some(dir.path().to_path_buf()),
            "production",
            no_env(),
        )
        .unwrap();
        let config = manager.config();

        assert_eq!(config.registry.host, "consul.internal");
        assert_eq!(config.registry.port, 8501);
        assert_eq!(config.registry.base_url(), "https://consul.internal:8501");
        assert!(!config.watch.restart_on_failure);
        assert_eq!(config.health_check.interval, "15s");
    }

    #[test]
    fn test_environment_variables_override_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "discovery.toml", "[registry]\nport = 8600\n");

        let mut vars = config::Map::new();
        vars.insert("DISCOVERY_REGISTRY__PORT".to_string(), "9500".to_string());
        vars.insert(
            "DISCOVERY_HEALTH_CHECK__DEREGISTER_CRITICAL_AFTER".to_string(),
            "1m".to_string(),
        );
        vars.insert("DISCOVERY_REGISTRY__TOKEN".to_string(), "secret".to_string());

        let manager = ConfigManager::load_with_environment_source(
            Some(dir.path().to_path_buf()),
            "test",
            Some(vars),
        )
        .unwrap();
        let config = manager.config();

        assert_eq!(config.registry.port, 9500);
        assert_eq!(config.health_check.deregister_critical_after, "1m");
        assert_eq!(config.registry.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "discovery.toml",
            "[health_check]\ninterval = \"soon\"\n",
        );

        let result = ConfigManager::load_with_environment_source(
            Some(dir.path().to_path_buf()),
            "test",
            no_env(),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "health_check.interval"
        ));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = ConfigManager::load_from_file(dir.path().join("absent.toml"));
        assert!(matches!(
            result,
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }
}
