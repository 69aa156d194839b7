use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

pub const CONFIG_DIR: &str = ".redline";
pub const MAX_CONCURRENT_TASKS_LIMIT: usize = 64;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrent_tasks: {0}. Must be between 1 and 64")]
    InvalidMaxConcurrentTasks(usize),

    #[error("Invalid max_rounds: {0}. Must be at least 1")]
    InvalidMaxRounds(u32),

    #[error("Invalid fix_sample_size: {0}. Must be at least 1")]
    InvalidFixSampleSize(usize),

    #[error("Invalid tool_timeout_secs: {0}. Must be at least 1")]
    InvalidToolTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid temperature for {0}: {1}. Must be between 0.0 and 2.0")]
    InvalidTemperature(&'static str, f32),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .redline/config.yaml (project config, created by init)
    /// 3. .redline/local.yaml (project local overrides, optional)
    /// 4. Environment variables (REDLINE_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new(CONFIG_DIR))
    }

    /// Same as [`ConfigLoader::load`] with an explicit config directory.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Config> {
        let dir = dir.as_ref();
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("REDLINE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_concurrent_tasks == 0 || config.max_concurrent_tasks > MAX_CONCURRENT_TASKS_LIMIT {
            return Err(ConfigError::InvalidMaxConcurrentTasks(config.max_concurrent_tasks));
        }

        if config.engine.max_rounds == 0 {
            return Err(ConfigError::InvalidMaxRounds(config.engine.max_rounds));
        }
        if config.engine.fix_sample_size == 0 {
            return Err(ConfigError::InvalidFixSampleSize(config.engine.fix_sample_size));
        }
        if config.engine.tool_timeout_secs == 0 {
            return Err(ConfigError::InvalidToolTimeout(config.engine.tool_timeout_secs));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        for (name, value) in [
            ("exploit_temperature", config.llm.exploit_temperature),
            ("patch_temperature", config.llm.patch_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::InvalidTemperature(name, value));
            }
        }

        if config.llm.base_url.is_empty() || config.llm.model.is_empty() {
            return Err(ConfigError::ValidationFailed("llm base_url and model cannot be empty".to_string()));
        }
        if config.toolchain.docker_binary.is_empty() {
            return Err(ConfigError::ValidationFailed("toolchain docker_binary cannot be empty".to_string()));
        }
        if config.toolchain.fuzz_runs == 0 {
            return Err(ConfigError::ValidationFailed("toolchain fuzz_runs must be at least 1".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{LogFormat, WeaponizeFailurePolicy};
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_tasks, 3);
        assert_eq!(config.engine.max_rounds, 10);
        assert_eq!(config.engine.weaponize_failure, WeaponizeFailurePolicy::Fatal);
        assert_eq!(config.database.path, ".redline/redline.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
max_concurrent_tasks: 8
engine:
  max_rounds: 3
  weaponize_failure: skip_round
database:
  path: /custom/path.db
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.max_concurrent_tasks, 8);
        assert_eq!(config.engine.max_rounds, 3);
        assert_eq!(config.engine.fix_sample_size, 3);
        assert_eq!(config.engine.weaponize_failure, WeaponizeFailurePolicy::SkipRound);
        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.logging.format, LogFormat::Json);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_concurrency_bounds() {
        for bad in [0, 65] {
            let config = Config { max_concurrent_tasks: bad, ..Default::default() };
            assert!(matches!(
                ConfigLoader::validate(&config),
                Err(ConfigError::InvalidMaxConcurrentTasks(n)) if n == bad
            ));
        }
        let config = Config { max_concurrent_tasks: 64, ..Default::default() };
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_engine_limits() {
        let mut config = Config::default();
        config.engine.max_rounds = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxRounds(0))));

        let mut config = Config::default();
        config.engine.fix_sample_size = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidFixSampleSize(0))));

        let mut config = Config::default();
        config.engine.tool_timeout_secs = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidToolTimeout(0))));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_database() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyDatabasePath)));

        let mut config = Config::default();
        config.database.max_connections = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxConnections(0))));
    }

    #[test]
    fn test_validate_temperature() {
        let mut config = Config::default();
        config.llm.patch_temperature = 3.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidTemperature("patch_temperature", _))
        ));
    }

    #[test]
    fn test_env_override() {
        let dir = tempfile::tempdir().unwrap();
        temp_env::with_vars(
            [
                ("REDLINE_MAX_CONCURRENT_TASKS", Some("7")),
                ("REDLINE_ENGINE__MAX_ROUNDS", Some("2")),
                ("REDLINE_LOGGING__LEVEL", Some("debug")),
            ],
            || {
                let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
                assert_eq!(config.max_concurrent_tasks, 7);
                assert_eq!(config.engine.max_rounds, 2);
                assert_eq!(config.logging.level, "debug");
            },
        );
    }

    #[test]
    fn test_env_override_rejected_by_validation() {
        let dir = tempfile::tempdir().unwrap();
        temp_env::with_var("REDLINE_MAX_CONCURRENT_TASKS", Some("100"), || {
            assert!(ConfigLoader::load_from_dir(dir.path()).is_err());
        });
    }

    #[test]
    fn test_hierarchical_merging() {
        let dir = tempfile::tempdir().unwrap();

        let mut base = std::fs::File::create(dir.path().join("config.yaml")).unwrap();
        writeln!(base, "max_concurrent_tasks: 5\nlogging:\n  level: info\n  format: json").unwrap();

        let mut local = std::fs::File::create(dir.path().join("local.yaml")).unwrap();
        writeln!(local, "max_concurrent_tasks: 12\nlogging:\n  level: debug").unwrap();

        temp_env::with_var_unset("REDLINE_MAX_CONCURRENT_TASKS", || {
            let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
            assert_eq!(config.max_concurrent_tasks, 12, "Local override should win");
            assert_eq!(config.logging.level, "debug", "Override should win for nested fields");
            assert_eq!(config.logging.format, LogFormat::Json, "Base value should persist");
        });
    }
}
