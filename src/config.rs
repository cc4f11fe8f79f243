//! Configuration management for the LSKF rate limiter.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LimiterError, Result};

/// Prefix for environment variable overrides, e.g. `LSKF__LIMITER__ENFORCING=false`.
const ENV_PREFIX: &str = "LSKF";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Rate limiter policy
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Failure counter storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rate limiter policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// In non-enforcing mode all delays are zero and duplicate wrong guesses
    /// are passed on to the hardware check.
    #[serde(default = "default_enforcing")]
    pub enforcing: bool,

    /// How long saved wrong guesses are kept after the most recent failure
    #[serde(default = "default_saved_wrong_guess_timeout")]
    pub saved_wrong_guess_timeout_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enforcing: default_enforcing(),
            saved_wrong_guess_timeout_secs: default_saved_wrong_guess_timeout(),
        }
    }
}

impl LimiterConfig {
    /// The saved wrong guess timeout as a [`Duration`].
    pub fn saved_wrong_guess_timeout(&self) -> Duration {
        Duration::from_secs(self.saved_wrong_guess_timeout_secs)
    }
}

fn default_enforcing() -> bool {
    true
}

fn default_saved_wrong_guess_timeout() -> u64 {
    5 * 60
}

/// Failure counter storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one counter file per protector
    #[serde(default = "default_counter_dir")]
    pub counter_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            counter_dir: default_counter_dir(),
        }
    }
}

fn default_counter_dir() -> PathBuf {
    PathBuf::from("/var/lib/lskf-limiter/counters")
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load configuration from an optional file, layered with `LSKF__*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading overrides from `env` instead of the
    /// process environment when it is given.
    fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse configuration: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.limiter.enforcing);
        assert_eq!(
            settings.limiter.saved_wrong_guess_timeout(),
            Duration::from_secs(300)
        );
        assert_eq!(settings.logging.level, "info");
        assert!(!settings.logging.json);
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
limiter:
  enforcing: false
storage:
  counter_dir: /tmp/counters
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert!(!settings.limiter.enforcing);
        assert_eq!(settings.limiter.saved_wrong_guess_timeout_secs, 300);
        assert_eq!(settings.storage.counter_dir, PathBuf::from("/tmp/counters"));
    }

    #[test]
    fn test_from_yaml_invalid() {
        let result = Settings::from_yaml("limiter: [not, a, map]");
        assert!(matches!(result, Err(LimiterError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lskf.yaml");
        std::fs::write(
            &path,
            "limiter:\n  saved_wrong_guess_timeout_secs: 60\nlogging:\n  json: true\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert!(settings.limiter.enforcing);
        assert_eq!(settings.limiter.saved_wrong_guess_timeout_secs, 60);
        assert!(settings.logging.json);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lskf.yaml");
        std::fs::write(
            &path,
            "limiter:\n  saved_wrong_guess_timeout_secs: 60\nstorage:\n  counter_dir: /from/file\n",
        )
        .unwrap();

        let env = config::Map::from_iter([
            ("LSKF__LIMITER__ENFORCING".to_string(), "false".to_string()),
            ("LSKF__STORAGE__COUNTER_DIR".to_string(), "/from/env".to_string()),
            ("OTHER__LOGGING__LEVEL".to_string(), "trace".to_string()),
        ]);
        let settings = Settings::load_with_env(Some(&path), Some(env)).unwrap();

        assert!(!settings.limiter.enforcing);
        assert_eq!(settings.limiter.saved_wrong_guess_timeout_secs, 60);
        assert_eq!(settings.storage.counter_dir, PathBuf::from("/from/env"));
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Settings::load(Some(Path::new("/nonexistent/lskf.yaml")));
        assert!(matches!(result, Err(LimiterError::Config(_))));
    }
}
