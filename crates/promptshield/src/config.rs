//! Configuration management for promptshield.
//!
//! Configuration is layered with figment: defaults, then an optional TOML
//! file, then `PROMPTSHIELD_`-prefixed environment variables. Nested keys in
//! environment variables are separated with a double underscore, e.g.
//! `PROMPTSHIELD_CACHE__CAPACITY=50`.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_STORAGE_KEY};
use crate::detection::{CustomPattern, PatternId, PhoneRule, SanitizeMode, DEFAULT_REDACTION_TOKEN};
use crate::dom::WaitOptions;
use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "config.toml";

const DATA_DIR_NAME: &str = "promptshield";

const DATABASE_FILE_NAME: &str = "store.db";

const ENV_PREFIX: &str = "PROMPTSHIELD_";

/// Shortest debounce accepted for live checking.
pub const MIN_DEBOUNCE_MS: u64 = 300;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `PROMPTSHIELD_`)
/// 2. TOML config file at `~/.config/promptshield/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Detection configuration.
    pub detection: DetectionConfig,
    /// Result cache configuration.
    pub cache: CacheConfig,
    /// Interception configuration.
    pub intercept: InterceptConfig,
    /// Element discovery configuration.
    pub dom: DomConfig,
    /// Durable store configuration.
    pub storage: StorageConfig,
}

/// Detection-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// How characters outside the safe set are treated before matching.
    pub sanitize_mode: SanitizeMode,
    /// Built-in or custom pattern ids to leave out.
    pub disabled_patterns: Vec<PatternId>,
    /// Additional patterns; their matches are not validated.
    pub custom_patterns: Vec<CustomPattern>,
    /// Digit-count rule for phone numbers.
    pub phone: PhoneRule,
}

/// Result cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached results.
    pub capacity: usize,
    /// Key the cache is persisted under.
    pub storage_key: String,
    /// Write the cache to the durable store.
    pub persist: bool,
}

/// Interception configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Replacement for redacted matches.
    pub redaction_token: String,
    /// How long a "Keep" approval stays valid, in milliseconds.
    pub approval_ttl_ms: u64,
    /// Quiet period before live checking runs, in milliseconds.
    pub debounce_ms: u64,
}

/// Element discovery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomConfig {
    /// Delay before the second lookup, in milliseconds.
    pub retry_delay_ms: u64,
    /// Give up waiting for an element after this many milliseconds.
    pub element_timeout_ms: u64,
}

/// Durable store configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/promptshield/store.db`
    pub database_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            persist: true,
        }
    }
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            redaction_token: DEFAULT_REDACTION_TOKEN.to_string(),
            approval_ttl_ms: 5_000,
            debounce_ms: MIN_DEBOUNCE_MS,
        }
    }
}

impl Default for DomConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 1_000,
            element_timeout_ms: 10_000,
        }
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(invalid("cache.capacity must be greater than 0"));
        }
        if self.cache.storage_key.trim().is_empty() {
            return Err(invalid("cache.storage_key must not be empty"));
        }

        if self.intercept.debounce_ms < MIN_DEBOUNCE_MS {
            return Err(invalid(format!(
                "intercept.debounce_ms ({}) must be at least {MIN_DEBOUNCE_MS}",
                self.intercept.debounce_ms
            )));
        }
        if self.intercept.approval_ttl_ms == 0 {
            return Err(invalid("intercept.approval_ttl_ms must be greater than 0"));
        }
        if self.intercept.redaction_token.is_empty() {
            return Err(invalid("intercept.redaction_token must not be empty"));
        }

        if self.dom.element_timeout_ms == 0 {
            return Err(invalid("dom.element_timeout_ms must be greater than 0"));
        }
        if self.dom.retry_delay_ms > self.dom.element_timeout_ms {
            return Err(invalid(format!(
                "dom.retry_delay_ms ({}) cannot be greater than dom.element_timeout_ms ({})",
                self.dom.retry_delay_ms, self.dom.element_timeout_ms
            )));
        }

        if let PhoneRule::Range { min, max } = self.detection.phone {
            if min > max || min < 7 || max > 15 {
                return Err(invalid(format!(
                    "detection.phone range {min}..={max} must lie within 7..=15 with min <= max"
                )));
            }
        }

        for custom in &self.detection.custom_patterns {
            if custom.name.trim().is_empty() {
                return Err(invalid("custom pattern names must not be empty"));
            }
            if regex::Regex::new(&custom.pattern).is_err() {
                return Err(invalid(format!(
                    "invalid regex pattern for custom:{}: {}",
                    custom.name, custom.pattern
                )));
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Live-check debounce as a Duration.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.intercept.debounce_ms)
    }

    /// Approval lifetime as a Duration.
    #[must_use]
    pub fn approval_ttl(&self) -> Duration {
        Duration::from_millis(self.intercept.approval_ttl_ms)
    }

    /// Element discovery timings.
    #[must_use]
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            retry_delay: Duration::from_millis(self.dom.retry_delay_ms),
            timeout: Duration::from_millis(self.dom.element_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.detection.sanitize_mode, SanitizeMode::Spacing);
        assert_eq!(config.detection.phone, PhoneRule::NorthAmerican);
        assert!(config.detection.disabled_patterns.is_empty());
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.cache.storage_key, "sensitiveDataCache");
        assert!(config.cache.persist);
        assert_eq!(config.intercept.redaction_token, "[REDACTED]");
        assert_eq!(config.intercept.approval_ttl_ms, 5_000);
        assert_eq!(config.intercept.debounce_ms, 300);
        assert_eq!(config.dom.retry_delay_ms, 1_000);
        assert_eq!(config.dom.element_timeout_ms, 10_000);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = Config::default();
        config.cache.capacity = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("cache.capacity"));
    }

    #[test]
    fn test_validate_short_debounce() {
        let mut config = Config::default();
        config.intercept.debounce_ms = 100;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("debounce_ms"));
    }

    #[test]
    fn test_validate_empty_token() {
        let mut config = Config::default();
        config.intercept.redaction_token = String::new();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("redaction_token"));
    }

    #[test]
    fn test_validate_zero_ttl() {
        let mut config = Config::default();
        config.intercept.approval_ttl_ms = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_retry_delay_exceeds_timeout() {
        let mut config = Config::default();
        config.dom.retry_delay_ms = 20_000;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("retry_delay_ms"));

        config.dom.element_timeout_ms = 0;
        config.dom.retry_delay_ms = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("element_timeout_ms"));
    }

    #[test]
    fn test_validate_phone_range() {
        let mut config = Config::default();
        config.detection.phone = PhoneRule::international();
        assert!(config.validate().is_ok());

        config.detection.phone = PhoneRule::Range { min: 10, max: 8 };
        assert!(config.validate().is_err());

        config.detection.phone = PhoneRule::Range { min: 5, max: 12 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_custom_regex() {
        let mut config = Config::default();
        config.detection.custom_patterns = vec![CustomPattern {
            name: "broken".to_string(),
            description: "Broken".to_string(),
            pattern: "[invalid".to_string(),
        }];

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("invalid regex"));
    }

    #[test]
    fn test_database_path_default() {
        let path = Config::default().database_path();
        assert!(path.to_string_lossy().contains("store.db"));
        assert!(path.to_string_lossy().contains("promptshield"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/path/db.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/db.sqlite")
        );
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config::default();
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert_eq!(config.approval_ttl(), Duration::from_secs(5));

        let wait = config.wait_options();
        assert_eq!(wait.retry_delay, Duration::from_secs(1));
        assert_eq!(wait.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("promptshield"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[detection]
sanitize_mode = "strict"
disabled_patterns = ["phone"]
phone = {{ kind = "range", min = 7, max = 15 }}

[[detection.custom_patterns]]
name = "employee_id"
description = "Employee ID"
pattern = '\bEMP-\d{{6}}\b'

[cache]
capacity = 50

[intercept]
redaction_token = "***"
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.detection.sanitize_mode, SanitizeMode::Strict);
        assert_eq!(config.detection.disabled_patterns, vec![PatternId::Phone]);
        assert_eq!(config.detection.phone, PhoneRule::international());
        assert_eq!(config.detection.custom_patterns[0].pattern, r"\bEMP-\d{6}\b");
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.cache.storage_key, "sensitiveDataCache");
        assert_eq!(config.intercept.redaction_token, "***");
        assert_eq!(config.intercept.debounce_ms, 300);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[intercept]\ndebounce_ms = 10").unwrap();

        let result = Config::load_from(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(Error::ConfigValidation { .. })));
    }

    #[test]
    fn test_load_rejects_unknown_pattern_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[detection]\ndisabled_patterns = [\"iban\"]").unwrap();

        let result = Config::load_from(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(Error::ConfigLoad(_))));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("sanitize_mode"));
        assert!(json.contains("redaction_token"));
    }
}
