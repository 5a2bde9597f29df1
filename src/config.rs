//! Ejector configuration file handling
//!
//! Configuration is TOML. Durations use humantime syntax (`"5m"`, `"24h"`).
//!
//! ```toml
//! [ejector]
//! ejection_period = "5m"
//! ejection_rate_limit = 0.05
//!
//! [chain]
//! eth_rpc_url = "http://localhost:8545"
//! contract_directory_address = "0x…"
//!
//! [data_api]
//! url = "http://localhost:8080"
//! ```
//!
//! Everything is checked by [`EjectorConfig::validate`] before the ejector
//! starts. The private key may be left out of the file and supplied through the
//! environment or a key file instead.

use crate::chain::{QuorumId, ValidatorAddress};
use crate::ejection::{EjectorSettings, ManagerSettings};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Ejector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EjectorConfig {
    #[serde(default)]
    pub ejector: EjectionConfig,

    pub chain: ChainConfig,

    pub data_api: DataApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ejection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EjectionConfig {
    /// Time between ejector ticks.
    #[serde(with = "humantime_duration")]
    pub ejection_period: Duration,

    /// Signing-rate window evaluated each tick.
    #[serde(with = "humantime_duration")]
    pub ejection_criteria_time_window: Duration,

    /// Delay between starting and completing an ejection.
    #[serde(with = "humantime_duration")]
    pub ejection_finalization_delay: Duration,

    /// Minimum time between attempts against one validator.
    #[serde(with = "humantime_duration")]
    pub ejection_retry_delay: Duration,

    /// Cancellations tolerated before a validator is blacklisted.
    pub max_consecutive_failed_ejection_attempts: u32,

    /// Fraction of a quorum's stake ejectable per throttle period.
    pub ejection_rate_limit: f64,

    #[serde(with = "humantime_duration")]
    pub ejection_throttle_time_period: Duration,

    pub start_ejection_throttle_full: bool,

    /// Bound on each chain and data API call.
    #[serde(with = "humantime_duration")]
    pub chain_call_timeout: Duration,

    /// Quorums to evaluate. Empty means all.
    pub quorums: Vec<QuorumId>,

    /// Validators that are never ejected.
    pub do_not_eject: Vec<ValidatorAddress>,
}

impl Default for EjectionConfig {
    fn default() -> Self {
        let manager = ManagerSettings::default();
        Self {
            ejection_period: Duration::from_secs(5 * 60),
            ejection_criteria_time_window: Duration::from_secs(24 * 60 * 60),
            ejection_finalization_delay: manager.ejection_finalization_delay,
            ejection_retry_delay: manager.ejection_retry_delay,
            max_consecutive_failed_ejection_attempts: manager
                .max_consecutive_failed_ejection_attempts,
            ejection_rate_limit: manager.ejection_rate_limit,
            ejection_throttle_time_period: manager.ejection_throttle_time_period,
            start_ejection_throttle_full: manager.start_ejection_throttle_full,
            chain_call_timeout: manager.chain_call_timeout,
            quorums: Vec::new(),
            do_not_eject: Vec::new(),
        }
    }
}

impl EjectionConfig {
    /// Check the ejection policy alone. Rehearsals need nothing more.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("ejector.ejection_period", self.ejection_period),
            (
                "ejector.ejection_criteria_time_window",
                self.ejection_criteria_time_window,
            ),
            (
                "ejector.ejection_finalization_delay",
                self.ejection_finalization_delay,
            ),
            ("ejector.ejection_retry_delay", self.ejection_retry_delay),
            (
                "ejector.ejection_throttle_time_period",
                self.ejection_throttle_time_period,
            ),
            ("ejector.chain_call_timeout", self.chain_call_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(field, "must be > 0"));
            }
        }

        if self.max_consecutive_failed_ejection_attempts == 0 {
            return Err(ConfigError::invalid(
                "ejector.max_consecutive_failed_ejection_attempts",
                "must be > 0",
            ));
        }

        if !(self.ejection_rate_limit > 0.0 && self.ejection_rate_limit <= 1.0) {
            return Err(ConfigError::invalid(
                "ejector.ejection_rate_limit",
                format!("must be in (0, 1], got {}", self.ejection_rate_limit),
            ));
        }

        Ok(())
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            ejection_finalization_delay: self.ejection_finalization_delay,
            ejection_retry_delay: self.ejection_retry_delay,
            max_consecutive_failed_ejection_attempts: self.max_consecutive_failed_ejection_attempts,
            ejection_rate_limit: self.ejection_rate_limit,
            ejection_throttle_time_period: self.ejection_throttle_time_period,
            start_ejection_throttle_full: self.start_ejection_throttle_full,
            chain_call_timeout: self.chain_call_timeout,
        }
    }

    pub fn ejector_settings(&self) -> EjectorSettings {
        EjectorSettings {
            ejection_period: self.ejection_period,
            ejection_criteria_time_window: self.ejection_criteria_time_window,
            quorums: self.quorums.clone(),
            call_timeout: self.chain_call_timeout,
        }
    }
}

/// Chain connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub eth_rpc_url: String,

    pub contract_directory_address: String,

    /// Never written back out by [`EjectorConfig::save`].
    #[serde(default, skip_serializing)]
    pub private_key: Option<PrivateKey>,
}

/// Data API connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataApiConfig {
    pub url: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), or any `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Transaction signing key. Zeroed on drop and redacted in `Debug`.
#[derive(Clone)]
pub struct PrivateKey(Zeroizing<String>);

impl PrivateKey {
    pub fn new(key: String) -> Self {
        Self(Zeroizing::new(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl EjectorConfig {
    /// Configuration with default policy and the given endpoints.
    pub fn new(eth_rpc_url: String, contract_directory_address: String, data_api_url: String) -> Self {
        Self {
            ejector: EjectionConfig::default(),
            chain: ChainConfig {
                eth_rpc_url,
                contract_directory_address,
                private_key: None,
            },
            data_api: DataApiConfig { url: data_api_url },
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Save configuration to a TOML file. The private key is left out.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        write_file(path, &contents)
    }

    /// Check every field. The process must not start on error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ejector.validate()?;

        if self.chain.eth_rpc_url.trim().is_empty() {
            return Err(ConfigError::invalid("chain.eth_rpc_url", "must not be empty"));
        }

        if self.chain.contract_directory_address.trim().is_empty() {
            return Err(ConfigError::invalid(
                "chain.contract_directory_address",
                "must not be empty",
            ));
        }
        self.chain
            .contract_directory_address
            .parse::<ValidatorAddress>()
            .map_err(|err| {
                ConfigError::invalid("chain.contract_directory_address", err.to_string())
            })?;

        match &self.chain.private_key {
            Some(key) if !key.is_empty() => {}
            _ => {
                return Err(ConfigError::invalid(
                    "chain.private_key",
                    "must be set in the config file, EJECTOR_PRIVATE_KEY or --private-key-file",
                ))
            }
        }

        if self.data_api.url.trim().is_empty() {
            return Err(ConfigError::invalid("data_api.url", "must not be empty"));
        }

        Ok(())
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        r#"# Validator Ejector Configuration

[ejector]
# Time between ejector ticks
ejection_period = "5m"

# Signing-rate window evaluated on each tick
ejection_criteria_time_window = "24h"

# Time between starting an ejection and completing it on-chain
ejection_finalization_delay = "1h"

# Minimum time between two ejection attempts against the same validator
ejection_retry_delay = "24h"

# Validators that cancel this many ejections in a row are never retried
max_consecutive_failed_ejection_attempts = 5

# Fraction of a quorum's stake that may be ejected per throttle period
ejection_rate_limit = 0.05
ejection_throttle_time_period = "24h"

# Start with a full throttle (no ejections until it drains)
start_ejection_throttle_full = false

# Bound on each chain and data API call
chain_call_timeout = "30s"

# Quorums to evaluate (empty = all)
quorums = []

# Validators that must never be ejected
do_not_eject = []

[chain]
eth_rpc_url = "http://localhost:8545"
contract_directory_address = "0x0000000000000000000000000000000000000000"

# Prefer EJECTOR_PRIVATE_KEY or --private-key-file over storing the key here
# private_key = "..."

[data_api]
url = "http://localhost:8080"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"
"#
        .to_string()
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path) -> Result<(), ConfigError> {
        write_file(config_path, &Self::generate_default_toml())
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_error = |source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, contents).map_err(write_error)
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ejector")
        .join("config.toml")
}

/// Serde adapter for humantime durations.
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_config() -> EjectorConfig {
        let mut config = EjectorConfig::new(
            "http://localhost:8545".to_string(),
            "0x1111111111111111111111111111111111111111".to_string(),
            "http://localhost:8080".to_string(),
        );
        config.chain.private_key = Some(PrivateKey::new("abcd".to_string()));
        config
    }

    fn field_of(err: ConfigError) -> &'static str {
        match err {
            ConfigError::Invalid { field, .. } => field,
            other => panic!("expected invalid field, got {other}"),
        }
    }

    #[test]
    fn test_default_config() {
        let config = valid_config();
        assert_eq!(config.ejector.ejection_period, Duration::from_secs(300));
        assert_eq!(config.ejector.ejection_rate_limit, 0.05);
        assert_eq!(config.ejector.max_consecutive_failed_ejection_attempts, 5);
        assert!(config.ejector.quorums.is_empty());
        assert_eq!(config.logging.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_generate_default_toml_parses() {
        let config: EjectorConfig = toml::from_str(&EjectorConfig::generate_default_toml()).unwrap();
        assert_eq!(config.ejector, EjectionConfig::default());
        assert!(config.chain.private_key.is_none());
        assert_eq!(config.data_api.url, "http://localhost:8080");
    }

    #[test]
    fn test_create_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        EjectorConfig::create_default(&config_path).unwrap();
        assert!(config_path.exists());

        let config = EjectorConfig::load(&config_path).unwrap();
        assert_eq!(config.ejector.ejection_retry_delay, Duration::from_secs(86_400));
    }

    #[test]
    fn test_save_and_load_omits_private_key() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = valid_config();
        config.ejector.quorums = vec![0, 2];
        config.ejector.ejection_period = Duration::from_secs(90);
        config.save(&config_path).unwrap();

        let raw = fs::read_to_string(&config_path).unwrap();
        assert!(!raw.contains("abcd"));

        let loaded = EjectorConfig::load(&config_path).unwrap();
        assert_eq!(loaded.ejector.quorums, vec![0, 2]);
        assert_eq!(loaded.ejector.ejection_period, Duration::from_secs(90));
        assert!(loaded.chain.private_key.is_none());
    }

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let minimal = r#"
[ejector]
ejection_period = "10m"
do_not_eject = ["0x2222222222222222222222222222222222222222"]

[chain]
eth_rpc_url = "http://rpc"
contract_directory_address = "0x1111111111111111111111111111111111111111"
private_key = "deadbeef"

[data_api]
url = "http://api"
"#;
        let config: EjectorConfig = toml::from_str(minimal).unwrap();
        assert_eq!(config.ejector.ejection_period, Duration::from_secs(600));
        assert_eq!(config.ejector.ejection_finalization_delay, Duration::from_secs(3600));
        assert_eq!(
            config.ejector.do_not_eject,
            vec![ValidatorAddress::from_bytes([0x22; 20])]
        );
        assert_eq!(
            config.chain.private_key.as_ref().map(|k| k.expose()),
            Some("deadbeef")
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_load_rejects_bad_duration() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[ejector]
ejection_period = "soon"

[chain]
eth_rpc_url = "http://rpc"
contract_directory_address = "0x1111111111111111111111111111111111111111"

[data_api]
url = "http://api"
"#,
        )
        .unwrap();

        assert!(matches!(
            EjectorConfig::load(&config_path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            EjectorConfig::load(&temp_dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_validate_zero_durations() {
        let mut config = valid_config();
        config.ejector.ejection_period = Duration::ZERO;
        assert_eq!(field_of(config.validate().unwrap_err()), "ejector.ejection_period");

        let mut config = valid_config();
        config.ejector.chain_call_timeout = Duration::ZERO;
        assert_eq!(field_of(config.validate().unwrap_err()), "ejector.chain_call_timeout");

        let mut config = valid_config();
        config.ejector.ejection_throttle_time_period = Duration::ZERO;
        assert_eq!(
            field_of(config.validate().unwrap_err()),
            "ejector.ejection_throttle_time_period"
        );
    }

    #[test]
    fn test_validate_attempts() {
        let mut config = valid_config();
        config.ejector.max_consecutive_failed_ejection_attempts = 0;
        assert_eq!(
            field_of(config.validate().unwrap_err()),
            "ejector.max_consecutive_failed_ejection_attempts"
        );
    }

    #[test]
    fn test_validate_rate_limit() {
        for bad in [0.0, -0.1, 1.5, f64::NAN] {
            let mut config = valid_config();
            config.ejector.ejection_rate_limit = bad;
            assert_eq!(
                field_of(config.validate().unwrap_err()),
                "ejector.ejection_rate_limit"
            );
        }

        let mut config = valid_config();
        config.ejector.ejection_rate_limit = 1.0;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_chain_fields() {
        let mut config = valid_config();
        config.chain.eth_rpc_url = "  ".to_string();
        assert_eq!(field_of(config.validate().unwrap_err()), "chain.eth_rpc_url");

        let mut config = valid_config();
        config.chain.contract_directory_address = String::new();
        assert_eq!(
            field_of(config.validate().unwrap_err()),
            "chain.contract_directory_address"
        );

        let mut config = valid_config();
        config.chain.contract_directory_address = "0x1234".to_string();
        assert_eq!(
            field_of(config.validate().unwrap_err()),
            "chain.contract_directory_address"
        );

        let mut config = valid_config();
        config.chain.private_key = None;
        assert_eq!(field_of(config.validate().unwrap_err()), "chain.private_key");

        let mut config = valid_config();
        config.chain.private_key = Some(PrivateKey::new(" ".to_string()));
        assert_eq!(field_of(config.validate().unwrap_err()), "chain.private_key");
    }

    #[test]
    fn test_validate_data_api() {
        let mut config = valid_config();
        config.data_api.url = String::new();
        assert_eq!(field_of(config.validate().unwrap_err()), "data_api.url");
    }

    #[test]
    fn test_private_key_is_redacted() {
        let key = PrivateKey::new("super-secret".to_string());
        assert!(!format!("{:?}", key).contains("super-secret"));
        assert!(!format!("{:?}", valid_config()).contains("abcd"));
    }

    #[test]
    fn test_settings_conversion() {
        let mut config = valid_config();
        config.ejector.quorums = vec![1];
        let manager = config.ejector.manager_settings();
        assert_eq!(manager.ejection_rate_limit, 0.05);
        let ejector = config.ejector.ejector_settings();
        assert_eq!(ejector.quorums, vec![1]);
        assert_eq!(ejector.call_timeout, Duration::from_secs(30));
    }
}
