//! Core configuration.
//!
//! Everything tunable lives in one [`CoreConfig`] struct handed to
//! [`Core::init`](crate::Core::init); nothing reads globals after startup.
//!
//! Supports configuration via environment variables:
//!
//! ```bash
//! BIOSIFT_STORE_URL=memory:          # authoritative store backend
//! BIOSIFT_DATA_DIR=./data            # persistence mirror output
//! BIOSIFT_BACKUP_ROOT=./backups      # dated archive directories
//! BIOSIFT_CODE_TTL_MINUTES=10        # verification code validity
//! BIOSIFT_SWEEP_INTERVAL_SECS=60     # expired-code sweep cadence
//! BIOSIFT_BACKUP_INTERVAL_SECS=3600  # backup schedule; 0 disables it
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Unsupported store URL: {0}. Expected 'memory:'")]
    UnsupportedStoreUrl(String),

    #[error("Code TTL must be positive")]
    NonPositiveTtl,
}

/// All knobs for the ledger core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Connection string for the authoritative store. Only the `memory:`
    /// scheme is implemented; the URL shape leaves room for networked
    /// backends behind the same `Store` trait.
    pub store_url: String,
    /// Directory the persistence mirror writes its JSON files to.
    pub data_dir: PathBuf,
    /// Root directory for dated backup archives.
    pub backup_root: PathBuf,
    /// Validity window for issued verification codes.
    pub code_ttl: Duration,
    /// How often the background sweep purges expired codes.
    pub sweep_interval: StdDuration,
    /// How often the backup schedule fires. `None` disables scheduled
    /// backups; on-demand backups still work.
    pub backup_interval: Option<StdDuration>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            store_url: "memory:".to_string(),
            data_dir: PathBuf::from("./data"),
            backup_root: PathBuf::from("./backups"),
            code_ttl: Duration::minutes(10),
            sweep_interval: StdDuration::from_secs(60),
            backup_interval: Some(StdDuration::from_secs(3600)),
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = env::var("BIOSIFT_STORE_URL") {
            config.store_url = url;
        }
        if let Ok(dir) = env::var("BIOSIFT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("BIOSIFT_BACKUP_ROOT") {
            config.backup_root = PathBuf::from(dir);
        }
        if let Ok(minutes) = env::var("BIOSIFT_CODE_TTL_MINUTES") {
            let parsed = minutes.parse::<i64>().map_err(|_| ConfigError::InvalidValue {
                key: "BIOSIFT_CODE_TTL_MINUTES".to_string(),
                value: minutes.clone(),
            })?;
            config.code_ttl = Duration::minutes(parsed);
        }
        if let Ok(secs) = env::var("BIOSIFT_SWEEP_INTERVAL_SECS") {
            let parsed = secs.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "BIOSIFT_SWEEP_INTERVAL_SECS".to_string(),
                value: secs.clone(),
            })?;
            config.sweep_interval = StdDuration::from_secs(parsed);
        }
        if let Ok(secs) = env::var("BIOSIFT_BACKUP_INTERVAL_SECS") {
            let parsed = secs.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "BIOSIFT_BACKUP_INTERVAL_SECS".to_string(),
                value: secs.clone(),
            })?;
            config.backup_interval = if parsed == 0 {
                None
            } else {
                Some(StdDuration::from_secs(parsed))
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_url != "memory:" {
            return Err(ConfigError::UnsupportedStoreUrl(self.store_url.clone()));
        }
        if self.code_ttl <= Duration::zero() {
            return Err(ConfigError::NonPositiveTtl);
        }
        Ok(())
    }
}
