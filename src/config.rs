// src/config.rs
//! Runtime configuration.
//!
//! Sources, later ones win:
//! 1. Built-in defaults
//! 2. `credledger.toml` in the working directory (optional)
//! 3. Environment variables `CREDLEDGER__<SECTION>__<KEY>`, e.g.
//!    `CREDLEDGER__PIPELINE__MAX_ATTEMPTS=5`

use crate::zkp::proof_verification::DEFAULT_REPLAY_RETENTION_SECS;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Concurrent issuance jobs
    pub workers: usize,
    /// Submission attempts per job, the first one included
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub confirmation_timeout_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 5,
            backoff_base_ms: 200,
            confirmation_timeout_secs: 30,
        }
    }
}

impl PipelineSettings {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProofSettings {
    pub default_ttl_secs: i64,
    /// How long a consumed proof hash is remembered for replay detection
    pub replay_retention_secs: i64,
}

impl Default for ProofSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            replay_retention_secs: DEFAULT_REPLAY_RETENTION_SECS,
        }
    }
}

impl ProofSettings {
    pub fn default_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.default_ttl_secs)
    }

    pub fn replay_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.replay_retention_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerificationSettings {
    pub default_ttl_secs: i64,
    pub callback_timeout_ms: u64,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: 3600,
            callback_timeout_ms: 5000,
        }
    }
}

impl VerificationSettings {
    pub fn default_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.default_ttl_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Key of the trust registry administrator
    pub admin_key: String,
    /// Hex secret of the operator signing key; a fresh key is generated when absent
    pub operator_key_hex: Option<String>,
    /// Default `env_logger` filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Period of the background expiry sweeps
    pub sweep_interval_secs: u64,
    pub pipeline: PipelineSettings,
    pub proofs: ProofSettings,
    pub verification: VerificationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            admin_key: String::new(),
            operator_key_hex: None,
            log_level: "info".into(),
            sweep_interval_secs: 60,
            pipeline: PipelineSettings::default(),
            proofs: ProofSettings::default(),
            verification: VerificationSettings::default(),
        }
    }
}

impl Settings {
    /// Loads defaults, `credledger.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("credledger").required(false))
            .add_source(environment())
            .build()?;
        Self::finish(config)
    }

    /// Loads from a TOML document only; used by tests and tooling.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.workers == 0 {
            return Err(ConfigError::Message("pipeline.workers must be at least 1".into()));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(ConfigError::Message(
                "pipeline.max_attempts must be at least 1".into(),
            ));
        }
        if self.proofs.default_ttl_secs <= 0
            || self.proofs.replay_retention_secs <= 0
            || self.verification.default_ttl_secs <= 0
        {
            return Err(ConfigError::Message("ttl values must be positive".into()));
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix("CREDLEDGER")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
