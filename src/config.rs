//! Engine configuration.
//!
//! Resolution order, later wins:
//!
//! 1. Compiled defaults
//! 2. TOML config file
//! 3. Environment variables (`WARDGATE_*`, via `dotenvy`)
//!
//! ```rust,ignore
//! use wardgate::config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .with_file("wardgate.toml")?
//!     .with_env()
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::security::DEFAULT_TOKEN_TTL_MINUTES;

/// Errors during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {source}")]
    Parse {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to parse environment variable {key}: {message}")]
    EnvParse { key: String, message: String },
}

/// Which backend serves the shared (L2) policy cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

/// Policy-cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub backend: CacheBackend,
    /// Connection string for the Redis backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            backend: CacheBackend::Memory,
            redis_url: None,
        }
    }
}

/// Trust-engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TrustConfig {
    pub decay_half_life_days: f64,
    pub signal_rate_limit_per_hour: u32,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            decay_half_life_days: 182.0,
            signal_rate_limit_per_hour: 120,
        }
    }
}

/// Security-gate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SecurityConfig {
    /// Per-tier maximum access-token TTL in minutes, T0..T5.
    pub tier_token_ttl_minutes: [u64; 6],
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            tier_token_ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
        }
    }
}

/// Escalation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EscalationConfig {
    pub default_timeout_minutes: u32,
    pub timeout_scan_seconds: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            default_timeout_minutes: 30,
            timeout_scan_seconds: 60,
        }
    }
}

/// Proof-chain settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ProofConfig {
    /// Events per Merkle batch.
    pub batch_size: usize,
    /// Capacity of the delivery queue before appends degrade to
    /// synchronous delivery.
    pub queue_capacity: usize,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            queue_capacity: 1024,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "snake_case")]
pub struct WardgateConfig {
    pub cache: CacheConfig,
    pub trust: TrustConfig,
    pub security: SecurityConfig,
    pub escalation: EscalationConfig,
    pub proof: ProofConfig,
}

/// Builder layering file and environment sources over the defaults.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    base: WardgateConfig,
    use_env: bool,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TOML config file as the base layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.base = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            source: Box::new(e),
        })?;
        Ok(self)
    }

    /// Apply `WARDGATE_*` environment overrides at build time.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Resolve the final configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EnvParse`] when an override variable does not
    /// parse.
    pub fn build(mut self) -> Result<WardgateConfig, ConfigError> {
        if self.use_env {
            dotenvy::dotenv().ok();
            apply_env(&mut self.base)?;
        }
        Ok(self.base)
    }
}

fn apply_env(config: &mut WardgateConfig) -> Result<(), ConfigError> {
    fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
        match std::env::var(key) {
            Ok(raw) => raw.parse().map(Some).map_err(|_| ConfigError::EnvParse {
                key: key.to_string(),
                message: format!("could not parse `{raw}`"),
            }),
            Err(_) => Ok(None),
        }
    }

    if let Some(ttl) = parse_var::<u64>("WARDGATE_CACHE_TTL_SECONDS")? {
        config.cache.ttl_seconds = ttl;
    }
    if let Ok(backend) = std::env::var("WARDGATE_CACHE_BACKEND") {
        config.cache.backend = match backend.as_str() {
            "memory" => CacheBackend::Memory,
            "redis" => CacheBackend::Redis,
            other => {
                return Err(ConfigError::EnvParse {
                    key: "WARDGATE_CACHE_BACKEND".into(),
                    message: format!("expected `memory` or `redis`, got `{other}`"),
                });
            }
        };
    }
    if let Ok(url) = std::env::var("WARDGATE_CACHE_REDIS_URL") {
        config.cache.redis_url = Some(url);
    }
    if let Some(days) = parse_var::<f64>("WARDGATE_TRUST_DECAY_HALF_LIFE_DAYS")? {
        config.trust.decay_half_life_days = days;
    }
    if let Some(limit) = parse_var::<u32>("WARDGATE_TRUST_SIGNAL_RATE_LIMIT_PER_HOUR")? {
        config.trust.signal_rate_limit_per_hour = limit;
    }
    if let Some(minutes) = parse_var::<u32>("WARDGATE_ESCALATION_DEFAULT_TIMEOUT_MINUTES")? {
        config.escalation.default_timeout_minutes = minutes;
    }
    if let Some(seconds) = parse_var::<u64>("WARDGATE_ESCALATION_TIMEOUT_SCAN_SECONDS")? {
        config.escalation.timeout_scan_seconds = seconds;
    }
    if let Some(size) = parse_var::<usize>("WARDGATE_PROOF_BATCH_SIZE")? {
        config.proof.batch_size = size;
    }
    Ok(())
}
