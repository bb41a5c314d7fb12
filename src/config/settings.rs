//! TOML-based configuration for keystone.
//!
//! Supports a config file (keystone.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [discovery]
//! concurrency = 5
//! acceptance_confidence = 0.7
//! prior_inference_confidence = 0.85
//! prior_orphan_tolerance = 0.01
//! stats_concurrency = 1
//!
//! [oracle]
//! endpoint = "https://api.openai.com/v1/chat/completions"
//! model = "gpt-4o-mini"
//! api_key = "${OPENAI_API_KEY}"
//! timeout_seconds = 60
//!
//! [worker]
//! path = "/usr/local/bin/keystone-worker"
//! timeout_seconds = 30
//!
//! [store]
//! path = "/var/lib/keystone/relationships.db"
//!
//! [datasources.6f1c2a7e-8d8b-4a55-9d0e-3c1f0b6c2d11]
//! driver = "postgres"
//! connection_string = "${WAREHOUSE_URL}"
//! ```
//!
//! The discovery section is handed to the orchestrator as an explicit value;
//! nothing reads configuration from process-wide state during a run.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Datasource not configured: {0}")]
    DatasourceNotFound(Uuid),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Discovery tuning passed to the orchestrator.
    pub discovery: DiscoverySettings,

    /// Semantic oracle client.
    pub oracle: OracleSettings,

    /// Database worker process.
    pub worker: WorkerSettings,

    /// Relationship store location.
    pub store: StoreSettings,

    /// Datasource connections keyed by datasource id.
    pub datasources: HashMap<Uuid, DatasourceSettings>,
}

/// Discovery tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Oracle worker pool size.
    pub concurrency: usize,

    /// Minimum oracle confidence for an accepted verdict to be persisted.
    pub acceptance_confidence: f64,

    /// Minimum classifier confidence for a prior inference to be re-validated
    /// with join statistics instead of the oracle.
    pub prior_inference_confidence: f64,

    /// Largest orphan fraction a prior inference may show and still be kept.
    pub prior_orphan_tolerance: f64,

    /// Parallel statistics queries per run (1 = sequential).
    pub stats_concurrency: usize,

    /// Sample values fetched per column.
    pub sample_limit: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            acceptance_confidence: 0.7,
            prior_inference_confidence: 0.85,
            prior_orphan_tolerance: 0.01,
            stats_concurrency: 1,
            sample_limit: crate::metadata::MAX_SAMPLE_VALUES,
        }
    }
}

impl DiscoverySettings {
    /// Check ranges before a run starts.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.concurrency == 0 {
            return Err(SettingsError::InvalidConfig(
                "discovery.concurrency must be at least 1".to_string(),
            ));
        }
        if self.stats_concurrency == 0 {
            return Err(SettingsError::InvalidConfig(
                "discovery.stats_concurrency must be at least 1".to_string(),
            ));
        }
        if self.sample_limit == 0 || self.sample_limit > crate::metadata::MAX_SAMPLE_VALUES {
            return Err(SettingsError::InvalidConfig(format!(
                "discovery.sample_limit must be between 1 and {}",
                crate::metadata::MAX_SAMPLE_VALUES
            )));
        }
        for (name, value) in [
            ("acceptance_confidence", self.acceptance_confidence),
            ("prior_inference_confidence", self.prior_inference_confidence),
            ("prior_orphan_tolerance", self.prior_orphan_tolerance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SettingsError::InvalidConfig(format!(
                    "discovery.{} must be within 0.0..=1.0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Semantic oracle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OracleSettings {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,

    /// Model name.
    pub model: String,

    /// API key (supports ${ENV_VAR} expansion).
    pub api_key: Option<String>,

    /// Per-request timeout.
    pub timeout_seconds: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_seconds: 60,
        }
    }
}

impl OracleSettings {
    /// Get the API key with environment variables expanded.
    pub fn resolved_api_key(&self) -> Result<Option<String>, SettingsError> {
        self.api_key.as_deref().map(expand_env_vars).transpose()
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to worker binary.
    pub path: Option<String>,

    /// Extra command-line arguments for the worker.
    pub args: Vec<String>,

    /// Per-request timeout.
    pub timeout_seconds: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            path: None,
            args: Vec::new(),
            timeout_seconds: 30,
        }
    }
}

/// Relationship store settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite database path. Defaults to `<data dir>/keystone/relationships.db`.
    pub path: Option<String>,
}

impl StoreSettings {
    /// Resolve the store path, expanding environment variables.
    pub fn resolved_path(&self) -> Result<PathBuf, SettingsError> {
        if let Some(path) = &self.path {
            return Ok(PathBuf::from(expand_env_vars(path)?));
        }
        let base = dirs::data_dir().ok_or_else(|| {
            SettingsError::InvalidConfig("no data directory, set store.path".to_string())
        })?;
        Ok(base.join("keystone").join("relationships.db"))
    }
}

/// Datasource connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasourceSettings {
    /// Worker driver name (postgres, mssql, duckdb, ...).
    pub driver: String,

    /// Connection string (supports ${ENV_VAR} expansion).
    pub connection_string: String,
}

impl DatasourceSettings {
    /// Get the SQL dialect for the driver.
    pub fn dialect(&self) -> Result<Dialect, SettingsError> {
        Dialect::from_driver(&self.driver)
            .ok_or_else(|| SettingsError::UnsupportedDriver(self.driver.clone()))
    }

    /// Get the connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.discovery.validate()?;
        Ok(settings)
    }

    /// Load settings from `$KEYSTONE_CONFIG`, `./keystone.toml` or
    /// `<config dir>/keystone/config.toml`, first match wins. Defaults apply
    /// when none exist.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("KEYSTONE_CONFIG") {
            return Self::from_file(path);
        }

        let user_config = dirs::config_dir().map(|dir| dir.join("keystone").join("config.toml"));
        match std::iter::once(PathBuf::from("keystone.toml"))
            .chain(user_config)
            .find(|p| p.exists())
        {
            Some(path) => Self::from_file(path),
            None => Ok(Settings::default()),
        }
    }

    /// Get a datasource by id.
    pub fn get_datasource(&self, id: Uuid) -> Result<&DatasourceSettings, SettingsError> {
        self.datasources
            .get(&id)
            .ok_or(SettingsError::DatasourceNotFound(id))
    }
}

static ENV_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(?:\{([^}]*)\}|([A-Za-z0-9_]+))").unwrap());

/// Expand `${VAR}` and `$VAR` references. A `$` not followed by a name is
/// kept as is; an unset variable is an error.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut last = 0;

    for caps in ENV_REF.captures_iter(s) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
            continue;
        };
        result.push_str(&s[last..whole.start()]);
        let value = env::var(name.as_str())
            .map_err(|_| SettingsError::MissingEnvVar(name.as_str().to_string()))?;
        result.push_str(&value);
        last = whole.end();
    }
    result.push_str(&s[last..]);

    Ok(result)
}
