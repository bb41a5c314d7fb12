//! Configuration module for keystone.
//!
//! Handles the TOML settings file and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, DatasourceSettings, DiscoverySettings, OracleSettings, Settings,
    SettingsError, StoreSettings, WorkerSettings,
};
