//! Configuration file support for dashboard-migrator
//!
//! Reads from .dashboard-migrator/config.toml, or from an explicit path given
//! with `--config` / `DASHBOARD_MIGRATOR_CONFIG`.

use crate::error::{MigrateError, Result};
use crate::mutator::RewriteMode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default API endpoint of the hosted service
pub const DEFAULT_SERVER_URL: &str = "https://api.cluvio.com";

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Server endpoint and timeouts
    #[serde(default)]
    pub server: ServerConfig,

    /// How filter tokens are rewritten in report queries
    #[serde(default)]
    pub rewrite: RewriteConfig,

    /// Naming conventions used when cloning dashboards per customer
    #[serde(default)]
    pub duplicate: DuplicateConfig,

    /// Customer targets for `duplicate`, in fan-out order
    #[serde(default)]
    pub customers: Vec<CustomerTarget>,
}

/// Server-related configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Base URL of the API
    /// Default: https://api.cluvio.com
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Overall per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// (overall, connect) timeouts, with env var overrides applied
    pub fn timeouts(&self) -> (Duration, Duration) {
        let timeout_secs = std::env::var("DASHBOARD_MIGRATOR_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(self.timeout_secs);
        let connect_secs = std::env::var("DASHBOARD_MIGRATOR_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(self.connect_timeout_secs);
        (
            Duration::from_secs(timeout_secs),
            Duration::from_secs(connect_secs),
        )
    }
}

/// Filter rewrite configuration
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct RewriteConfig {
    /// `literal` (plain substring replacement) or `token_boundary`
    #[serde(default)]
    pub mode: RewriteMode,
}

/// Duplication naming configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DuplicateConfig {
    /// Substring of the source dashboard name replaced by the customer name
    /// Default: "Standard"
    #[serde(default = "default_name_placeholder")]
    pub name_placeholder: String,

    /// Filter name used by source dashboards, rewritten to the customer key
    /// Default: "standard"
    #[serde(default = "default_source_filter")]
    pub source_filter: String,
}

fn default_name_placeholder() -> String {
    "Standard".to_string()
}

fn default_source_filter() -> String {
    "standard".to_string()
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            name_placeholder: default_name_placeholder(),
            source_filter: default_source_filter(),
        }
    }
}

/// One customer a dashboard is cloned for
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CustomerTarget {
    /// Short key, also the customer's filter name (`filter_<key>`)
    pub key: String,
    /// Display name substituted into the cloned dashboard's name
    pub name: String,
    /// Datasource the customer's reports are bound to
    pub datasource: String,
}

impl Config {
    /// Resolve configuration for this run
    ///
    /// An explicit path (argument, then `DASHBOARD_MIGRATOR_CONFIG`) must exist
    /// and parse. Otherwise the nearest `.dashboard-migrator/config.toml` is
    /// used, falling back to defaults when there is none.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Ok(path) = std::env::var("DASHBOARD_MIGRATOR_CONFIG") {
            return Self::load_from(Path::new(&path));
        }
        match Self::find_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
            .map_err(|e| MigrateError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse config from TOML text
    pub fn from_toml_str(contents: &str) -> std::result::Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(".dashboard-migrator").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    /// Check the customer mapping before any remote call is made
    pub fn validate_customers(&self) -> Result<()> {
        if self.customers.is_empty() {
            return Err(MigrateError::Config(
                "No customers configured. Add [[customers]] entries to the config file.".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for customer in &self.customers {
            if customer.key.trim().is_empty() {
                return Err(MigrateError::Config("Customer with empty key".to_string()));
            }
            if customer.datasource.trim().is_empty() {
                return Err(MigrateError::Config(format!(
                    "Customer '{}' has no datasource",
                    customer.key
                )));
            }
            if !seen.insert(customer.key.as_str()) {
                return Err(MigrateError::Config(format!(
                    "Customer '{}' is listed more than once",
                    customer.key
                )));
            }
        }
        Ok(())
    }

    /// Customer keys in fan-out order
    pub fn customer_keys(&self) -> Vec<&str> {
        self.customers.iter().map(|c| c.key.as_str()).collect()
    }
}
