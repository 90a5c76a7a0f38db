//! Configuration loading for the catalog services
//!
//! Resolution priority, highest first:
//! 1. Command-line argument (path passed by the binary)
//! 2. `LUMO_CONFIG` environment variable
//! 3. `~/.config/lumo/catalog.toml`
//! 4. Compiled defaults
//!
//! Individual keys may additionally be overridden with `LUMO_*` environment
//! variables after the file is loaded.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn default_max_workers() -> usize {
    7
}

fn default_upstream_timeout_seconds() -> u64 {
    5
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_retry_backoff_initial_ms() -> u64 {
    200
}

fn default_change_threshold_fraction() -> f64 {
    0.5
}

fn default_sweep_orphans() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1:5870".to_string()
}

/// Catalog service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Run ingest loaders on a bounded worker pool instead of serially
    #[serde(default)]
    pub parallel: bool,

    /// Worker pool size for parallel ingest
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-request timeout for upstream calls
    #[serde(default = "default_upstream_timeout_seconds")]
    pub upstream_timeout_seconds: u64,

    /// Retry budget for transient upstream failures
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Initial backoff delay, doubled per attempt
    #[serde(default = "default_retry_backoff_initial_ms")]
    pub retry_backoff_initial_ms: u64,

    /// Partners whose editorial fields are owned by an external publisher;
    /// ingestion only overwrites the fields it owns for these
    #[serde(default)]
    pub publisher_managed_partners: BTreeSet<String>,

    /// Sanity bound on destructive changes: an ingest that would delete a
    /// larger fraction of existing sellable records is rejected
    #[serde(default = "default_change_threshold_fraction")]
    pub change_threshold_fraction: f64,

    /// Sweep unreferenced images/videos after a full ingest
    #[serde(default = "default_sweep_orphans")]
    pub sweep_orphans: bool,

    /// HTTP bind address for the operational surface
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Database file path; `None` selects the platform default
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_workers: default_max_workers(),
            upstream_timeout_seconds: default_upstream_timeout_seconds(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_backoff_initial_ms: default_retry_backoff_initial_ms(),
            publisher_managed_partners: BTreeSet::new(),
            change_threshold_fraction: default_change_threshold_fraction(),
            sweep_orphans: default_sweep_orphans(),
            bind_address: default_bind_address(),
            database_path: None,
        }
    }
}

impl CatalogConfig {
    /// Load configuration, trying the explicit path first, then the
    /// environment, then the user config directory, then defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = cli_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("LUMO_CONFIG").ok().map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match path {
            Some(ref p) if p.exists() => {
                let content = std::fs::read_to_string(p)?;
                let parsed: CatalogConfig = toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Parse {} failed: {}", p.display(), e)))?;
                info!("Loaded configuration from {}", p.display());
                parsed
            }
            Some(ref p) => {
                warn!("Config file {} not found, using defaults", p.display());
                CatalogConfig::default()
            }
            None => CatalogConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `LUMO_*` environment overrides for the most operationally
    /// relevant keys
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LUMO_PARALLEL") {
            self.parallel = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("LUMO_MAX_WORKERS") {
            match v.parse() {
                Ok(n) => self.max_workers = n,
                Err(_) => warn!("Ignoring invalid LUMO_MAX_WORKERS value: {}", v),
            }
        }
        if let Ok(v) = std::env::var("LUMO_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("LUMO_BIND_ADDRESS") {
            self.bind_address = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.change_threshold_fraction) {
            return Err(Error::Config(
                "change_threshold_fraction must be within [0.0, 1.0]".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolved database path, falling back to the platform default
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Default config file location: `~/.config/lumo/catalog.toml`
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lumo").join("catalog.toml"))
}

/// Default database location: `<data dir>/lumo/catalog.db`
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("lumo"))
        .unwrap_or_else(|| PathBuf::from("./lumo_data"))
        .join("catalog.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CatalogConfig::default();
        assert!(!config.parallel);
        assert_eq!(config.max_workers, 7);
        assert_eq!(config.upstream_timeout_seconds, 5);
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(config.retry_backoff_initial_ms, 200);
        assert!(config.sweep_orphans);
    }

    #[test]
    fn parses_partial_toml() {
        let parsed: CatalogConfig = toml::from_str(
            r#"
            parallel = true
            max_workers = 3
            publisher_managed_partners = ["edu"]
            "#,
        )
        .unwrap();
        assert!(parsed.parallel);
        assert_eq!(parsed.max_workers, 3);
        assert!(parsed.publisher_managed_partners.contains("edu"));
        assert_eq!(parsed.retry_max_attempts, 5);
    }

    #[test]
    fn rejects_zero_workers() {
        let config = CatalogConfig {
            max_workers: 0,
            ..CatalogConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
