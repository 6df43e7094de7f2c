//! Service configuration
//!
//! Read from a YAML file (default `config/config.yaml`), then overridden by
//! environment variables:
//!   - `DATA_DIR`: directory of per-sailing CSV files
//!   - `SUMMARY_FILE`: per-sailing summary CSV
//!   - `AUTH_FILE`: credential YAML
//!   - `PORT`: listen port
//!
//! A missing config file is not an error; built-in defaults apply.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::{MetricCatalog, MetricCategory};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub auth: AuthConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Whole round-trip timeout applied to every request
    pub request_timeout_secs: u64,
    /// Idle time after which a review-triage session is dropped
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            request_timeout_secs: 10,
            session_idle_secs: 30 * 60,
        }
    }
}

/// File layout of the per-sailing response tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataLayout {
    /// One `<Ship> - anything.csv` per sailing, text from the review column
    #[default]
    Plain,
    /// `ratings_<suffix>.csv` + `reasons_<suffix>.csv` pairs
    Paired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    pub summary_file: PathBuf,
    pub layout: DataLayout,
    pub review_column: String,
    pub reason_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/reviews"),
            summary_file: PathBuf::from("data/sailing_summaries.csv"),
            layout: DataLayout::Plain,
            review_column: "Review".to_string(),
            reason_column: "Reason".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub auth_file: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_file: PathBuf::from("sailing_auth.yaml"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub attributes: Vec<String>,
    pub categories: Vec<MetricCategory>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let catalog = MetricCatalog::default();
        Self {
            attributes: catalog.metrics().to_vec(),
            categories: catalog.categories().to_vec(),
        }
    }
}

impl AppConfig {
    /// Load from `path` if it exists, otherwise start from defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file {:?} not found; using built-in defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_yaml(&contents).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        if config.metrics.attributes.is_empty() {
            anyhow::bail!("metrics.attributes must list at least one metric");
        }
        Ok(config)
    }

    /// Apply `DATA_DIR` / `SUMMARY_FILE` / `AUTH_FILE` / `PORT` overrides
    ///
    /// `lookup` is `std::env::var` in the binary and a map in tests.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DATA_DIR") {
            self.data.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("SUMMARY_FILE") {
            self.data.summary_file = PathBuf::from(file);
        }
        if let Some(file) = lookup("AUTH_FILE") {
            self.auth.auth_file = PathBuf::from(file);
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{}'", port))?;
        }
        Ok(())
    }

    pub fn catalog(&self) -> MetricCatalog {
        MetricCatalog::new(self.metrics.attributes.clone(), self.metrics.categories.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  port: 8080
data:
  layout: paired
metrics:
  attributes: ["Entertainment", "Excursions"]
  categories:
    - name: Experience
      metrics: ["Entertainment", "Excursions"]
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.request_timeout_secs, 10);
        assert_eq!(config.data.layout, DataLayout::Paired);
        assert_eq!(config.data.review_column, "Review");

        let catalog = config.catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.category_of("Excursions"), Some("Experience"));
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let yaml = "metrics:\n  attributes: []\n";
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("DATA_DIR", "/srv/reviews"), ("PORT", "7000")]
            .into_iter()
            .collect();
        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.data.data_dir, PathBuf::from("/srv/reviews"));
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.auth.auth_file, PathBuf::from("sailing_auth.yaml"));

        let mut bad = AppConfig::default();
        assert!(bad.apply_overrides(|k| (k == "PORT").then(|| "ship".to_string())).is_err());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.catalog(), MetricCatalog::default());
        assert_eq!(config.data.layout, DataLayout::Plain);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/config.yaml")).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.catalog(), MetricCatalog::default());
    }
}
