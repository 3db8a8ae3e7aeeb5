//! Configuration management for the dispatch performance harness.
//!
//! Settings are loaded from a TOML file; a default file is written when the
//! requested one does not exist yet.

use anyhow::Context;
use horizon_dispatch::DispatchSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Harness configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Settings handed to the bus under test
    #[serde(default)]
    pub dispatch: DispatchSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Workload sizes
    #[serde(default)]
    pub workload: WorkloadSettings,
    /// Where the run report goes
    #[serde(default)]
    pub report: ReportSettings,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

/// How much work each scenario does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSettings {
    /// Subscribers created by the churn and fan-out scenarios
    #[serde(default = "default_subscriber_count")]
    pub subscriber_count: usize,
    /// Publishes per publishing scenario
    #[serde(default = "default_publish_count")]
    pub publish_count: usize,
    /// Subscribe/unsubscribe rounds in the churn scenario
    #[serde(default = "default_churn_rounds")]
    pub churn_rounds: usize,
}

fn default_subscriber_count() -> usize {
    100
}

fn default_publish_count() -> usize {
    10_000
}

fn default_churn_rounds() -> usize {
    1_000
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            subscriber_count: default_subscriber_count(),
            publish_count: default_publish_count(),
            churn_rounds: default_churn_rounds(),
        }
    }
}

/// Run report output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    /// JSON report file; nothing is written when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl AppConfig {
    /// Loads configuration from a TOML file, creating a default one if the
    /// file doesn't exist.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for logical consistency.
    pub fn validate(&self) -> Result<(), String> {
        self.dispatch.validate().map_err(|e| e.to_string())?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if self.workload.subscriber_count == 0 {
            return Err("workload.subscriber_count must be greater than 0".to_string());
        }
        if self.workload.publish_count == 0 {
            return Err("workload.publish_count must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workload.subscriber_count, 100);
        assert_eq!(config.workload.publish_count, 10_000);
        assert_eq!(config.dispatch.pool_capacity, 16);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.workload.publish_count = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.dispatch.pool_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("pool_capacity"));
    }

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [workload]
            publish_count = 50

            [dispatch]
            preallocate = 4

            [report]
            path = "run.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.workload.publish_count, 50);
        assert_eq!(config.workload.subscriber_count, 100);
        assert_eq!(config.dispatch.preallocate, 4);
        assert_eq!(config.dispatch.pool_capacity, 16);
        assert_eq!(config.logging, LoggingSettings::default());
        assert_eq!(config.report.path, Some(PathBuf::from("run.json")));
    }

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatch_perf.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn existing_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        let mut custom = AppConfig::default();
        custom.workload.subscriber_count = 7;
        custom.logging.json_format = true;
        tokio::fs::write(&path, toml::to_string_pretty(&custom).unwrap())
            .await
            .unwrap();

        let loaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(loaded, custom);
    }

    #[tokio::test]
    async fn malformed_file_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        tokio::fs::write(&path, "workload = [").await.unwrap();

        let err = AppConfig::load_from_file(&path).await.unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }
}
