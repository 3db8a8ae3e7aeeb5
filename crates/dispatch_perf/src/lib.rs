//! # Horizon Dispatch Perf
//!
//! Benchmark harness for `horizon_dispatch`. Each run builds fresh buses and
//! measures:
//!
//! * subscribe/unsubscribe churn
//! * publishing to one subscriber and to many
//! * config pool growth under mixed plain, cancelable and filtered publishes
//! * async publishing
//!
//! ## Configuration
//!
//! Settings come from the TOML file named by `DISPATCH_PERF_CONFIG`
//! (default: `dispatch_perf.toml`). A default file is created when missing.
//!
//! ```toml
//! [workload]
//! subscriber_count = 100
//! publish_count = 10000
//!
//! [report]
//! path = "run.json"
//! ```

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub mod config;
pub mod harness;
pub mod logging;

pub use config::{AppConfig, LoggingSettings, ReportSettings, WorkloadSettings};
pub use harness::{AllocationReport, HarnessReport, ScenarioReport};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "DISPATCH_PERF_CONFIG";

const DEFAULT_CONFIG: &str = "dispatch_perf.toml";

/// Resolves the configuration path from an optional environment value.
pub fn config_path(from_env: Option<String>) -> PathBuf {
    from_env
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

/// Writes the report as pretty JSON.
pub async fn write_report(report: &HarnessReport, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("writing report to {}", path.display()))?;
    info!("📝 Report written to {}", path.display());
    Ok(())
}

/// Runs the harness end to end: configuration, logging, workloads, report.
pub async fn init() -> anyhow::Result<()> {
    let path = config_path(std::env::var(CONFIG_ENV).ok());
    let config = AppConfig::load_from_file(&path).await?;

    if let Err(e) = logging::setup_logging(&config.logging) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = config.validate() {
        error!("❌ Invalid configuration: {}", e);
        std::process::exit(1);
    }

    logging::display_banner();
    info!(
        "🚀 Running workloads: {} subscribers, {} publishes, {} churn rounds",
        config.workload.subscriber_count, config.workload.publish_count, config.workload.churn_rounds
    );

    let report = harness::run_all(&config).await?;

    if let Some(path) = &config.report.path {
        write_report(&report, path).await?;
    }

    info!("✅ All workloads completed");
    Ok(())
}
