//! Console and per-run log file output.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{DeploymentConfig, LogConfig};
use crate::error::Result;

pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("deployment_{}.log", started.format("%Y%m%d_%H%M%S"))
}

/// `--log-level` wins over `RUST_LOG`, which wins over the config file.
pub fn filter_directive(cli_level: Option<&str>, config: &LogConfig) -> String {
    cli_level
        .map(str::to_string)
        .or_else(|| std::env::var("RUST_LOG").ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| config.level.clone())
}

/// installs the global subscriber and returns the path of this run's log file.
pub fn init(cli_level: Option<&str>, config: &LogConfig) -> Result<PathBuf> {
    std::fs::create_dir_all(&config.dir)?;
    let path = config.dir.join(log_file_name(Local::now()));
    let file = File::create(&path)?;

    let env_filter = EnvFilter::try_new(filter_directive(cli_level, config)).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)));
    // already set when embedded in a process that installed its own subscriber
    let _ = tracing::subscriber::set_global_default(registry);
    Ok(path)
}

pub fn banner(config: &DeploymentConfig) {
    info!(
        region = %config.region,
        domain = %config.domain_name,
        frontend = %config.frontend_domain(),
        backend = %config.backend_domain(),
        "Starting deployment"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_is_timestamped() {
        let started = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(log_file_name(started), "deployment_20260304_050607.log");
    }

    #[test]
    fn cli_level_wins() {
        let config = LogConfig::default();
        assert_eq!(filter_directive(Some("debug"), &config), "debug");
    }
}
