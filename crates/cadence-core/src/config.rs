use chrono::FixedOffset;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CadenceError, Result};
use crate::types::{parse_utc_offset, ScheduleTime};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Reference timezone of the deployment (IST).
pub const DEFAULT_UTC_OFFSET: &str = "+05:30";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
/// Off-peak wall-clock mark for the daily cycle recompute.
pub const DEFAULT_DAILY_RECOMPUTE_AT: &str = "00:05";
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RESULT_CHANNEL_CAPACITY: usize = 256;

/// Top-level config (cadence.toml + CADENCE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Sweep scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed offset of the reference timezone all schedule strings are read in.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// `HH:MM` in the reference timezone.
    #[serde(default = "default_daily_recompute_at")]
    pub daily_recompute_at: String,
    /// Upper bound on any single store call; elapsed calls count as transient failures.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Start the sweep as soon as the gateway boots.
    #[serde(default = "bool_true")]
    pub autostart: bool,
    #[serde(default = "default_result_channel_capacity")]
    pub result_channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            utc_offset: default_utc_offset(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            daily_recompute_at: default_daily_recompute_at(),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            autostart: true,
            result_channel_capacity: DEFAULT_RESULT_CHANNEL_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.utc_offset)
    }

    pub fn daily_recompute_time(&self) -> Result<ScheduleTime> {
        ScheduleTime::parse(&self.daily_recompute_at).map_err(|e| {
            CadenceError::Config(format!("scheduler.daily_recompute_at: {e}"))
        })
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.offset()?;
        self.daily_recompute_time()?;
        if self.sweep_interval_secs == 0 {
            return Err(CadenceError::Config(
                "scheduler.sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.store_timeout_ms == 0 {
            return Err(CadenceError::Config(
                "scheduler.store_timeout_ms must be positive".to_string(),
            ));
        }
        if self.result_channel_capacity == 0 {
            return Err(CadenceError::Config(
                "scheduler.result_channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_utc_offset() -> String {
    DEFAULT_UTC_OFFSET.to_string()
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_daily_recompute_at() -> String {
    DEFAULT_DAILY_RECOMPUTE_AT.to_string()
}
fn default_store_timeout_ms() -> u64 {
    DEFAULT_STORE_TIMEOUT_MS
}
fn default_result_channel_capacity() -> usize {
    DEFAULT_RESULT_CHANNEL_CAPACITY
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.db", home)
}

impl CadenceConfig {
    /// Load config from a TOML file with CADENCE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.cadence/cadence.toml
    ///
    /// Nested keys use a double underscore, e.g.
    /// `CADENCE_SCHEDULER__SWEEP_INTERVAL_SECS=10`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading config");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("CADENCE_").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: CadenceConfig = figment
            .extract()
            .map_err(|e| CadenceError::Config(e.to_string()))?;
        config.scheduler.validate()?;
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_defaults() {
        let config = CadenceConfig::from_figment(Figment::new()).unwrap();
        assert_eq!(config.gateway.port, DEFAULT_PORT);
        assert_eq!(config.scheduler.sweep_interval_secs, 30);
        assert_eq!(config.scheduler.daily_recompute_at, "00:05");
        assert_eq!(config.scheduler.offset().unwrap().local_minus_utc(), 19_800);
        assert!(config.scheduler.autostart);
    }

    #[test]
    fn toml_overrides_scheduler_section() {
        let toml = r#"
            [scheduler]
            utc_offset = "-03:00"
            sweep_interval_secs = 10
            daily_recompute_at = "03:15"
        "#;
        let config = CadenceConfig::from_figment(Figment::new().merge(Toml::string(toml))).unwrap();
        assert_eq!(config.scheduler.sweep_interval_secs, 10);
        assert_eq!(config.scheduler.offset().unwrap().local_minus_utc(), -10_800);
        assert_eq!(
            config.scheduler.daily_recompute_time().unwrap().minute_of_day(),
            195
        );
        // untouched fields keep their defaults
        assert_eq!(config.scheduler.store_timeout_ms, DEFAULT_STORE_TIMEOUT_MS);
    }

    #[test]
    fn invalid_scheduler_settings_are_rejected() {
        for toml in [
            "[scheduler]\nsweep_interval_secs = 0",
            "[scheduler]\ndaily_recompute_at = \"24:05\"",
            "[scheduler]\nutc_offset = \"IST\"",
            "[scheduler]\nresult_channel_capacity = 0",
        ] {
            let err = CadenceConfig::from_figment(Figment::new().merge(Toml::string(toml)))
                .unwrap_err();
            assert_eq!(err.code(), "CONFIG_ERROR");
        }
    }
}
