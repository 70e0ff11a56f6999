//! Configuration management.
//!
//! Settings are loaded with the `config` crate from `config/{name}.toml`
//! (default `config/default.toml`). Every field has a sensible default so a
//! partial file, or `Settings::default()` in tests, works out of the box.

use crate::error::OsaError;
use config::Config;
use serde::Deserialize;
use std::time::Duration;

/// Top-level application settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    /// Log filter passed to `env_logger` (e.g. "info", "debug").
    pub log_level: String,
    /// Instrument link and protocol settings.
    pub instrument: InstrumentSettings,
}

/// Settings for the single instrument link.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InstrumentSettings {
    /// VISA resource string of the analyzer (e.g. "GPIB0::3::INSTR").
    pub resource_string: String,
    /// Per-query response timeout on the transport.
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
    /// Sweep-completion polling discipline.
    pub sweep: SweepSettings,
    /// Resolution bandwidth bounds; these vary by firmware revision.
    pub resolution_limits: ResolutionLimits,
}

/// How sweep completion is polled after `SGL`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SweepSettings {
    /// Delay between consecutive `SWEEP?` status queries.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Maximum number of status polls before the sweep is declared timed
    /// out. The default covers the instrument's documented maximum sweep
    /// time with margin.
    pub max_polls: u32,
}

/// Valid range for the `RESLN` resolution bandwidth command.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResolutionLimits {
    /// Smallest accepted resolution in nm.
    pub min_nm: f64,
    /// Largest accepted resolution in nm.
    pub max_nm: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            instrument: InstrumentSettings::default(),
        }
    }
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            resource_string: "GPIB0::3::INSTR".to_string(),
            query_timeout: Duration::from_secs(5),
            sweep: SweepSettings::default(),
            resolution_limits: ResolutionLimits::default(),
        }
    }
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_polls: 120,
        }
    }
}

impl Default for ResolutionLimits {
    fn default() -> Self {
        Self {
            min_nm: 0.01,
            max_nm: 2.0,
        }
    }
}

impl Settings {
    /// Load settings from `config/{config_name}.toml`, falling back to
    /// `config/default.toml` when no name is given.
    pub fn new(config_name: Option<&str>) -> Result<Self, OsaError> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        Self::from_file(&config_path)
    }

    /// Load settings from an explicit path (without extension).
    pub fn from_file(path: &str) -> Result<Self, OsaError> {
        let s = Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .map_err(OsaError::Config)?;

        s.try_deserialize().map_err(OsaError::Config)
    }
}
