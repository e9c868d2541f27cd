//! Service configuration types.

use serde::{Deserialize, Serialize};

use crate::types::{Geometry, SeriesKind};

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Regions whose forecasts the daemon keeps warm.
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionConfig>,

    /// Earth imagery provider settings.
    #[serde(default)]
    pub earth: EarthConfig,

    /// Weather archive provider settings.
    #[serde(default)]
    pub meteo: MeteoConfig,

    /// Cache TTLs.
    #[serde(default)]
    pub cache: CacheTtlConfig,

    /// Task lifecycle parameters.
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Daemon loop intervals (seconds).
    #[serde(default)]
    pub timing: TimingConfig,
}

/// A region the daemon forecasts on a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Human-readable name.
    pub name: String,
    /// Region of interest.
    pub geometry: Geometry,
    /// Vegetation index to forecast.
    #[serde(default = "default_index")]
    pub index: SeriesKind,
    /// Forecast horizon in months.
    #[serde(default = "default_periods")]
    pub periods: usize,
    /// Fit a seasonal model (12-month period).
    #[serde(default)]
    pub seasonal: bool,
    /// Years of history to train on.
    #[serde(default = "default_history_years")]
    pub history_years: u32,
}

/// Earth imagery analytics API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarthConfig {
    /// Base URL of the imagery time-series endpoint.
    #[serde(default)]
    pub base_url: String,

    /// API key sent with every request.
    #[serde(default)]
    pub api_key: String,
}

/// Weather archive API (Open-Meteo compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteoConfig {
    #[serde(default = "default_meteo_url")]
    pub base_url: String,
}

/// Cache TTLs per domain class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    /// Raw historical series (days). History barely changes; keep it long.
    #[serde(default = "default_raw_ttl_days")]
    pub raw_ttl_days: u64,

    /// Fitted models (days). Model quality assumptions age faster than raw
    /// history, so this is shorter.
    #[serde(default = "default_model_ttl_days")]
    pub model_ttl_days: u64,
}

/// Task lifecycle parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Wall-clock limit per task in seconds; 0 disables the timeout.
    #[serde(default = "default_task_timeout")]
    pub timeout_secs: u64,

    /// How long finished tasks stay pollable before pruning.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// Largest accepted forecast horizon in months.
    #[serde(default = "default_max_periods")]
    pub max_periods: usize,
}

/// Daemon loop intervals (all seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How often scheduled region forecasts are resubmitted.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// How often expired cache entries and stale tasks are swept.
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_index() -> SeriesKind {
    SeriesKind::Ndvi
}

fn default_periods() -> usize {
    12
}

fn default_history_years() -> u32 {
    2
}

fn default_meteo_url() -> String {
    "https://archive-api.open-meteo.com/v1/archive".into()
}

fn default_raw_ttl_days() -> u64 {
    30
}

fn default_model_ttl_days() -> u64 {
    7
}

fn default_task_timeout() -> u64 {
    600
}

fn default_retention() -> u64 {
    86_400
}

fn default_max_periods() -> usize {
    24
}

fn default_refresh_interval() -> u64 {
    21_600
}

fn default_maintenance_interval() -> u64 {
    3_600
}

fn default_regions() -> Vec<RegionConfig> {
    vec![
        RegionConfig {
            name: "Nakuru West".into(),
            geometry: Geometry::polygon(vec![vec![
                [35.94, -0.42],
                [36.12, -0.42],
                [36.12, -0.25],
                [35.94, -0.25],
                [35.94, -0.42],
            ]]),
            index: SeriesKind::Ndvi,
            periods: default_periods(),
            seasonal: false,
            history_years: default_history_years(),
        },
        RegionConfig {
            name: "Machakos Uplands".into(),
            geometry: Geometry::polygon(vec![vec![
                [37.20, -1.60],
                [37.40, -1.60],
                [37.40, -1.42],
                [37.20, -1.42],
                [37.20, -1.60],
            ]]),
            index: SeriesKind::Ndvi,
            periods: default_periods(),
            seasonal: true,
            history_years: 4,
        },
    ]
}

impl Default for EarthConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
        }
    }
}

impl Default for MeteoConfig {
    fn default() -> Self {
        Self {
            base_url: default_meteo_url(),
        }
    }
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            raw_ttl_days: default_raw_ttl_days(),
            model_ttl_days: default_model_ttl_days(),
        }
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_task_timeout(),
            retention_secs: default_retention(),
            max_periods: default_max_periods(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            maintenance_interval_secs: default_maintenance_interval(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            regions: default_regions(),
            earth: EarthConfig::default(),
            meteo: MeteoConfig::default(),
            cache: CacheTtlConfig::default(),
            tasks: TasksConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}
