//! Calibration run configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use sc_types::{config_error, DataError, ScResult};

use crate::metric::{MetricConfig, RawMetricConfig};
use crate::search::{RawSearchSpace, SearchSpace, StrategyKind};

fn default_num_worker() -> i64 {
    4
}

fn default_num_samples() -> usize {
    100
}

fn default_population() -> usize {
    1
}

fn default_start_day() -> i64 {
    201
}

fn default_end_day() -> i64 {
    236
}

fn default_strategy() -> String {
    "bayesian".to_string()
}

fn default_exploration_weight() -> f64 {
    0.3
}

fn default_seed() -> u64 {
    42
}

fn default_day_column() -> String {
    "julian-day".to_string()
}

/// The config file as written on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCalibrationConfig {
    pub space: RawSearchSpace,
    pub metric: RawMetricConfig,
    /// Worker threads; zero or negative uses every available core.
    #[serde(default = "default_num_worker")]
    pub num_worker: i64,
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    /// 1-based parameter table row the calibration writes to.
    #[serde(default = "default_population")]
    pub population: usize,
    #[serde(default = "default_start_day")]
    pub start_day: i64,
    #[serde(default = "default_end_day")]
    pub end_day: i64,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_exploration_weight")]
    pub exploration_weight: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_day_column")]
    pub day_column: String,
}

/// Validated calibration settings.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    pub space: SearchSpace,
    pub metrics: MetricConfig,
    pub num_worker: usize,
    pub num_samples: usize,
    pub population: usize,
    pub start_day: i64,
    pub end_day: i64,
    pub strategy: StrategyKind,
    pub exploration_weight: f64,
    pub seed: u64,
    pub day_column: String,
}

impl CalibrationConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ScResult<Self> {
        let path = path.as_ref();
        info!("Loading calibration config from: {}", path.display());
        if !path.exists() {
            return Err(DataError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &serde_json::Value) -> ScResult<Self> {
        let raw: RawCalibrationConfig = serde_json::from_value(value.clone())?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawCalibrationConfig) -> ScResult<Self> {
        if raw.start_day > raw.end_day {
            return Err(config_error!(
                "start_day ({}) is after end_day ({})",
                raw.start_day,
                raw.end_day
            )
            .into());
        }
        if raw.population == 0 {
            return Err(config_error!("population is 1-based and must be at least 1").into());
        }
        if raw.num_samples == 0 {
            return Err(config_error!("num_samples must be at least 1").into());
        }
        if !(0.0..=1.0).contains(&raw.exploration_weight) {
            return Err(config_error!(
                "exploration_weight must be within [0, 1], got {}",
                raw.exploration_weight
            )
            .into());
        }

        let space = SearchSpace::from_raw(&raw.space)?;
        if space.is_empty() {
            return Err(config_error!("search space has no parameters").into());
        }
        let metrics = MetricConfig::from_raw(&raw.metric)?;
        let strategy = StrategyKind::from_name(&raw.strategy)?;
        let num_worker = resolve_workers(raw.num_worker);

        info!(
            "Calibrating {} parameters against {} metrics: {} samples, {} workers, {} search",
            space.len(),
            metrics.len(),
            raw.num_samples,
            num_worker,
            raw.strategy
        );

        Ok(Self {
            space,
            metrics,
            num_worker,
            num_samples: raw.num_samples,
            population: raw.population,
            start_day: raw.start_day,
            end_day: raw.end_day,
            strategy,
            exploration_weight: raw.exploration_weight,
            seed: raw.seed,
            day_column: raw.day_column,
        })
    }
}

fn resolve_workers(requested: i64) -> usize {
    if requested > 0 {
        return requested as usize;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
