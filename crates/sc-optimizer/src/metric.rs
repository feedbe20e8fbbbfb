//! Error metrics and the metric configuration of a calibration run.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use sc_types::{ConfigError, ScResult};

/// Score assigned to every metric of a failed trial, signed so that it is
/// the worst possible value under the metric's mode.
pub const SENTINEL_SCORE: f64 = 1e20;

/// Whether we are minimizing or maximizing a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Min,
    Max,
}

impl Mode {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_lowercase().as_str() {
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            _ => Err(ConfigError::UnknownMode {
                mode: name.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    /// The score recorded for a failed trial.
    pub fn sentinel(&self) -> f64 {
        match self {
            Self::Min => SENTINEL_SCORE,
            Self::Max => -SENTINEL_SCORE,
        }
    }

    /// Whether `candidate` strictly improves on `incumbent`.
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Min => candidate < incumbent,
            Self::Max => candidate > incumbent,
        }
    }

    /// Map a score so that lower is always better.
    pub fn orient(&self, value: f64) -> f64 {
        match self {
            Self::Min => value,
            Self::Max => -value,
        }
    }
}

/// Supported error functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Mean squared error.
    Mse,
    /// Root mean squared error.
    Rmse,
    /// Mean absolute error.
    Mae,
    /// Mean of `predicted - observed`.
    Bias,
    /// Squared Pearson correlation.
    R2,
    /// Nash–Sutcliffe efficiency.
    Nse,
}

impl MetricKind {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_lowercase().as_str() {
            "mse" => Ok(Self::Mse),
            "rmse" => Ok(Self::Rmse),
            "mae" => Ok(Self::Mae),
            "bias" => Ok(Self::Bias),
            "r2" => Ok(Self::R2),
            "nse" => Ok(Self::Nse),
            _ => Err(ConfigError::UnknownMetric {
                kind: name.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Mse => "mse",
            Self::Rmse => "rmse",
            Self::Mae => "mae",
            Self::Bias => "bias",
            Self::R2 => "r2",
            Self::Nse => "nse",
        }
    }

    /// Apply the error function to paired observed/predicted series.
    ///
    /// Empty input yields `NaN`; a missing prediction (`NaN`) propagates.
    pub fn evaluate(&self, observed: &[f64], predicted: &[f64]) -> f64 {
        debug_assert_eq!(observed.len(), predicted.len());
        match self {
            Self::Mse => mean(observed.iter().zip(predicted).map(|(o, p)| (p - o).powi(2))),
            Self::Rmse => Self::Mse.evaluate(observed, predicted).sqrt(),
            Self::Mae => mean(observed.iter().zip(predicted).map(|(o, p)| (p - o).abs())),
            Self::Bias => mean(observed.iter().zip(predicted).map(|(o, p)| p - o)),
            Self::R2 => pearson(observed, predicted).powi(2),
            Self::Nse => {
                let obs_mean = mean(observed.iter().copied());
                let ss_res: f64 = observed.iter().zip(predicted).map(|(o, p)| (o - p).powi(2)).sum();
                let ss_tot: f64 = observed.iter().map(|o| (o - obs_mean).powi(2)).sum();
                1.0 - ss_res / ss_tot
            }
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    sum / count as f64
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let mx = mean(x.iter().copied());
    let my = mean(y.iter().copied());
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    sxy / (sxx * syy).sqrt()
}

/// Ground-truth column for an optimization name.
///
/// The text after the last hyphen is a disambiguating suffix (`"PD-A"` →
/// `"PD"`). Names without a hyphen, or whose last hyphen is the first
/// character, are used unchanged.
pub fn ground_truth_column(optimization_name: &str) -> &str {
    match optimization_name.rfind('-') {
        Some(idx) if idx > 0 => &optimization_name[..idx],
        _ => optimization_name,
    }
}

/// One optimized metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Unique name reported to the trial tracker.
    pub optimization_name: String,
    /// Column compared in ground truth and simulator output.
    pub ground_truth_column: String,
    pub kind: MetricKind,
    pub mode: Mode,
}

impl MetricSpec {
    pub fn new(optimization_name: impl Into<String>, kind: MetricKind, mode: Mode) -> Self {
        let optimization_name = optimization_name.into();
        let ground_truth_column = ground_truth_column(&optimization_name).to_string();
        Self {
            optimization_name,
            ground_truth_column,
            kind,
            mode,
        }
    }

    pub fn evaluate(&self, observed: &[f64], predicted: &[f64]) -> f64 {
        self.kind.evaluate(observed, predicted)
    }
}

/// The metric config fragment: three positionally aligned arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetricConfig {
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub modes: Vec<String>,
}

/// Ordered list of metrics, each with its mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricConfig {
    metrics: Vec<MetricSpec>,
}

impl MetricConfig {
    pub fn new(metrics: Vec<MetricSpec>) -> ScResult<Self> {
        let mut seen = HashSet::new();
        for metric in &metrics {
            if !seen.insert(metric.optimization_name.as_str()) {
                return Err(ConfigError::DuplicateMetric {
                    name: metric.optimization_name.clone(),
                }
                .into());
            }
        }
        Ok(Self { metrics })
    }

    pub fn from_raw(raw: &RawMetricConfig) -> ScResult<Self> {
        if raw.metrics.len() != raw.params.len() || raw.metrics.len() != raw.modes.len() {
            return Err(ConfigError::LengthMismatch {
                metrics: raw.metrics.len(),
                params: raw.params.len(),
                modes: raw.modes.len(),
            }
            .into());
        }
        if raw.metrics.is_empty() {
            return Err(sc_types::config_error!("at least one metric is required").into());
        }

        let metrics = raw
            .metrics
            .iter()
            .zip(&raw.params)
            .zip(&raw.modes)
            .map(|((kind, name), mode)| {
                Ok(MetricSpec::new(
                    name.clone(),
                    MetricKind::from_name(kind)?,
                    Mode::from_name(mode)?,
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Self::new(metrics)
    }

    pub fn from_json(value: &serde_json::Value) -> ScResult<Self> {
        let raw: RawMetricConfig = serde_json::from_value(value.clone())?;
        Self::from_raw(&raw)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSpec> {
        self.metrics.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|m| m.optimization_name.as_str())
    }

    pub fn get(&self, optimization_name: &str) -> Option<&MetricSpec> {
        self.metrics
            .iter()
            .find(|m| m.optimization_name == optimization_name)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyphen_suffix_is_stripped() {
        assert_eq!(ground_truth_column("PD-A"), "PD");
        assert_eq!(ground_truth_column("P-PD.a"), "P");
        assert_eq!(ground_truth_column("leaf-temp-max"), "leaf-temp");
        assert_eq!(ground_truth_column("PD"), "PD");
        assert_eq!(ground_truth_column("-PD"), "-PD");
    }

    #[test]
    fn error_functions() {
        let observed = [1.0, 2.0, 3.0, 4.0];
        let predicted = [2.0, 2.0, 2.0, 6.0];

        assert_eq!(MetricKind::Mse.evaluate(&observed, &predicted), 1.5);
        assert!((MetricKind::Rmse.evaluate(&observed, &predicted) - 1.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(MetricKind::Mae.evaluate(&observed, &predicted), 1.0);
        assert_eq!(MetricKind::Bias.evaluate(&observed, &predicted), 0.5);
        // ss_res = 6, ss_tot = 5
        assert!((MetricKind::Nse.evaluate(&observed, &predicted) - (1.0 - 6.0 / 5.0)).abs() < 1e-12);

        let perfect = MetricKind::R2.evaluate(&observed, &[2.0, 4.0, 6.0, 8.0]);
        assert!((perfect - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_input_is_nan() {
        for kind in [MetricKind::Mse, MetricKind::Rmse, MetricKind::Mae, MetricKind::R2] {
            assert!(kind.evaluate(&[], &[]).is_nan(), "{}", kind.name());
        }
    }

    #[test]
    fn mode_orientation_and_sentinels() {
        assert_eq!(Mode::Min.sentinel(), 1e20);
        assert_eq!(Mode::Max.sentinel(), -1e20);
        assert!(Mode::Min.is_better(0.1, 0.2));
        assert!(Mode::Max.is_better(0.3, 0.2));
        assert!(!Mode::Max.is_better(0.2, 0.2));
        assert_eq!(Mode::Max.orient(0.8), -0.8);
        assert_eq!(Mode::from_name("MAX").unwrap(), Mode::Max);
        assert!(Mode::from_name("maximize").is_err());
    }

    #[test]
    fn config_from_json() {
        let value = serde_json::json!({
            "metrics": ["rmse", "R2"],
            "params": ["PD-A", "PD-B"],
            "modes": ["min", "max"]
        });
        let config = MetricConfig::from_json(&value).unwrap();

        assert_eq!(config.len(), 2);
        assert_eq!(config.names().collect::<Vec<_>>(), vec!["PD-A", "PD-B"]);
        let b = config.get("PD-B").unwrap();
        assert_eq!(b.ground_truth_column, "PD");
        assert_eq!(b.kind, MetricKind::R2);
        assert_eq!(b.mode, Mode::Max);
    }

    #[test]
    fn config_rejects_length_mismatch() {
        let value = serde_json::json!({
            "metrics": ["rmse", "mae"],
            "params": ["PD"],
            "modes": ["min", "min"]
        });
        let err = MetricConfig::from_json(&value).unwrap_err();
        assert!(matches!(
            err,
            sc_types::ScError::Config(ConfigError::LengthMismatch { metrics: 2, params: 1, modes: 2 })
        ));
    }

    #[test]
    fn config_rejects_unknown_kind_mode_and_duplicates() {
        let unknown_kind = serde_json::json!({"metrics": ["mape"], "params": ["PD"], "modes": ["min"]});
        assert!(MetricConfig::from_json(&unknown_kind).is_err());

        let unknown_mode = serde_json::json!({"metrics": ["mae"], "params": ["PD"], "modes": ["up"]});
        assert!(MetricConfig::from_json(&unknown_mode).is_err());

        let duplicate = serde_json::json!({
            "metrics": ["mae", "rmse"],
            "params": ["PD", "PD"],
            "modes": ["min", "min"]
        });
        assert!(matches!(
            MetricConfig::from_json(&duplicate).unwrap_err(),
            sc_types::ScError::Config(ConfigError::DuplicateMetric { .. })
        ));
    }
}
