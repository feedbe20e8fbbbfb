//! Best-trial selection, one winner per metric.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use sc_types::{DataError, OptimizationError, ScResult};

use crate::metric::MetricConfig;
use crate::search::ParameterSet;
use crate::trial::{Scores, Trial};

/// Winning trial for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// Every configured metric's score for the winning trial.
    pub scores: Scores,
    pub parameters: ParameterSet,
}

/// Final calibration artifact: `optimization_name -> MetricResult`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamResults(BTreeMap<String, MetricResult>);

impl ParamResults {
    pub fn get(&self, optimization_name: &str) -> Option<&MetricResult> {
        self.0.get(optimization_name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricResult)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameters of the trial that won `optimization_name`.
    pub fn parameters_for(&self, optimization_name: &str) -> ScResult<&ParameterSet> {
        self.get(optimization_name)
            .map(|result| &result.parameters)
            .ok_or_else(|| {
                sc_types::config_error!(
                    "no result for '{}'; available: {}",
                    optimization_name,
                    self.keys().collect::<Vec<_>>().join(", ")
                )
                .into()
            })
    }

    /// Write as pretty JSON. Fails if the file already exists.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ScResult<()> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        info!("Results written to {}", path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> ScResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let reader = BufReader::new(std::fs::File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Pick the best trial for every configured metric independently.
///
/// Trials are scanned in recording order; only a strictly better score
/// replaces the incumbent, so ties go to the earliest trial. NaN scores never
/// win.
pub fn select_best(trials: &[Trial], metrics: &MetricConfig) -> ScResult<ParamResults> {
    if trials.is_empty() {
        return Err(OptimizationError::NoTrials.into());
    }

    let mut results = BTreeMap::new();
    for spec in metrics.iter() {
        let name = spec.optimization_name.as_str();
        let mut best: Option<(&Trial, f64)> = None;

        for trial in trials {
            let Some(score) = trial.metrics.get(name).filter(|s| !s.is_nan()) else {
                continue;
            };
            match best {
                Some((_, incumbent)) if !spec.mode.is_better(score, incumbent) => {}
                _ => best = Some((trial, score)),
            }
        }

        let (trial, score) = best.ok_or_else(|| OptimizationError::NoValidTrial {
            metric: name.to_string(),
        })?;
        info!(
            "Best trial for {} ({}): #{} with {}",
            name,
            spec.mode.name(),
            trial.trial_number,
            score
        );

        let scores = metrics
            .names()
            .filter_map(|n| trial.metrics.get(n).map(|v| (n.to_string(), v)))
            .collect();
        results.insert(
            name.to_string(),
            MetricResult {
                scores,
                parameters: trial.parameters.clone(),
            },
        );
    }

    Ok(ParamResults(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{MetricKind, MetricSpec, Mode};
    use crate::trial::TrialContext;
    use chrono::Utc;
    use sc_types::ScError;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn trial(number: usize, scores: &[(&str, f64)], p50: f64) -> Trial {
        let context = TrialContext::new(Uuid::nil(), number);
        let parameters = ParameterSet::from([("p50".to_string(), p50)]);
        let metrics = scores.iter().map(|(n, v)| (n.to_string(), *v)).collect();
        Trial::completed(&context, parameters, metrics, Utc::now())
    }

    fn pd_config() -> MetricConfig {
        MetricConfig::new(vec![
            MetricSpec::new("PD-A", MetricKind::Mse, Mode::Min),
            MetricSpec::new("PD-B", MetricKind::Mse, Mode::Max),
        ])
        .unwrap()
    }

    fn pd_trials() -> Vec<Trial> {
        [0.5, 0.2, 0.8]
            .iter()
            .enumerate()
            .map(|(i, &err)| trial(i + 1, &[("PD-A", err), ("PD-B", err)], -(i as f64) - 1.0))
            .collect()
    }

    #[test]
    fn each_metric_picks_its_own_trial() {
        let results = select_best(&pd_trials(), &pd_config()).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.parameters_for("PD-A").unwrap()["p50"], -2.0);
        assert_eq!(results.parameters_for("PD-B").unwrap()["p50"], -3.0);
        assert_eq!(results.get("PD-A").unwrap().scores.get("PD-A"), Some(0.2));
        assert_eq!(results.get("PD-B").unwrap().scores.get("PD-A"), Some(0.8));
    }

    #[test]
    fn ties_keep_earliest_trial() {
        let trials = vec![
            trial(1, &[("PD-A", 0.3), ("PD-B", 0.3)], 1.0),
            trial(2, &[("PD-A", 0.3), ("PD-B", 0.3)], 2.0),
        ];
        let results = select_best(&trials, &pd_config()).unwrap();

        assert_eq!(results.parameters_for("PD-A").unwrap()["p50"], 1.0);
        assert_eq!(results.parameters_for("PD-B").unwrap()["p50"], 1.0);
    }

    #[test]
    fn nan_and_sentinel_scores() {
        let trials = vec![
            trial(1, &[("PD-A", f64::NAN), ("PD-B", f64::NAN)], 1.0),
            trial(2, &[("PD-A", 1e20), ("PD-B", -1e20)], 2.0),
            trial(3, &[("PD-A", 4.0), ("PD-B", 4.0)], 3.0),
        ];
        let results = select_best(&trials, &pd_config()).unwrap();

        assert_eq!(results.parameters_for("PD-A").unwrap()["p50"], 3.0);
        assert_eq!(results.parameters_for("PD-B").unwrap()["p50"], 3.0);
    }

    #[test]
    fn all_nan_is_an_error() {
        let trials = vec![trial(1, &[("PD-A", f64::NAN), ("PD-B", 1.0)], 1.0)];
        let err = select_best(&trials, &pd_config()).unwrap_err();
        assert!(matches!(
            err,
            ScError::Optimization(OptimizationError::NoValidTrial { ref metric }) if metric == "PD-A"
        ));
    }

    #[test]
    fn no_trials_is_an_error() {
        let err = select_best(&[], &pd_config()).unwrap_err();
        assert!(matches!(err, ScError::Optimization(OptimizationError::NoTrials)));
    }

    #[test]
    fn scores_exclude_unconfigured_metrics() {
        let trials = vec![trial(1, &[("PD-A", 0.1), ("PD-B", 0.2), ("extra", 9.0)], 1.0)];
        let results = select_best(&trials, &pd_config()).unwrap();

        let scores = &results.get("PD-A").unwrap().scores;
        assert_eq!(scores.len(), 2);
        assert_eq!(scores.get("extra"), None);
    }

    #[test]
    fn results_file_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let results = select_best(&pd_trials(), &pd_config()).unwrap();

        results.to_json_file(&path).unwrap();
        assert!(results.to_json_file(&path).is_err());

        let loaded = ParamResults::load(&path).unwrap();
        assert_eq!(loaded, results);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["PD-A"]["parameters"]["p50"], -2.0);
        assert_eq!(json["PD-B"]["scores"]["PD-B"], 0.8);
    }

    #[test]
    fn nan_side_scores_reload() {
        let config = MetricConfig::new(vec![
            MetricSpec::new("PD", MetricKind::Mse, Mode::Min),
            MetricSpec::new("E", MetricKind::Mse, Mode::Min),
        ])
        .unwrap();
        let trials = vec![
            trial(1, &[("PD", 0.1), ("E", f64::NAN)], -2.0),
            trial(2, &[("PD", 0.4), ("E", 0.3)], -1.0),
        ];
        let results = select_best(&trials, &config).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        results.to_json_file(&path).unwrap();

        let loaded = ParamResults::load(&path).unwrap();
        let pd = loaded.get("PD").unwrap();
        assert_eq!(pd.scores.get("PD"), Some(0.1));
        assert!(pd.scores.get("E").unwrap().is_nan());
        assert_eq!(loaded.parameters_for("PD").unwrap()["p50"], -2.0);
        assert_eq!(loaded.parameters_for("E").unwrap()["p50"], -1.0);
    }

    #[test]
    fn unknown_key_lists_available() {
        let results = select_best(&pd_trials(), &pd_config()).unwrap();
        let message = results.parameters_for("E").unwrap_err().to_string();
        assert!(message.contains("PD-A, PD-B"));
    }
}
