//! Trial records and optimization run status.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::search::ParameterSet;

/// Unique optimization run identifier.
pub type OptimizationId = Uuid;

/// Per-metric scores in metric-config order.
///
/// Serialized as a JSON object whose keys keep that order. JSON has no NaN,
/// so a NaN score is written as `null` and read back as NaN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scores(Vec<(String, f64)>);

impl Scores {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Set a score, replacing any previous value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for Scores {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut scores = Scores::new();
        for (name, value) in iter {
            scores.insert(name, value);
        }
        scores
    }
}

impl Serialize for Scores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Scores {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Key order is not preserved through serde_json's default map.
        let map = std::collections::BTreeMap::<String, Option<f64>>::deserialize(deserializer)?;
        Ok(map
            .into_iter()
            .map(|(name, value)| (name, value.unwrap_or(f64::NAN)))
            .collect())
    }
}

/// Identity of a trial handed to the model while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialContext {
    pub id: Uuid,
    pub optimization_id: OptimizationId,
    pub trial_number: usize,
}

impl TrialContext {
    pub fn new(optimization_id: OptimizationId, trial_number: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            optimization_id,
            trial_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Completed,
    /// The simulator failed; every metric holds its sentinel score.
    Failed,
}

/// A single evaluated parameter configuration. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub optimization_id: OptimizationId,
    pub trial_number: usize,
    pub parameters: ParameterSet,
    pub metrics: Scores,
    pub status: TrialStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl Trial {
    pub fn completed(
        context: &TrialContext,
        parameters: ParameterSet,
        metrics: Scores,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: context.id,
            optimization_id: context.optimization_id,
            trial_number: context.trial_number,
            parameters,
            metrics,
            status: TrialStatus::Completed,
            started_at,
            finished_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(
        context: &TrialContext,
        parameters: ParameterSet,
        metrics: Scores,
        started_at: DateTime<Utc>,
        error: String,
    ) -> Self {
        Self {
            status: TrialStatus::Failed,
            error: Some(error),
            ..Self::completed(context, parameters, metrics, started_at)
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == TrialStatus::Failed
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Lifecycle state for an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Aggregate status of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStatus {
    pub id: OptimizationId,
    pub name: String,
    pub state: OptimizationState,
    pub trials_completed: usize,
    pub trials_failed: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl OptimizationStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: OptimizationState::Pending,
            trials_completed: 0,
            trials_failed: 0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = OptimizationState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = OptimizationState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = OptimizationState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Count a recorded trial.
    pub fn record(&mut self, trial: &Trial) {
        match trial.status {
            TrialStatus::Completed => self.trials_completed += 1,
            TrialStatus::Failed => self.trials_failed += 1,
        }
    }

    pub fn total_trials(&self) -> usize {
        self.trials_completed + self.trials_failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: &[(&str, f64)]) -> Scores {
        values.iter().map(|(n, v)| (n.to_string(), *v)).collect()
    }

    #[test]
    fn scores_keep_config_order() {
        let s = scores(&[("PD-B", 0.8), ("PD-A", 0.5), ("E", 1.0)]);
        assert_eq!(s.names().collect::<Vec<_>>(), vec!["PD-B", "PD-A", "E"]);

        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"PD-B":0.8,"PD-A":0.5,"E":1.0}"#);
    }

    #[test]
    fn nan_scores_survive_json() {
        let s = scores(&[("PD", 0.1), ("E", f64::NAN)]);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"PD":0.1,"E":null}"#);

        let back: Scores = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("PD"), Some(0.1));
        assert!(back.get("E").unwrap().is_nan());
    }

    #[test]
    fn scores_insert_replaces() {
        let mut s = scores(&[("PD", 0.5)]);
        s.insert("PD", 0.25);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get("PD"), Some(0.25));
        assert_eq!(s.get("E"), None);
    }

    #[test]
    fn optimization_status_lifecycle() {
        let mut status = OptimizationStatus::new("pressures");

        assert_eq!(status.state, OptimizationState::Pending);
        assert!(status.started_at.is_none());

        status.mark_running();
        assert_eq!(status.state, OptimizationState::Running);
        assert!(status.started_at.is_some());

        status.mark_completed();
        assert_eq!(status.state, OptimizationState::Completed);
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn trial_failure_is_counted() {
        let context = TrialContext::new(Uuid::new_v4(), 0);
        let started = Utc::now();
        let ok = Trial::completed(&context, ParameterSet::new(), scores(&[("PD", 0.1)]), started);
        let failed = Trial::failed(
            &context,
            ParameterSet::new(),
            scores(&[("PD", 1e20)]),
            started,
            "simulator exited with status 1".into(),
        );

        assert!(!ok.is_failed());
        assert!(failed.is_failed());
        assert_eq!(failed.error.as_deref(), Some("simulator exited with status 1"));
        assert!(failed.duration_seconds() >= 0.0);

        let mut status = OptimizationStatus::new("run");
        status.record(&ok);
        status.record(&failed);
        assert_eq!(status.trials_completed, 1);
        assert_eq!(status.trials_failed, 1);
        assert_eq!(status.total_trials(), 2);
    }
}
