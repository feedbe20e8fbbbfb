//! Objective evaluation: simulator output against ground truth.

use sc_types::{EvaluationError, ScResult, Table};
use tracing::debug;

use crate::metric::{MetricConfig, MetricSpec};
use crate::trial::Scores;

/// Observed values of one metric inside the day window, with the row index
/// each value came from.
#[derive(Debug, Clone, PartialEq)]
struct GroundSlice {
    rows: Vec<usize>,
    values: Vec<f64>,
}

/// Scores simulator output against a fixed ground-truth table.
///
/// The ground-truth slices are computed once when the evaluator is built and
/// shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct ObjectiveEvaluator {
    metrics: MetricConfig,
    slices: Vec<GroundSlice>,
}

impl ObjectiveEvaluator {
    /// Restrict the ground truth to `start_day..=end_day` (by `day_column`)
    /// and precompute one slice per metric.
    ///
    /// Rows with a missing day or a missing observation are dropped; the
    /// remaining rows keep their original index for alignment.
    pub fn new(
        ground: &Table,
        day_column: &str,
        start_day: i64,
        end_day: i64,
        metrics: MetricConfig,
    ) -> ScResult<Self> {
        let days = ground
            .column(day_column)
            .ok_or_else(|| EvaluationError::MissingGroundColumn {
                column: day_column.to_string(),
            })?;

        let in_window: Vec<usize> = days
            .iter()
            .enumerate()
            .filter_map(|(row, day)| {
                day.filter(|d| *d >= start_day as f64 && *d <= end_day as f64)
                    .map(|_| row)
            })
            .collect();

        let mut slices = Vec::with_capacity(metrics.len());
        for spec in metrics.iter() {
            let column = ground.column(&spec.ground_truth_column).ok_or_else(|| {
                EvaluationError::MissingGroundColumn {
                    column: spec.ground_truth_column.clone(),
                }
            })?;

            let (rows, values) = in_window
                .iter()
                .filter_map(|&row| column[row].map(|v| (row, v)))
                .unzip();
            let slice = GroundSlice { rows, values };

            debug!(
                "Ground truth for {} ({}): {} rows in days {}..={}",
                spec.optimization_name,
                spec.ground_truth_column,
                slice.rows.len(),
                start_day,
                end_day
            );
            slices.push(slice);
        }

        Ok(Self { metrics, slices })
    }

    pub fn metrics(&self) -> &MetricConfig {
        &self.metrics
    }

    /// Number of aligned ground-truth rows for a metric.
    pub fn slice_len(&self, optimization_name: &str) -> Option<usize> {
        self.metrics
            .iter()
            .position(|spec| spec.optimization_name == optimization_name)
            .map(|idx| self.slices[idx].rows.len())
    }

    /// Score one simulator output. `None` means the simulator failed and every
    /// metric gets its mode's sentinel.
    pub fn evaluate(&self, output: Option<&Table>) -> ScResult<Scores> {
        let Some(output) = output else {
            return Ok(self.sentinel_scores());
        };

        let mut scores = Scores::new();
        for (spec, slice) in self.metrics.iter().zip(&self.slices) {
            let predicted = Self::aligned_prediction(spec, slice, output)?;
            scores.insert(
                spec.optimization_name.clone(),
                spec.evaluate(&slice.values, &predicted),
            );
        }
        Ok(scores)
    }

    /// Scores of a failed trial.
    pub fn sentinel_scores(&self) -> Scores {
        self.metrics
            .iter()
            .map(|spec| (spec.optimization_name.clone(), spec.mode.sentinel()))
            .collect()
    }

    fn aligned_prediction(
        spec: &MetricSpec,
        slice: &GroundSlice,
        output: &Table,
    ) -> ScResult<Vec<f64>> {
        let column = output.column(&spec.ground_truth_column).ok_or_else(|| {
            EvaluationError::MissingOutputColumn {
                metric: spec.optimization_name.clone(),
                column: spec.ground_truth_column.clone(),
            }
        })?;

        slice
            .rows
            .iter()
            .map(|&row| match column.get(row) {
                // A missing prediction poisons the score rather than shifting
                // the alignment.
                Some(value) => Ok(value.unwrap_or(f64::NAN)),
                None => Err(EvaluationError::Alignment {
                    metric: spec.optimization_name.clone(),
                    row,
                    rows: column.len(),
                }
                .into()),
            })
            .collect()
    }
}
