//! # sc-optimizer
//!
//! Parameter search and parallel calibration runs for SimCal.
//!
//! Provides reparameterized distributions, search space definitions, search
//! strategies (random, Bayesian-style local search), metric specifications,
//! the objective evaluator, trial tracking, the multi-objective selector and
//! the worker-pool optimizer that ties them together.

mod config;
mod distribution;
mod evaluate;
mod metric;
mod optimize;
mod search;
mod select;
mod trial;

pub use config::{CalibrationConfig, RawCalibrationConfig};
pub use distribution::{
    Distribution, DistributionKind, DistributionSpec, NormalDistribution, Reparameterize,
    TruncatedNormalDistribution, UniformDistribution, DEFAULT_LOWER_BOUND, DEFAULT_UPPER_BOUND,
    EPSILON,
};
pub use evaluate::ObjectiveEvaluator;
pub use metric::{
    ground_truth_column, MetricConfig, MetricKind, MetricSpec, Mode, RawMetricConfig,
    SENTINEL_SCORE,
};
pub use optimize::{Model, OptimizationOutcome, Optimizer};
pub use search::{
    BayesianSearch, ParameterSet, RandomSearch, RawDistribution, RawSearchSpace, SearchSpace,
    SearchStrategy, StrategyKind,
};
pub use select::{select_best, MetricResult, ParamResults};
pub use trial::{
    OptimizationId, OptimizationState, OptimizationStatus, Scores, Trial, TrialContext,
    TrialStatus,
};
