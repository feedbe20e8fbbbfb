//! Parallel calibration run: a bounded worker pool asks the strategy for
//! parameters, runs the model, scores the output and streams trials back to
//! the coordinator.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use sc_types::{internal_error, OptimizationError, ScResult, Table};

use crate::config::CalibrationConfig;
use crate::evaluate::ObjectiveEvaluator;
use crate::search::{ParameterSet, SearchStrategy};
use crate::select::{select_best, ParamResults};
use crate::trial::{OptimizationId, OptimizationStatus, Trial, TrialContext};

/// Anything that turns a parameter set into a time-step output table.
///
/// An error is a failed simulation: the trial is recorded with sentinel
/// scores and the run continues.
pub trait Model: Sync {
    fn run(&self, context: &TrialContext, parameters: &ParameterSet) -> ScResult<Table>;
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub status: OptimizationStatus,
    /// Trials in recording (arrival) order.
    pub trials: Vec<Trial>,
    pub results: ParamResults,
}

pub struct Optimizer {
    name: String,
    evaluator: ObjectiveEvaluator,
    strategy: Mutex<Box<dyn SearchStrategy>>,
    num_worker: usize,
    num_samples: usize,
}

impl Optimizer {
    pub fn new(
        name: impl Into<String>,
        evaluator: ObjectiveEvaluator,
        strategy: Box<dyn SearchStrategy>,
        num_worker: usize,
        num_samples: usize,
    ) -> Self {
        Self {
            name: name.into(),
            evaluator,
            strategy: Mutex::new(strategy),
            num_worker: num_worker.max(1),
            num_samples,
        }
    }

    /// Build the evaluator and strategy described by `config`.
    pub fn from_config(
        name: impl Into<String>,
        config: &CalibrationConfig,
        ground: &Table,
    ) -> ScResult<Self> {
        let evaluator = ObjectiveEvaluator::new(
            ground,
            &config.day_column,
            config.start_day,
            config.end_day,
            config.metrics.clone(),
        )?;
        let strategy = config.strategy.build(
            Arc::new(config.space.clone()),
            config.seed,
            config.exploration_weight,
        );
        Ok(Self::new(
            name,
            evaluator,
            strategy,
            config.num_worker,
            config.num_samples,
        ))
    }

    pub fn evaluator(&self) -> &ObjectiveEvaluator {
        &self.evaluator
    }

    /// Run every trial, then select the best one per metric.
    ///
    /// Simulation failures degrade single trials. The first evaluation error
    /// stops further dispatch and is returned once all workers have joined.
    pub fn run<M: Model>(&self, model: &M) -> ScResult<OptimizationOutcome> {
        let mut status = OptimizationStatus::new(self.name.clone());
        status.mark_running();

        let workers = self.num_worker.min(self.num_samples).max(1);
        info!(
            "Starting optimization {} ({}): {} trials on {} workers with {} search",
            status.name,
            status.id,
            self.num_samples,
            workers,
            self.strategy.lock().name()
        );

        let next_trial = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let (tx, rx) = crossbeam_channel::unbounded::<ScResult<Trial>>();

        let optimization_id = status.id;
        let mut trials = Vec::with_capacity(self.num_samples);
        let mut first_error = None;

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let tx = tx.clone();
                    let next_trial = &next_trial;
                    let stop = &stop;
                    scope.spawn(move || {
                        self.worker_loop(worker, model, optimization_id, next_trial, stop, tx)
                    })
                })
                .collect();
            drop(tx);

            for result in rx {
                match result {
                    Ok(trial) => {
                        status.record(&trial);
                        trials.push(trial);
                    }
                    Err(e) => {
                        stop.store(true, Ordering::SeqCst);
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }

            for handle in handles {
                if handle.join().is_err() && first_error.is_none() {
                    first_error = Some(
                        OptimizationError::Worker {
                            message: "worker thread panicked".to_string(),
                        }
                        .into(),
                    );
                }
            }
        });

        if let Some(e) = first_error {
            status.mark_failed(e.to_string());
            warn!(
                "Optimization {} failed after {} trials: {}",
                status.name,
                status.total_trials(),
                e
            );
            return Err(e);
        }

        let results = match select_best(&trials, self.evaluator.metrics()) {
            Ok(results) => results,
            Err(e) => {
                status.mark_failed(e.to_string());
                return Err(e);
            }
        };
        status.mark_completed();
        info!(
            "Optimization {} finished: {} completed, {} failed",
            status.name, status.trials_completed, status.trials_failed
        );

        Ok(OptimizationOutcome {
            status,
            trials,
            results,
        })
    }

    fn worker_loop<M: Model>(
        &self,
        worker: usize,
        model: &M,
        optimization_id: OptimizationId,
        next_trial: &AtomicUsize,
        stop: &AtomicBool,
        tx: Sender<ScResult<Trial>>,
    ) {
        debug!("Worker {} started", worker);
        while !stop.load(Ordering::SeqCst) {
            let trial_number = next_trial.fetch_add(1, Ordering::SeqCst);
            if trial_number >= self.num_samples {
                break;
            }

            let result = self.run_trial(model, optimization_id, trial_number);
            if result.is_err() {
                stop.store(true, Ordering::SeqCst);
            }
            if tx.send(result).is_err() {
                break;
            }
        }
        debug!("Worker {} finished", worker);
    }

    fn run_trial<M: Model>(
        &self,
        model: &M,
        optimization_id: OptimizationId,
        trial_number: usize,
    ) -> ScResult<Trial> {
        let parameters = self
            .strategy
            .lock()
            .suggest(1)
            .pop()
            .ok_or_else(|| internal_error!("search strategy produced no parameters"))?;

        let context = TrialContext::new(optimization_id, trial_number);
        let started_at = Utc::now();
        debug!("Trial {} started with {:?}", trial_number, parameters);

        let (output, failure) = match model.run(&context, &parameters) {
            Ok(table) => (Some(table), None),
            Err(e) => {
                warn!("Trial {} simulation failed: {}", trial_number, e);
                (None, Some(e.to_string()))
            }
        };

        let scores = self.evaluator.evaluate(output.as_ref())?;

        let objectives: Vec<f64> = self
            .evaluator
            .metrics()
            .iter()
            .map(|spec| {
                spec.mode
                    .orient(scores.get(&spec.optimization_name).unwrap_or(f64::NAN))
            })
            .collect();
        self.strategy.lock().report(&parameters, &objectives);

        let trial = match failure {
            None => Trial::completed(&context, parameters, scores, started_at),
            Some(error) => Trial::failed(&context, parameters, scores, started_at, error),
        };
        info!(
            "Trial {} finished in {:.2}s: {:?}",
            trial_number,
            trial.duration_seconds(),
            trial.metrics
        );
        Ok(trial)
    }
}
