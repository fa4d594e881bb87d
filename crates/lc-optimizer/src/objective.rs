//! Evaluation of one hyperparameter configuration under a shared time budget.

use chrono::{DateTime, Utc};
use lc_data::split_train_validation_test;
use lc_metrics::MetricRegistry;
use lc_types::{Dataset, LcResult, TuningError};

use crate::config::TuningConfig;
use crate::regressor::{FitOptions, PruningArgs, PruningCallbackFactory, Regressor};
use crate::sampler::{SearchSpaceSampler, TrialContext};
use crate::search::SearchSpace;

/// Names of the eval sets handed to the regressor: the training fold and the
/// validation fold, in that order. Early stopping watches the last one.
pub const VALIDATION_SETS: [&str; 2] = ["validation_0", "validation_1"];

/// What a single trial produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrialOutcome {
    /// Test-fold loss of the fitted model.
    Loss(f64),
    /// The study budget is spent; no work was done and no further trials
    /// should be started.
    Stop { elapsed_secs: f64 },
    /// A training callback stopped the fit at `step`.
    Pruned { step: usize },
}

/// Fits and scores one sampled configuration per call to [`evaluate`].
///
/// The start time is fixed when the objective is built; every trial checks
/// it before doing any work. The budget is cooperative: a trial that starts
/// in time runs to completion even if it overruns.
///
/// [`evaluate`]: TrialObjective::evaluate
pub struct TrialObjective<'a> {
    data: &'a Dataset,
    space: &'a SearchSpace,
    config: &'a TuningConfig,
    regressor: &'a mut dyn Regressor,
    pruning: &'a dyn PruningCallbackFactory,
    metrics: MetricRegistry,
    start_time: DateTime<Utc>,
}

impl<'a> TrialObjective<'a> {
    pub fn new(
        data: &'a Dataset,
        space: &'a SearchSpace,
        config: &'a TuningConfig,
        regressor: &'a mut dyn Regressor,
        pruning: &'a dyn PruningCallbackFactory,
    ) -> LcResult<Self> {
        config.validate()?;
        if space.is_empty() {
            return Err(TuningError::InvalidConfig {
                message: "search space declares no hyperparameters".to_string(),
            }
            .into());
        }
        Ok(Self {
            data,
            space,
            config,
            regressor,
            pruning,
            metrics: MetricRegistry::default(),
            start_time: Utc::now(),
        })
    }

    /// Share a start time with other objectives of the same study.
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricRegistry) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.start_time
    }

    pub fn evaluate(&mut self, trial: &mut dyn TrialContext) -> LcResult<TrialOutcome> {
        let config = self.config;

        let elapsed = self.elapsed();
        if elapsed > config.time_budget() {
            let elapsed_secs = elapsed.num_milliseconds() as f64 / 1000.0;
            tracing::info!(
                trial = trial.number(),
                elapsed_secs,
                budget_secs = config.time_budget_secs,
                "Time budget exhausted, no further trials"
            );
            return Ok(TrialOutcome::Stop { elapsed_secs });
        }

        let split = split_train_validation_test(self.data, &config.split_config())?;
        split.train.validate_forecast_layout()?;

        // target is the first column; the horizon column is not a model input
        let train = split.train.to_fold();
        let validation = split.validation.to_fold();
        let test = split.test.to_fold();

        let number = trial.number();
        let params = SearchSpaceSampler::sample(self.space, trial);
        self.regressor.set_params(&params)?;

        let args = PruningArgs {
            eval_metric: &config.eval_metric,
            extra: &config.eval_args,
        };
        let callback = self.pruning.create(trial, &args);
        let options = FitOptions::new(config.eval_metric.clone())
            .with_eval_set(VALIDATION_SETS[0], &train)
            .with_eval_set(VALIDATION_SETS[1], &validation)
            .with_early_stopping(config.early_stopping_rounds)
            .with_callback(callback)
            .with_verbose(config.verbose);

        let report = self.regressor.fit(&train, options)?;
        if let Some(step) = report.pruned_at {
            tracing::debug!(trial = number, step, "trial pruned during fit");
            return Ok(TrialOutcome::Pruned { step });
        }

        let forecast = self.regressor.predict(&test.features)?;
        let loss = self
            .metrics
            .evaluate(&config.eval_metric, &test.target, &forecast)?;
        if !loss.is_finite() {
            return Err(TuningError::NonFiniteLoss {
                metric: config.eval_metric.clone(),
                value: loss,
            }
            .into());
        }

        tracing::debug!(
            trial = number,
            loss,
            rounds = report.rounds,
            best_iteration = ?report.best_iteration,
            "trial evaluated"
        );
        Ok(TrialOutcome::Loss(loss))
    }
}
