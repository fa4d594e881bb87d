//! The regressor capability tuned by a study, and per-iteration training
//! callbacks used for pruning.

use std::collections::BTreeMap;

use lc_types::{FeatureMatrix, Fold, LcResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sampler::TrialContext;
use crate::search::TrialParameters;

/// Evaluation history: eval set name -> metric name -> value per iteration.
pub type EvaluationLog = BTreeMap<String, BTreeMap<String, Vec<f64>>>;

/// What a callback asks the training loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Prune,
}

/// Hook invoked by a regressor after every boosting/training iteration.
pub trait TrainingCallback {
    fn after_iteration(&mut self, iteration: usize, evals: &EvaluationLog) -> CallbackAction;
}

/// Options for one call to [`Regressor::fit`].
pub struct FitOptions<'a> {
    /// Named folds scored after each iteration. Early stopping watches the
    /// last one.
    pub eval_set: Vec<(String, &'a Fold)>,
    pub early_stopping_rounds: usize,
    pub eval_metric: String,
    pub callbacks: Vec<Box<dyn TrainingCallback + 'a>>,
    pub verbose: bool,
}

impl<'a> FitOptions<'a> {
    pub fn new(eval_metric: impl Into<String>) -> Self {
        Self {
            eval_set: Vec::new(),
            early_stopping_rounds: 0,
            eval_metric: eval_metric.into(),
            callbacks: Vec::new(),
            verbose: false,
        }
    }

    pub fn with_eval_set(mut self, name: impl Into<String>, fold: &'a Fold) -> Self {
        self.eval_set.push((name.into(), fold));
        self
    }

    pub fn with_early_stopping(mut self, rounds: usize) -> Self {
        self.early_stopping_rounds = rounds;
        self
    }

    pub fn with_callback(mut self, callback: Box<dyn TrainingCallback + 'a>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Summary of a finished fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Iterations actually trained.
    pub rounds: usize,
    pub best_iteration: Option<usize>,
    pub best_score: Option<f64>,
    /// Iteration at which a callback requested pruning.
    pub pruned_at: Option<usize>,
}

/// A model backend that can be configured from trial parameters.
pub trait Regressor: Send {
    /// Apply sampled hyperparameters. Unknown names are ignored; values of
    /// the wrong type are an error.
    fn set_params(&mut self, params: &TrialParameters) -> LcResult<()>;

    fn fit(&mut self, train: &Fold, options: FitOptions<'_>) -> LcResult<FitReport>;

    fn predict(&self, features: &FeatureMatrix) -> LcResult<Vec<f64>>;
}

/// Arguments handed to a [`PruningCallbackFactory`].
#[derive(Debug, Clone, Copy)]
pub struct PruningArgs<'a> {
    pub eval_metric: &'a str,
    /// Free-form options from the tuning configuration.
    pub extra: &'a Value,
}

/// Builds the training callback that connects a fit to the trial's pruner.
pub trait PruningCallbackFactory: Send + Sync {
    fn create<'a>(
        &self,
        trial: &'a mut dyn TrialContext,
        args: &PruningArgs<'_>,
    ) -> Box<dyn TrainingCallback + 'a>;
}

/// Reports the watched validation metric each iteration and prunes when the
/// trial says so.
///
/// The watched key is `validation_1-<eval_metric>` unless the extra options
/// carry an `observation_key`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportingPruningFactory;

impl PruningCallbackFactory for ReportingPruningFactory {
    fn create<'a>(
        &self,
        trial: &'a mut dyn TrialContext,
        args: &PruningArgs<'_>,
    ) -> Box<dyn TrainingCallback + 'a> {
        let observation_key = args
            .extra
            .get("observation_key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("validation_1-{}", args.eval_metric));
        Box::new(ReportingPruningCallback::new(trial, observation_key))
    }
}

pub struct ReportingPruningCallback<'a> {
    trial: &'a mut dyn TrialContext,
    observation_key: String,
    warned: bool,
}

impl<'a> ReportingPruningCallback<'a> {
    pub fn new(trial: &'a mut dyn TrialContext, observation_key: impl Into<String>) -> Self {
        Self {
            trial,
            observation_key: observation_key.into(),
            warned: false,
        }
    }

    fn observed(&self, evals: &EvaluationLog) -> Option<f64> {
        let (set, metric) = self.observation_key.split_once('-')?;
        evals.get(set)?.get(metric)?.last().copied()
    }
}

impl TrainingCallback for ReportingPruningCallback<'_> {
    fn after_iteration(&mut self, iteration: usize, evals: &EvaluationLog) -> CallbackAction {
        let Some(value) = self.observed(evals) else {
            if !self.warned {
                tracing::warn!(
                    key = %self.observation_key,
                    "observation key not found in evaluation log, pruning disabled"
                );
                self.warned = true;
            }
            return CallbackAction::Continue;
        };

        self.trial.report(iteration, value);
        if self.trial.should_prune() {
            tracing::debug!(
                trial = self.trial.number(),
                iteration,
                value,
                "trial pruned"
            );
            CallbackAction::Prune
        } else {
            CallbackAction::Continue
        }
    }
}

/// Factory whose callbacks never prune.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPruning;

struct ContinueCallback;

impl TrainingCallback for ContinueCallback {
    fn after_iteration(&mut self, _iteration: usize, _evals: &EvaluationLog) -> CallbackAction {
        CallbackAction::Continue
    }
}

impl PruningCallbackFactory for NoPruning {
    fn create<'a>(
        &self,
        _trial: &'a mut dyn TrialContext,
        _args: &PruningArgs<'_>,
    ) -> Box<dyn TrainingCallback + 'a> {
        Box::new(ContinueCallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Records reports and prunes once a value exceeds a threshold.
    struct ThresholdTrial {
        reports: Vec<(usize, f64)>,
        threshold: f64,
    }

    impl TrialContext for ThresholdTrial {
        fn number(&self) -> usize {
            0
        }
        fn suggest_float(&mut self, _: &str, low: f64, _: f64, _: bool) -> f64 {
            low
        }
        fn suggest_int(&mut self, _: &str, low: i64, _: i64) -> i64 {
            low
        }
        fn suggest_categorical(&mut self, _: &str, choices: &[Value]) -> Value {
            choices[0].clone()
        }
        fn report(&mut self, step: usize, value: f64) {
            self.reports.push((step, value));
        }
        fn should_prune(&self) -> bool {
            self.reports.last().is_some_and(|(_, v)| *v > self.threshold)
        }
    }

    fn log(set: &str, metric: &str, values: &[f64]) -> EvaluationLog {
        let mut log = EvaluationLog::new();
        log.entry(set.to_string())
            .or_default()
            .insert(metric.to_string(), values.to_vec());
        log
    }

    #[test]
    fn watches_second_validation_set_by_default() {
        let mut trial = ThresholdTrial {
            reports: Vec::new(),
            threshold: 5.0,
        };
        let extra = Value::Null;
        let args = PruningArgs {
            eval_metric: "mae",
            extra: &extra,
        };
        {
            let mut callback = ReportingPruningFactory.create(&mut trial, &args);
            let mut evals = log("validation_1", "mae", &[3.0]);
            evals
                .entry("validation_0".into())
                .or_default()
                .insert("mae".into(), vec![100.0]);
            assert_eq!(callback.after_iteration(0, &evals), CallbackAction::Continue);
            let evals = log("validation_1", "mae", &[3.0, 6.0]);
            assert_eq!(callback.after_iteration(1, &evals), CallbackAction::Prune);
        }
        assert_eq!(trial.reports, vec![(0, 3.0), (1, 6.0)]);
    }

    #[test]
    fn observation_key_can_be_overridden() {
        let mut trial = ThresholdTrial {
            reports: Vec::new(),
            threshold: 1.0,
        };
        let extra = json!({"observation_key": "validation_0-rmse"});
        let args = PruningArgs {
            eval_metric: "mae",
            extra: &extra,
        };
        {
            let mut callback = ReportingPruningFactory.create(&mut trial, &args);
            let evals = log("validation_0", "rmse", &[0.5]);
            assert_eq!(callback.after_iteration(0, &evals), CallbackAction::Continue);
        }
        assert_eq!(trial.reports, vec![(0, 0.5)]);
    }

    #[test]
    fn missing_key_never_prunes() {
        let mut trial = ThresholdTrial {
            reports: Vec::new(),
            threshold: 0.0,
        };
        let extra = Value::Null;
        let args = PruningArgs {
            eval_metric: "mae",
            extra: &extra,
        };
        {
            let mut callback = ReportingPruningFactory.create(&mut trial, &args);
            let evals = log("validation_1", "rmse", &[10.0]);
            assert_eq!(callback.after_iteration(0, &evals), CallbackAction::Continue);
        }
        assert!(trial.reports.is_empty());
    }
}
