//! Study driver: runs trials, tracks their lifecycle and the best result.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use lc_types::{internal_error, Dataset, LcError, LcResult};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::config::TuningConfig;
use crate::objective::{TrialObjective, TrialOutcome};
use crate::pruner::{CompletedTrial, NopPruner, Pruner};
use crate::regressor::{PruningCallbackFactory, Regressor};
use crate::sampler::TrialContext;
use crate::search::{ParameterValue, SearchSpace, TrialParameters};
use crate::trial::{OptimizationStatus, StudyId, Trial, TrialResult, TrialStatus};

type History = Arc<RwLock<Vec<CompletedTrial>>>;

/// Trial context handed to the objective by a [`Study`].
///
/// Suggestions come from an RNG seeded with `seed + number`, so a trial's
/// parameters depend only on the study seed and its position.
pub struct StudyTrial {
    number: usize,
    rng: StdRng,
    params: TrialParameters,
    intermediate_values: Vec<(usize, f64)>,
    pruner: Arc<dyn Pruner>,
    history: History,
}

impl StudyTrial {
    pub fn new(number: usize, seed: u64, pruner: Arc<dyn Pruner>, history: History) -> Self {
        Self {
            number,
            rng: StdRng::seed_from_u64(seed.wrapping_add(number as u64)),
            params: TrialParameters::default(),
            intermediate_values: Vec::new(),
            pruner,
            history,
        }
    }

    /// A trial outside any study, never pruned.
    pub fn standalone(number: usize, seed: u64) -> Self {
        Self::new(number, seed, Arc::new(NopPruner), Arc::default())
    }

    /// Everything suggested so far.
    pub fn params(&self) -> &TrialParameters {
        &self.params
    }

    pub fn intermediate_values(&self) -> &[(usize, f64)] {
        &self.intermediate_values
    }
}

impl TrialContext for StudyTrial {
    fn number(&self) -> usize {
        self.number
    }

    fn suggest_float(&mut self, name: &str, low: f64, high: f64, log_scale: bool) -> f64 {
        let value = if low >= high {
            low
        } else if log_scale {
            self.rng
                .random_range(low.ln()..=high.ln())
                .exp()
                .clamp(low, high)
        } else {
            self.rng.random_range(low..=high)
        };
        self.params
            .insert(name.to_string(), ParameterValue::Float(value));
        value
    }

    fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> i64 {
        let value = if low >= high {
            low
        } else {
            self.rng.random_range(low..=high)
        };
        self.params.insert(name.to_string(), ParameterValue::Int(value));
        value
    }

    fn suggest_categorical(&mut self, name: &str, choices: &[Value]) -> Value {
        let value = if choices.is_empty() {
            Value::Null
        } else {
            choices[self.rng.random_range(0..choices.len())].clone()
        };
        self.params
            .insert(name.to_string(), ParameterValue::Choice(value.clone()));
        value
    }

    fn report(&mut self, step: usize, value: f64) {
        self.intermediate_values.push((step, value));
    }

    fn should_prune(&self) -> bool {
        let Some(&(step, _)) = self.intermediate_values.last() else {
            return false;
        };
        self.pruner
            .should_prune(step, &self.intermediate_values, &self.history.read())
    }
}

/// Make a finished trial visible to the pruner of trials still running.
fn archive(history: &History, context: &StudyTrial, outcome: &LcResult<TrialOutcome>) {
    let (status, loss) = match outcome {
        Ok(TrialOutcome::Loss(loss)) => (TrialStatus::Completed, Some(*loss)),
        Ok(TrialOutcome::Pruned { .. }) => (TrialStatus::Pruned, None),
        _ => return,
    };
    history.write().push(CompletedTrial {
        number: context.number,
        status,
        intermediate_values: context.intermediate_values.clone(),
        loss,
    });
}

/// A tuning run: a sequence of trials sharing a seed, pruner and direction.
pub struct Study {
    id: StudyId,
    seed: u64,
    pruner: Arc<dyn Pruner>,
    history: History,
    trials: Vec<Trial>,
    status: OptimizationStatus,
}

impl Study {
    pub fn new(config: &TuningConfig) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            seed: config.seed.unwrap_or_else(|| rand::rng().random()),
            pruner: config.build_pruner(),
            history: Arc::default(),
            trials: Vec::new(),
            status: OptimizationStatus::new(id, "loadcast-tuning".to_string(), config.direction),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.status.name = name.into();
        self
    }

    pub fn with_pruner(mut self, pruner: Arc<dyn Pruner>) -> Self {
        self.pruner = pruner;
        self
    }

    pub fn id(&self) -> StudyId {
        self.id
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn status(&self) -> &OptimizationStatus {
        &self.status
    }

    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.status.best_trial.as_ref()
    }

    pub fn best_params(&self) -> Option<&TrialParameters> {
        self.best_trial().map(|t| &t.parameters)
    }

    fn context(&self, number: usize) -> StudyTrial {
        StudyTrial::new(number, self.seed, self.pruner.clone(), self.history.clone())
    }

    /// Run up to `n_trials` trials one after another.
    ///
    /// Stops early when the objective reports the budget is spent. A
    /// configuration error aborts the study and is returned; any other trial
    /// error marks that trial failed and the study moves on.
    pub fn optimize(
        &mut self,
        objective: &mut TrialObjective<'_>,
        n_trials: usize,
    ) -> LcResult<&OptimizationStatus> {
        self.status.mark_running();
        tracing::info!(study = %self.id, n_trials, seed = self.seed, "Starting study");

        let mut budget_exhausted = false;
        for _ in 0..n_trials {
            let number = self.trials.len();
            let mut trial = Trial::new(self.id, number);
            let mut context = self.context(number);

            trial.mark_running();
            let outcome = objective.evaluate(&mut context);
            archive(&self.history, &context, &outcome);

            if self.record(trial, context, outcome)?.is_break() {
                budget_exhausted = true;
                break;
            }
        }

        self.finish(budget_exhausted);
        Ok(&self.status)
    }

    /// Run `n_trials` trials on `config.n_jobs` worker threads.
    ///
    /// Each trial builds its own regressor with `make_regressor`; the data,
    /// search space and start time are shared read-only. Once one trial sees
    /// the budget spent, trials not yet started are skipped.
    pub fn optimize_parallel<R, F>(
        &mut self,
        data: &Dataset,
        space: &SearchSpace,
        config: &TuningConfig,
        pruning: &dyn PruningCallbackFactory,
        make_regressor: F,
        n_trials: usize,
    ) -> LcResult<&OptimizationStatus>
    where
        R: Regressor,
        F: Fn() -> R + Sync,
    {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_jobs)
            .build()
            .map_err(|e| internal_error!("Failed to build trial thread pool: {}", e))?;

        self.status.mark_running();
        tracing::info!(
            study = %self.id,
            n_trials,
            n_jobs = config.n_jobs,
            seed = self.seed,
            "Starting parallel study"
        );

        let start_time = Utc::now();
        let first = self.trials.len();
        let stop = AtomicBool::new(false);
        let abort = AtomicBool::new(false);
        let (study_id, seed) = (self.id, self.seed);
        let (pruner, history) = (&self.pruner, &self.history);

        let finished: Vec<(Trial, StudyTrial, Option<LcResult<TrialOutcome>>)> = pool.install(|| {
            (first..first + n_trials)
                .into_par_iter()
                .map(|number| {
                    let mut trial = Trial::new(study_id, number);
                    let mut context =
                        StudyTrial::new(number, seed, pruner.clone(), history.clone());
                    if stop.load(Ordering::Acquire) || abort.load(Ordering::Acquire) {
                        return (trial, context, None);
                    }

                    trial.mark_running();
                    let mut regressor = make_regressor();
                    let outcome =
                        TrialObjective::new(data, space, config, &mut regressor, pruning)
                            .map(|objective| objective.with_start_time(start_time))
                            .and_then(|mut objective| objective.evaluate(&mut context));

                    match &outcome {
                        Ok(TrialOutcome::Stop { .. }) => stop.store(true, Ordering::Release),
                        Err(e) if e.is_configuration() => abort.store(true, Ordering::Release),
                        _ => {}
                    }
                    archive(history, &context, &outcome);
                    (trial, context, Some(outcome))
                })
                .collect()
        });

        let mut budget_exhausted = false;
        let mut fatal: Option<LcError> = None;
        for (mut trial, context, outcome) in finished {
            let Some(outcome) = outcome else {
                trial.mark_skipped();
                self.trials.push(trial);
                continue;
            };
            match self.record(trial, context, outcome) {
                Ok(ControlFlow::Break(())) => budget_exhausted = true,
                Ok(ControlFlow::Continue(())) => {}
                Err(e) => {
                    fatal.get_or_insert(e);
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e);
        }
        self.finish(budget_exhausted);
        Ok(&self.status)
    }

    fn record(
        &mut self,
        mut trial: Trial,
        context: StudyTrial,
        outcome: LcResult<TrialOutcome>,
    ) -> LcResult<ControlFlow<()>> {
        let number = trial.trial_number;
        trial.parameters = context.params;
        trial.intermediate_values = context.intermediate_values;

        let flow = match outcome {
            Ok(TrialOutcome::Loss(loss)) => {
                let result = TrialResult {
                    trial_id: trial.id,
                    trial_number: number,
                    loss,
                    parameters: trial.parameters.clone(),
                    duration_ms: trial.duration_ms(),
                };
                self.status.trials_completed += 1;
                self.status.update_best(&result);
                trial.mark_completed(result);
                tracing::info!(
                    trial = number,
                    loss,
                    best = ?self.status.best_trial.as_ref().map(|b| b.loss),
                    "Trial completed"
                );
                ControlFlow::Continue(())
            }
            Ok(TrialOutcome::Pruned { step }) => {
                self.status.trials_pruned += 1;
                trial.mark_pruned(step);
                tracing::info!(trial = number, step, "Trial pruned");
                ControlFlow::Continue(())
            }
            Ok(TrialOutcome::Stop { elapsed_secs }) => {
                trial.mark_skipped();
                tracing::info!(trial = number, elapsed_secs, "Study stopped by time budget");
                ControlFlow::Break(())
            }
            Err(e) if e.is_configuration() => {
                tracing::error!(trial = number, "Aborting study: {}", e);
                trial.mark_failed(e.to_string());
                self.trials.push(trial);
                self.status.trials_failed += 1;
                self.status.mark_failed(e.to_string());
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(trial = number, "Trial failed: {}", e);
                trial.mark_failed(e.to_string());
                self.status.trials_failed += 1;
                ControlFlow::Continue(())
            }
        };
        self.trials.push(trial);
        Ok(flow)
    }

    fn finish(&mut self, budget_exhausted: bool) {
        if budget_exhausted {
            self.status.mark_budget_exhausted();
        } else {
            self.status.mark_completed();
        }
        tracing::info!(
            study = %self.id,
            completed = self.status.trials_completed,
            pruned = self.status.trials_pruned,
            failed = self.status.trials_failed,
            best_loss = ?self.status.best_trial.as_ref().map(|b| b.loss),
            "Study finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::tests::{hourly_dataset, MeanRegressor};
    use crate::regressor::{FitOptions, FitReport, NoPruning};
    use crate::trial::OptimizationState;
    use chrono::Duration;
    use lc_types::{FeatureMatrix, Fold, ModelError};

    struct BrokenRegressor;

    impl Regressor for BrokenRegressor {
        fn set_params(&mut self, _: &TrialParameters) -> LcResult<()> {
            Ok(())
        }
        fn fit(&mut self, _: &Fold, _: FitOptions<'_>) -> LcResult<FitReport> {
            Err(ModelError::TrainingFailed {
                message: "diverged".into(),
            }
            .into())
        }
        fn predict(&self, _: &FeatureMatrix) -> LcResult<Vec<f64>> {
            Err(ModelError::NotFitted.into())
        }
    }

    fn space() -> SearchSpace {
        SearchSpace::from_json(
            r#"{"eta": [[0.01, 0.2], false], "max_depth": [[3, 10], false], "booster": ["gbtree", "dart"]}"#,
        )
        .unwrap()
    }

    #[test]
    fn sequential_study_tracks_best_trial() {
        let data = hourly_dataset(400);
        let space = space();
        let config = TuningConfig::default().with_seed(3);
        let mut regressor = MeanRegressor::default();
        let mut study = Study::new(&config);
        {
            let mut objective =
                TrialObjective::new(&data, &space, &config, &mut regressor, &NoPruning).unwrap();
            let status = study.optimize(&mut objective, 5).unwrap();
            assert_eq!(status.state, OptimizationState::Completed);
            assert_eq!(status.trials_completed, 5);
        }
        assert_eq!(study.trials().len(), 5);
        assert!(study
            .trials()
            .iter()
            .all(|t| t.status == TrialStatus::Completed && t.parameters.len() == 3));
        let best = study.best_trial().unwrap();
        assert!(study.trials().iter().all(|t| t.result.as_ref().unwrap().loss >= best.loss));
        assert_eq!(regressor.fits, 5);
    }

    #[test]
    fn spent_budget_halts_the_study() {
        let data = hourly_dataset(200);
        let space = space();
        let config = TuningConfig::default();
        let mut regressor = MeanRegressor::default();
        let mut study = Study::new(&config);
        let mut objective = TrialObjective::new(&data, &space, &config, &mut regressor, &NoPruning)
            .unwrap()
            .with_start_time(Utc::now() - Duration::minutes(3));
        let status = study.optimize(&mut objective, 10).unwrap();
        assert_eq!(status.state, OptimizationState::BudgetExhausted);
        assert_eq!(status.trials_completed, 0);
        assert_eq!(study.trials().len(), 1);
        assert_eq!(study.trials()[0].status, TrialStatus::Skipped);
    }

    #[test]
    fn configuration_error_aborts() {
        let mut data = hourly_dataset(200);
        let load = data.remove_column("load").unwrap();
        data.insert_column("load", load).unwrap();

        let space = space();
        let config = TuningConfig::default();
        let mut regressor = MeanRegressor::default();
        let mut study = Study::new(&config);
        let mut objective =
            TrialObjective::new(&data, &space, &config, &mut regressor, &NoPruning).unwrap();
        assert!(study.optimize(&mut objective, 10).is_err());
        assert_eq!(study.trials().len(), 1);
        assert_eq!(study.status().state, OptimizationState::Failed);
    }

    #[test]
    fn empty_test_fold_aborts_instead_of_failing_every_trial() {
        let data = hourly_dataset(200);
        let space = space();
        // 0.2 rows round down to none
        let config = TuningConfig::default().with_fractions(0.001, 0.1);
        assert!(config.validate().is_ok());
        let mut regressor = MeanRegressor::default();
        let mut study = Study::new(&config);
        let mut objective =
            TrialObjective::new(&data, &space, &config, &mut regressor, &NoPruning).unwrap();
        let err = study.optimize(&mut objective, 5).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(study.trials().len(), 1);
        assert_eq!(study.status().state, OptimizationState::Failed);
        assert_eq!(regressor.fits, 0);
    }

    #[test]
    fn backend_failures_fail_single_trials() {
        let data = hourly_dataset(200);
        let space = space();
        let config = TuningConfig::default();
        let mut regressor = BrokenRegressor;
        let mut study = Study::new(&config);
        let mut objective =
            TrialObjective::new(&data, &space, &config, &mut regressor, &NoPruning).unwrap();
        let status = study.optimize(&mut objective, 3).unwrap();
        assert_eq!(status.trials_failed, 3);
        assert_eq!(status.state, OptimizationState::Completed);
        assert!(study.best_trial().is_none());
        assert_eq!(study.trials()[2].error.as_deref(), Some("Model error: Training failed: diverged"));
    }

    #[test]
    fn seeded_studies_sample_identically() {
        let data = hourly_dataset(200);
        let space = space();
        let config = TuningConfig::default().with_seed(42);
        let mut runs = Vec::new();
        for _ in 0..2 {
            let mut regressor = MeanRegressor::default();
            let mut study = Study::new(&config);
            let mut objective =
                TrialObjective::new(&data, &space, &config, &mut regressor, &NoPruning).unwrap();
            study.optimize(&mut objective, 3).unwrap();
            runs.push(
                study
                    .trials()
                    .iter()
                    .map(|t| t.parameters.clone())
                    .collect::<Vec<_>>(),
            );
        }
        assert_eq!(runs[0], runs[1]);
    }

    #[test]
    fn parallel_study_runs_every_trial() {
        let data = hourly_dataset(300);
        let space = space();
        let config = TuningConfig::default().with_seed(9).with_jobs(3);
        let mut study = Study::new(&config);
        let status = study
            .optimize_parallel(&data, &space, &config, &NoPruning, MeanRegressor::default, 6)
            .unwrap();
        assert_eq!(status.trials_completed, 6);
        let numbers: Vec<usize> = study.trials().iter().map(|t| t.trial_number).collect();
        assert_eq!(numbers, (0..6).collect::<Vec<_>>());

        // same seed and position, same parameters as a sequential run
        let mut regressor = MeanRegressor::default();
        let mut sequential = Study::new(&config);
        let mut objective =
            TrialObjective::new(&data, &space, &config, &mut regressor, &NoPruning).unwrap();
        sequential.optimize(&mut objective, 6).unwrap();
        for (a, b) in study.trials().iter().zip(sequential.trials()) {
            assert_eq!(a.parameters, b.parameters);
        }
    }

    #[test]
    fn parallel_configuration_error_is_returned() {
        let data = hourly_dataset(100);
        let space = space();
        let config = TuningConfig::default().with_eval_metric("nope", Default::default()).with_jobs(2);
        let mut study = Study::new(&config);
        let err = study
            .optimize_parallel(&data, &space, &config, &NoPruning, MeanRegressor::default, 4)
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(study.status().state, OptimizationState::Failed);
    }
}
