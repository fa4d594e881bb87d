//! Drawing trial parameters from a search space.

use serde_json::Value;

use crate::search::{HyperparameterKind, ParameterValue, SearchSpace, TrialParameters};

/// Handle to the trial being evaluated.
///
/// Implementations own the random source for suggestions and decide, from
/// reported intermediate values, whether the trial should stop early.
pub trait TrialContext {
    /// Zero-based position of the trial within its study.
    fn number(&self) -> usize;

    /// A real value in `[low, high]`, uniform in log space when `log_scale`.
    fn suggest_float(&mut self, name: &str, low: f64, high: f64, log_scale: bool) -> f64;

    /// An integer in `[low, high]` inclusive.
    fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> i64;

    /// One of `choices`.
    fn suggest_categorical(&mut self, name: &str, choices: &[Value]) -> Value;

    /// Record the objective value observed at a training step.
    fn report(&mut self, step: usize, value: f64);

    /// Whether the values reported so far warrant stopping this trial.
    fn should_prune(&self) -> bool;
}

/// Maps every declaration of a [`SearchSpace`] to a suggestion call.
pub struct SearchSpaceSampler;

impl SearchSpaceSampler {
    /// Draw one value per declared hyperparameter, in declaration order.
    pub fn sample(space: &SearchSpace, trial: &mut dyn TrialContext) -> TrialParameters {
        let mut params = TrialParameters::default();
        for spec in space.parameters() {
            let value = match &spec.kind {
                HyperparameterKind::Continuous {
                    low,
                    high,
                    log_scale,
                } => ParameterValue::Float(trial.suggest_float(&spec.name, *low, *high, *log_scale)),
                HyperparameterKind::Integer { low, high } => {
                    ParameterValue::Int(trial.suggest_int(&spec.name, *low, *high))
                }
                HyperparameterKind::Categorical { choices } => {
                    ParameterValue::Choice(trial.suggest_categorical(&spec.name, choices))
                }
            };
            params.insert(spec.name.clone(), value);
        }
        tracing::debug!(trial = trial.number(), params = %params.to_json(), "sampled parameters");
        params
    }
}
