//! Early stopping of unpromising trials.

use serde::{Deserialize, Serialize};

use crate::trial::{ObjectiveDirection, TrialStatus};

/// What a pruner needs to know about a finished trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTrial {
    pub number: usize,
    pub status: TrialStatus,
    /// `(step, value)` pairs reported during training.
    pub intermediate_values: Vec<(usize, f64)>,
    pub loss: Option<f64>,
}

/// Decides from intermediate values whether a running trial should stop.
pub trait Pruner: Send + Sync {
    fn should_prune(
        &self,
        step: usize,
        intermediate_values: &[(usize, f64)],
        completed_trials: &[CompletedTrial],
    ) -> bool;
}

/// Never prunes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopPruner;

impl Pruner for NopPruner {
    fn should_prune(&self, _: usize, _: &[(usize, f64)], _: &[CompletedTrial]) -> bool {
        false
    }
}

/// Prunes a trial whose latest value is worse than the median of completed
/// trials at the same step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MedianPruner {
    direction: ObjectiveDirection,
    /// Completed trials required before anything is pruned.
    n_startup_trials: usize,
    /// Steps within a trial before it can be pruned.
    n_warmup_steps: usize,
    /// Only steps that are a multiple of this are checked.
    interval_steps: usize,
}

impl MedianPruner {
    pub fn new(direction: ObjectiveDirection) -> Self {
        Self {
            direction,
            n_startup_trials: 5,
            n_warmup_steps: 0,
            interval_steps: 1,
        }
    }

    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_warmup_steps(mut self, n: usize) -> Self {
        self.n_warmup_steps = n;
        self
    }

    pub fn with_interval_steps(mut self, n: usize) -> Self {
        self.interval_steps = n.max(1);
        self
    }
}

impl Pruner for MedianPruner {
    fn should_prune(
        &self,
        step: usize,
        intermediate_values: &[(usize, f64)],
        completed_trials: &[CompletedTrial],
    ) -> bool {
        if step < self.n_warmup_steps || (step - self.n_warmup_steps) % self.interval_steps != 0 {
            return false;
        }
        let Some(&(_, current)) = intermediate_values.last() else {
            return false;
        };
        if current.is_nan() {
            return true;
        }

        let mut at_step: Vec<f64> = completed_trials
            .iter()
            .filter(|t| t.status == TrialStatus::Completed)
            .filter_map(|t| {
                t.intermediate_values
                    .iter()
                    .find(|(s, _)| *s == step)
                    .map(|(_, v)| *v)
            })
            .filter(|v| !v.is_nan())
            .collect();
        if at_step.is_empty() || at_step.len() < self.n_startup_trials {
            return false;
        }

        let median = median(&mut at_step);
        match self.direction {
            ObjectiveDirection::Minimize => current > median,
            ObjectiveDirection::Maximize => current < median,
        }
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_unstable_by(f64::total_cmp);
    let len = values.len();
    if len % 2 == 1 {
        values[len / 2]
    } else {
        (values[len / 2 - 1] + values[len / 2]) / 2.0
    }
}
