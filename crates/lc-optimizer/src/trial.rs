//! Trial tracking and study status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::search::TrialParameters;

/// Unique study identifier.
pub type StudyId = Uuid;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveDirection {
    Maximize,
    /// Forecast errors are minimized.
    #[default]
    Minimize,
}

impl ObjectiveDirection {
    /// Whether `candidate` improves on `incumbent`.
    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            ObjectiveDirection::Maximize => candidate > incumbent,
            ObjectiveDirection::Minimize => candidate < incumbent,
        }
    }
}

/// Lifecycle state for a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationState {
    Pending,
    Running,
    Completed,
    /// The wall-clock budget ran out before all trials were started.
    BudgetExhausted,
    Failed,
}

/// Aggregate status of a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStatus {
    pub id: StudyId,
    pub name: String,
    pub direction: ObjectiveDirection,
    pub state: OptimizationState,
    pub trials_completed: usize,
    pub trials_pruned: usize,
    pub trials_failed: usize,
    pub best_trial: Option<TrialResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl OptimizationStatus {
    pub fn new(id: StudyId, name: String, direction: ObjectiveDirection) -> Self {
        Self {
            id,
            name,
            direction,
            state: OptimizationState::Pending,
            trials_completed: 0,
            trials_pruned: 0,
            trials_failed: 0,
            best_trial: None,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = OptimizationState::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn mark_completed(&mut self) {
        self.state = OptimizationState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_budget_exhausted(&mut self) {
        self.state = OptimizationState::BudgetExhausted;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = OptimizationState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Update the best trial if `result` improves on the current best.
    pub fn update_best(&mut self, result: &TrialResult) {
        let improves = match &self.best_trial {
            None => true,
            Some(current_best) => self.direction.is_better(result.loss, current_best.loss),
        };
        if improves {
            self.best_trial = Some(result.clone());
        }
    }

    pub fn trials_finished(&self) -> usize {
        self.trials_completed + self.trials_pruned + self.trials_failed
    }
}

/// A single evaluation of the objective with one set of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub study_id: StudyId,
    pub trial_number: usize,
    pub parameters: TrialParameters,
    pub status: TrialStatus,
    pub result: Option<TrialResult>,
    pub intermediate_values: Vec<(usize, f64)>,
    pub pruned_at: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(study_id: StudyId, trial_number: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            study_id,
            trial_number,
            parameters: TrialParameters::default(),
            status: TrialStatus::Pending,
            result: None,
            intermediate_values: Vec::new(),
            pruned_at: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = TrialStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: TrialResult) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn mark_pruned(&mut self, step: usize) {
        self.status = TrialStatus::Pruned;
        self.finished_at = Some(Utc::now());
        self.pruned_at = Some(step);
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = TrialStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn mark_skipped(&mut self) {
        self.status = TrialStatus::Skipped;
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock time between start and finish, in milliseconds.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let finished = self.finished_at.unwrap_or_else(Utc::now);
        u64::try_from((finished - started).num_milliseconds()).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Completed,
    Pruned,
    Failed,
    /// Not evaluated because the study budget was spent.
    Skipped,
}

/// Result of a completed trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    pub trial_number: usize,
    pub loss: f64,
    pub parameters: TrialParameters,
    pub duration_ms: Option<u64>,
}
