//! # lc-optimizer
//!
//! Hyperparameter tuning for load-forecasting regressors under a wall-clock
//! budget.
//!
//! Provides mixed-type search space declarations, sampling of trial
//! parameters, the [`Regressor`] capability any model backend implements,
//! pruning callbacks, the per-trial [`TrialObjective`] and a [`Study`] driver
//! that runs trials sequentially or on a thread pool.

mod config;
mod objective;
mod pruner;
mod regressor;
mod sampler;
mod search;
mod study;
mod trial;

pub use config::{PrunerConfig, TuningConfig};
pub use objective::{TrialObjective, TrialOutcome, VALIDATION_SETS};
pub use pruner::{CompletedTrial, MedianPruner, NopPruner, Pruner};
pub use regressor::{
    CallbackAction, EvaluationLog, FitOptions, FitReport, NoPruning, PruningArgs,
    PruningCallbackFactory, Regressor, ReportingPruningCallback, ReportingPruningFactory,
    TrainingCallback,
};
pub use sampler::{SearchSpaceSampler, TrialContext};
pub use search::{
    HyperparameterKind, HyperparameterSpec, ModelType, ParameterValue, SearchSpace,
    TrialParameters,
};
pub use study::{Study, StudyTrial};
pub use trial::{
    ObjectiveDirection, OptimizationState, OptimizationStatus, Trial, TrialResult, TrialStatus,
};
