//! Tuning run configuration.

use std::path::Path;
use std::sync::Arc;

use lc_data::SplitConfig;
use lc_types::{config_error, LcResult, TuningError};
use serde::{Deserialize, Serialize};

use crate::pruner::{MedianPruner, NopPruner, Pruner};
use crate::trial::ObjectiveDirection;

/// Median pruner settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrunerConfig {
    pub enabled: bool,
    pub n_startup_trials: usize,
    pub n_warmup_steps: usize,
    pub interval_steps: usize,
}

impl Default for PrunerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_startup_trials: 5,
            n_warmup_steps: 10,
            interval_steps: 1,
        }
    }
}

/// Everything a study needs besides data, search space and model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Wall-clock budget for the whole study, checked before each trial.
    pub time_budget_secs: u64,
    pub early_stopping_rounds: usize,
    pub test_fraction: f64,
    pub validation_fraction: f64,
    pub eval_metric: String,
    pub n_trials: usize,
    /// Worker threads for parallel trials.
    pub n_jobs: usize,
    pub seed: Option<u64>,
    pub direction: ObjectiveDirection,
    pub verbose: bool,
    /// Passed through to the pruning callback factory.
    pub eval_args: serde_json::Value,
    pub pruner: PrunerConfig,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            time_budget_secs: 120,
            early_stopping_rounds: 10,
            test_fraction: 0.1,
            validation_fraction: 0.1,
            eval_metric: "mae".to_string(),
            n_trials: 100,
            n_jobs: 1,
            seed: None,
            direction: ObjectiveDirection::Minimize,
            verbose: false,
            eval_args: serde_json::Value::Null,
            pruner: PrunerConfig::default(),
        }
    }
}

impl TuningConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON config; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> LcResult<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&document)
            .map_err(|e| config_error!("invalid tuning config {}: {}", path.display(), e))?;
        config.validate()?;
        tracing::info!("Loaded tuning config from {}", path.display());
        Ok(config)
    }

    pub fn with_time_budget_secs(mut self, secs: u64) -> Self {
        self.time_budget_secs = secs;
        self
    }

    pub fn with_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_jobs(mut self, n: usize) -> Self {
        self.n_jobs = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_eval_metric(mut self, metric: &str, direction: ObjectiveDirection) -> Self {
        self.eval_metric = metric.to_string();
        self.direction = direction;
        self
    }

    pub fn with_fractions(mut self, test_fraction: f64, validation_fraction: f64) -> Self {
        self.test_fraction = test_fraction;
        self.validation_fraction = validation_fraction;
        self
    }

    pub fn with_early_stopping_rounds(mut self, rounds: usize) -> Self {
        self.early_stopping_rounds = rounds;
        self
    }

    pub fn with_eval_args(mut self, args: serde_json::Value) -> Self {
        self.eval_args = args;
        self
    }

    pub fn with_pruner(mut self, pruner: PrunerConfig) -> Self {
        self.pruner = pruner;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn validate(&self) -> Result<(), TuningError> {
        self.split_config().validate()?;
        if self.time_budget_secs == 0 {
            return Err(TuningError::InvalidConfig {
                message: "time_budget_secs must be positive".to_string(),
            });
        }
        if self.n_jobs == 0 {
            return Err(TuningError::InvalidConfig {
                message: "n_jobs must be at least 1".to_string(),
            });
        }
        if self.eval_metric.trim().is_empty() {
            return Err(TuningError::InvalidConfig {
                message: "eval_metric cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Trials always validate and test on the most recent data.
    pub fn split_config(&self) -> SplitConfig {
        SplitConfig::backtest(self.test_fraction, self.validation_fraction)
    }

    pub fn time_budget(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.time_budget_secs).unwrap_or(i64::MAX))
    }

    pub fn build_pruner(&self) -> Arc<dyn Pruner> {
        if !self.pruner.enabled {
            return Arc::new(NopPruner);
        }
        Arc::new(
            MedianPruner::new(self.direction)
                .with_startup_trials(self.pruner.n_startup_trials)
                .with_warmup_steps(self.pruner.n_warmup_steps)
                .with_interval_steps(self.pruner.interval_steps),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() {
        let config = TuningConfig::default();
        assert_eq!(config.time_budget_secs, 120);
        assert_eq!(config.early_stopping_rounds, 10);
        assert_eq!(config.test_fraction, 0.1);
        assert_eq!(config.validation_fraction, 0.1);
        assert_eq!(config.eval_metric, "mae");
        assert_eq!(config.direction, ObjectiveDirection::Minimize);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"n_trials": 7, "eval_metric": "rmse", "pruner": {"n_warmup_steps": 2}}"#)
            .unwrap();
        let config = TuningConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.n_trials, 7);
        assert_eq!(config.eval_metric, "rmse");
        assert_eq!(config.pruner.n_warmup_steps, 2);
        assert_eq!(config.pruner.n_startup_trials, 5);
        assert_eq!(config.time_budget_secs, 120);
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        let err = TuningConfig::from_json_file(file.path()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(TuningConfig::new().with_fractions(0.6, 0.5).validate().is_err());
        assert!(TuningConfig::new().with_fractions(0.0, 0.1).validate().is_err());
        assert!(TuningConfig::new().with_time_budget_secs(0).validate().is_err());
        assert!(TuningConfig::new().with_jobs(0).validate().is_err());
    }
}
