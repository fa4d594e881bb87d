//! Name-based lookup of loss functions.

use std::collections::HashMap;

use lc_types::MetricError;

use crate::functions;

/// A loss function over `(realised, forecast)`.
pub type MetricFn = fn(&[f64], &[f64]) -> f64;

#[derive(Debug, Clone, Copy)]
struct Registered {
    function: MetricFn,
    greater_is_better: bool,
}

/// Resolves simple metric names (e.g. `"mae"`) to loss functions.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    metrics: HashMap<String, Registered>,
}

impl MetricRegistry {
    /// Registry without any metric; see [`MetricRegistry::default`] for the built-ins.
    pub fn empty() -> Self {
        Self {
            metrics: HashMap::new(),
        }
    }

    /// Add or replace a metric where lower values are better.
    pub fn register(&mut self, name: impl Into<String>, metric: MetricFn) -> &mut Self {
        self.insert(name.into(), metric, false)
    }

    /// Add or replace a score where higher values are better.
    pub fn register_maximized(&mut self, name: impl Into<String>, metric: MetricFn) -> &mut Self {
        self.insert(name.into(), metric, true)
    }

    fn insert(&mut self, name: String, function: MetricFn, greater_is_better: bool) -> &mut Self {
        self.metrics.insert(
            name,
            Registered {
                function,
                greater_is_better,
            },
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    /// Sorted list of registered names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.metrics.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn lookup(&self, name: &str) -> Result<Registered, MetricError> {
        self.metrics
            .get(name)
            .copied()
            .ok_or_else(|| MetricError::Unknown {
                name: name.to_string(),
            })
    }

    pub fn resolve(&self, name: &str) -> Result<MetricFn, MetricError> {
        self.lookup(name).map(|m| m.function)
    }

    /// Whether a higher value of `name` means a better forecast.
    pub fn greater_is_better(&self, name: &str) -> Result<bool, MetricError> {
        self.lookup(name).map(|m| m.greater_is_better)
    }

    /// Resolve `name` and apply it, checking that both series have the same length.
    pub fn evaluate(&self, name: &str, realised: &[f64], forecast: &[f64]) -> Result<f64, MetricError> {
        let metric = self.resolve(name)?;
        if realised.len() != forecast.len() {
            return Err(MetricError::LengthMismatch {
                expected: realised.len(),
                actual: forecast.len(),
            });
        }
        let value = metric(realised, forecast);
        tracing::debug!(metric = name, value, n = realised.len(), "evaluated metric");
        Ok(value)
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register("mae", functions::mae)
            .register("rmse", functions::rmse)
            .register("bias", functions::bias)
            .register_maximized("nsme", functions::nsme)
            .register("r_mae", functions::r_mae)
            .register("r_mae_highest", functions::r_mae_highest)
            .register("r_mae_lowest", functions::r_mae_lowest)
            .register("r_mne_highest", functions::r_mne_highest)
            .register("r_mpe_highest", functions::r_mpe_highest)
            .register_maximized("skill_score", functions::skill_score);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_metrics() {
        let registry = MetricRegistry::default();
        let mae = registry.resolve("mae").unwrap();
        assert_eq!(mae(&[1.0, 3.0], &[2.0, 3.0]), 0.5);
        assert!(registry.names().contains(&"skill_score"));
    }

    #[test]
    fn unknown_metric_is_an_error() {
        let registry = MetricRegistry::default();
        let err = registry.resolve("openstf.metrics.mae").unwrap_err();
        assert!(matches!(err, MetricError::Unknown { ref name } if name == "openstf.metrics.mae"));
    }

    #[test]
    fn custom_metric_registration() {
        fn max_abs(realised: &[f64], forecast: &[f64]) -> f64 {
            realised
                .iter()
                .zip(forecast)
                .map(|(r, f)| (r - f).abs())
                .fold(0.0, f64::max)
        }

        let mut registry = MetricRegistry::empty();
        assert!(!registry.contains("max_abs"));
        registry.register("max_abs", max_abs);
        let value = registry.evaluate("max_abs", &[1.0, 5.0], &[1.5, 2.0]).unwrap();
        assert_eq!(value, 3.0);
    }

    #[test]
    fn efficiency_scores_are_maximized() {
        let registry = MetricRegistry::default();
        assert!(registry.greater_is_better("nsme").unwrap());
        assert!(registry.greater_is_better("skill_score").unwrap());
        assert!(!registry.greater_is_better("mae").unwrap());
        assert!(!registry.greater_is_better("r_mae_highest").unwrap());
        assert!(registry.greater_is_better("mape").is_err());
    }

    #[test]
    fn evaluate_checks_lengths() {
        let registry = MetricRegistry::default();
        let err = registry.evaluate("mae", &[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, MetricError::LengthMismatch { expected: 2, actual: 1 }));
    }
}
