//! Gradient boosted regression trees (squared error).

use lc_metrics::MetricRegistry;
use lc_optimizer::{
    CallbackAction, EvaluationLog, FitOptions, FitReport, ObjectiveDirection, ParameterValue,
    Regressor, TrialParameters,
};
use lc_types::{FeatureMatrix, Fold, LcResult, ModelError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::tree::{build_tree, Gradients, Node, TreeConfig};

/// Booster hyperparameters, named as the tuning search space names them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbtParams {
    /// Shrinkage applied to every tree.
    pub eta: f64,
    pub max_depth: usize,
    pub n_estimators: usize,
    /// Fraction of training rows drawn for each tree.
    pub subsample: f64,
    pub min_child_weight: f64,
    /// Minimum gain for a split.
    pub gamma: f64,
    /// Fraction of features drawn for each tree.
    pub colsample_bytree: f64,
    /// L2 regularisation of leaf weights.
    pub lambda: f64,
    pub seed: u64,
}

impl Default for GbtParams {
    fn default() -> Self {
        Self {
            eta: 0.3,
            max_depth: 6,
            n_estimators: 100,
            subsample: 1.0,
            min_child_weight: 1.0,
            gamma: 0.0,
            colsample_bytree: 1.0,
            lambda: 1.0,
            seed: 0,
        }
    }
}

impl GbtParams {
    fn validate(&self) -> Result<(), ModelError> {
        let invalid = |name: &str, message: String| ModelError::InvalidParameter {
            name: name.to_string(),
            message,
        };
        if !(self.eta > 0.0 && self.eta.is_finite()) {
            return Err(invalid("eta", format!("must be positive, got {}", self.eta)));
        }
        for (name, fraction) in [
            ("subsample", self.subsample),
            ("colsample_bytree", self.colsample_bytree),
        ] {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(invalid(name, format!("must be in (0, 1], got {fraction}")));
            }
        }
        for (name, value) in [
            ("min_child_weight", self.min_child_weight),
            ("gamma", self.gamma),
            ("lambda", self.lambda),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(invalid(name, format!("must be non-negative, got {value}")));
            }
        }
        Ok(())
    }

    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_child_weight: self.min_child_weight,
            lambda: self.lambda,
            gamma: self.gamma,
        }
    }
}

fn float_param(name: &str, value: &ParameterValue) -> Result<f64, ModelError> {
    value.as_f64().ok_or_else(|| ModelError::InvalidParameter {
        name: name.to_string(),
        message: format!("expected a number, got {value}"),
    })
}

fn count_param(name: &str, value: &ParameterValue) -> Result<usize, ModelError> {
    value
        .as_i64()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| ModelError::InvalidParameter {
            name: name.to_string(),
            message: format!("expected a non-negative integer, got {value}"),
        })
}

/// Squared-error boosting with per-round evaluation, early stopping and
/// training callbacks.
#[derive(Debug, Clone, Default)]
pub struct GradientBoostedTrees {
    params: GbtParams,
    metrics: MetricRegistry,
    trees: Vec<Node>,
    base_score: f64,
    n_features: Option<usize>,
}

impl GradientBoostedTrees {
    pub fn new(params: GbtParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn params(&self) -> &GbtParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }

    fn predict_row(&self, features: &FeatureMatrix, row: usize) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|tree| self.params.eta * tree.predict(features, row))
                .sum::<f64>()
    }
}

/// Indices kept with probability `fraction`; never empty.
fn subsample(rng: &mut StdRng, items: &[usize], fraction: f64) -> Vec<usize> {
    if fraction >= 1.0 || items.is_empty() {
        return items.to_vec();
    }
    let mut kept: Vec<usize> = items
        .iter()
        .copied()
        .filter(|_| rng.random::<f64>() < fraction)
        .collect();
    if kept.is_empty() {
        kept.push(items[rng.random_range(0..items.len())]);
    }
    kept
}

impl Regressor for GradientBoostedTrees {
    fn set_params(&mut self, params: &TrialParameters) -> LcResult<()> {
        let mut next = self.params.clone();
        for (name, value) in params.iter() {
            match name.as_str() {
                "eta" | "learning_rate" => next.eta = float_param(name, value)?,
                "max_depth" => next.max_depth = count_param(name, value)?,
                "n_estimators" => next.n_estimators = count_param(name, value)?,
                "subsample" => next.subsample = float_param(name, value)?,
                "min_child_weight" => next.min_child_weight = float_param(name, value)?,
                "gamma" => next.gamma = float_param(name, value)?,
                "colsample_bytree" => next.colsample_bytree = float_param(name, value)?,
                "lambda" | "reg_lambda" => next.lambda = float_param(name, value)?,
                "seed" => {
                    next.seed = value
                        .as_i64()
                        .and_then(|v| u64::try_from(v).ok())
                        .ok_or_else(|| ModelError::InvalidParameter {
                            name: name.clone(),
                            message: format!("expected a non-negative integer, got {value}"),
                        })?
                }
                other => tracing::debug!("Ignoring unknown booster parameter {}", other),
            }
        }
        next.validate()?;
        self.params = next;
        Ok(())
    }

    fn fit(&mut self, train: &Fold, mut options: FitOptions<'_>) -> LcResult<FitReport> {
        let metric = self.metrics.resolve(&options.eval_metric)?;
        let direction = if self.metrics.greater_is_better(&options.eval_metric)? {
            ObjectiveDirection::Maximize
        } else {
            ObjectiveDirection::Minimize
        };
        let x = &train.features;
        let n_features = x.n_features();
        for (_, fold) in &options.eval_set {
            if fold.features.n_features() != n_features {
                return Err(ModelError::FeatureMismatch {
                    expected: n_features,
                    actual: fold.features.n_features(),
                }
                .into());
            }
        }

        // rows without a target cannot be fitted
        let rows: Vec<usize> = (0..train.len())
            .filter(|&r| train.target[r].is_finite())
            .collect();
        if rows.is_empty() {
            return Err(ModelError::EmptyTrainingSet.into());
        }

        let params = self.params.clone();
        let tree_config = params.tree_config();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let all_features: Vec<usize> = (0..n_features).collect();

        self.trees.clear();
        self.base_score = rows.iter().map(|&r| train.target[r]).sum::<f64>() / rows.len() as f64;
        self.n_features = Some(n_features);

        let mut predictions = vec![self.base_score; train.len()];
        let mut eval_predictions: Vec<Vec<f64>> = options
            .eval_set
            .iter()
            .map(|(_, fold)| vec![self.base_score; fold.len()])
            .collect();
        let mut hess = vec![0.0; train.len()];
        for &r in &rows {
            hess[r] = 1.0;
        }

        let mut evals = EvaluationLog::new();
        let mut report = FitReport::default();
        let mut best: Option<(usize, f64)> = None;

        for iteration in 0..params.n_estimators {
            let grad: Vec<f64> = predictions
                .iter()
                .zip(&train.target)
                .map(|(p, y)| if y.is_finite() { p - y } else { 0.0 })
                .collect();
            let sampled_rows = subsample(&mut rng, &rows, params.subsample);
            let sampled_features = subsample(&mut rng, &all_features, params.colsample_bytree);

            let tree = build_tree(
                x,
                &Gradients {
                    grad: &grad,
                    hess: &hess,
                },
                &sampled_rows,
                &sampled_features,
                0,
                &tree_config,
            );

            for (row, prediction) in predictions.iter_mut().enumerate() {
                *prediction += params.eta * tree.predict(x, row);
            }
            for ((name, fold), fold_predictions) in
                options.eval_set.iter().zip(eval_predictions.iter_mut())
            {
                for (row, prediction) in fold_predictions.iter_mut().enumerate() {
                    *prediction += params.eta * tree.predict(&fold.features, row);
                }
                let score = metric(&fold.target, fold_predictions);
                evals
                    .entry(name.clone())
                    .or_default()
                    .entry(options.eval_metric.clone())
                    .or_default()
                    .push(score);
                if options.verbose {
                    tracing::info!("[{}] {}-{}: {:.6}", iteration, name, options.eval_metric, score);
                }
            }
            self.trees.push(tree);
            report.rounds = iteration + 1;

            let mut pruned = false;
            for callback in options.callbacks.iter_mut() {
                pruned |= callback.after_iteration(iteration, &evals) == CallbackAction::Prune;
            }
            if pruned {
                report.pruned_at = Some(iteration);
                break;
            }

            let Some(watched) = options
                .eval_set
                .last()
                .and_then(|(name, _)| evals.get(name))
                .and_then(|m| m.get(&options.eval_metric))
                .and_then(|scores| scores.last().copied())
            else {
                continue;
            };
            if best.map_or(watched.is_finite(), |(_, b)| direction.is_better(watched, b)) {
                best = Some((iteration, watched));
            }
            if let Some((best_iteration, _)) = best {
                if options.early_stopping_rounds > 0
                    && iteration - best_iteration >= options.early_stopping_rounds
                {
                    tracing::debug!(iteration, best_iteration, "Early stopping");
                    break;
                }
            }
        }

        if let Some((best_iteration, best_score)) = best {
            self.trees.truncate(best_iteration + 1);
            report.best_iteration = Some(best_iteration);
            report.best_score = Some(best_score);
        }
        tracing::debug!(
            rounds = report.rounds,
            trees = self.trees.len(),
            best_score = ?report.best_score,
            "Booster fitted"
        );
        Ok(report)
    }

    fn predict(&self, features: &FeatureMatrix) -> LcResult<Vec<f64>> {
        let expected = self.n_features.ok_or(ModelError::NotFitted)?;
        if features.n_features() != expected {
            return Err(ModelError::FeatureMismatch {
                expected,
                actual: features.n_features(),
            }
            .into());
        }
        Ok((0..features.n_rows())
            .map(|row| self.predict_row(features, row))
            .collect())
    }
}
