//! Train/validation/test partitioning of time-ordered data.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use lc_types::{DataError, Dataset, LcResult, TuningError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// How a dataset is partitioned into folds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub validation_fraction: f64,
    /// Draw validation and test from the most recent part of the timeline.
    pub backtest: bool,
    /// Seed for the day sampling used when `backtest` is false.
    pub seed: Option<u64>,
}

impl SplitConfig {
    pub fn backtest(test_fraction: f64, validation_fraction: f64) -> Self {
        Self {
            test_fraction,
            validation_fraction,
            backtest: true,
            seed: None,
        }
    }

    pub fn validate(&self) -> Result<(), TuningError> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(TuningError::InvalidFraction {
                message: format!("test_fraction must be in (0, 1), got {}", self.test_fraction),
            });
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(TuningError::InvalidFraction {
                message: format!(
                    "validation_fraction must be in [0, 1), got {}",
                    self.validation_fraction
                ),
            });
        }
        if self.test_fraction + self.validation_fraction >= 1.0 {
            return Err(TuningError::InvalidFraction {
                message: format!(
                    "test_fraction + validation_fraction must be below 1, got {}",
                    self.test_fraction + self.validation_fraction
                ),
            });
        }
        Ok(())
    }
}

/// Disjoint, time-ordered folds
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResult {
    pub train: Dataset,
    pub validation: Dataset,
    pub test: Dataset,
}

/// Partition `data` into train, validation and test folds.
///
/// The test fold is always the most recent `round(test_fraction * n)` rows.
/// In backtest mode the validation fold is the block immediately before it;
/// otherwise whole calendar days are drawn at random from the remaining rows
/// until the validation size is reached.
pub fn split_train_validation_test(data: &Dataset, config: &SplitConfig) -> LcResult<SplitResult> {
    config.validate()?;

    let n = data.len();
    let n_test = (config.test_fraction * n as f64).round() as usize;
    let n_val = (config.validation_fraction * n as f64).round() as usize;
    if n_test == 0 {
        return Err(TuningError::InvalidFraction {
            message: format!(
                "test_fraction {} selects no test rows out of {n}",
                config.test_fraction
            ),
        }
        .into());
    }
    if n_test + n_val >= n {
        return Err(DataError::InsufficientData {
            message: format!(
                "{n} rows leave no training data after {n_val} validation and {n_test} test rows"
            ),
        }
        .into());
    }

    let test_start = n - n_test;
    let test = data.slice_rows(test_start..n);

    let (train, validation) = if config.backtest {
        let val_start = test_start - n_val;
        (
            data.slice_rows(0..val_start),
            data.slice_rows(val_start..test_start),
        )
    } else {
        let (train_rows, val_rows) = sample_validation_days(data, test_start, n_val, config.seed);
        if train_rows.is_empty() {
            return Err(DataError::InsufficientData {
                message: "validation days consumed every training row".to_string(),
            }
            .into());
        }
        (data.select_rows(&train_rows), data.select_rows(&val_rows))
    };

    tracing::debug!(
        train = train.len(),
        validation = validation.len(),
        test = test.len(),
        backtest = config.backtest,
        "split dataset"
    );

    Ok(SplitResult {
        train,
        validation,
        test,
    })
}

/// Returns `(train_rows, validation_rows)` over `0..end`, both ascending.
fn sample_validation_days(
    data: &Dataset,
    end: usize,
    n_val: usize,
    seed: Option<u64>,
) -> (Vec<usize>, Vec<usize>) {
    let mut days: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (row, timestamp) in data.index()[..end].iter().enumerate() {
        days.entry(timestamp.date_naive()).or_default().push(row);
    }

    let mut order: Vec<NaiveDate> = days.keys().copied().collect();
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };
    order.shuffle(&mut rng);

    let mut is_validation = vec![false; end];
    let mut taken = 0;
    for day in order {
        if taken >= n_val {
            break;
        }
        for &row in &days[&day] {
            is_validation[row] = true;
            taken += 1;
        }
    }

    (0..end).partition(|&row| !is_validation[row])
}
