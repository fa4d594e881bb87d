//! Time-indexed tabular data for load forecasting.
//!
//! A [`Dataset`] is stored column-major: one `Vec<f64>` per column, all of the
//! same length as the time index. Missing values are `f64::NAN`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::errors::{DataError, LcResult, TuningError};

/// Name of the prediction target. Must be the first column at training time.
pub const LOAD_COLUMN: &str = "load";
/// Name of the forecast-horizon indicator. Must be the last column at training time.
pub const HORIZON_COLUMN: &str = "horizon";

/// Ordered-by-time table of named numeric columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    index: Vec<DateTime<Utc>>,
    columns: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl Dataset {
    /// Create an empty table over a strictly increasing time index.
    pub fn new(index: Vec<DateTime<Utc>>) -> LcResult<Self> {
        if let Some(position) = index.windows(2).position(|w| w[0] >= w[1]) {
            return Err(DataError::UnorderedIndex {
                position: position + 1,
            }
            .into());
        }
        Ok(Self {
            index,
            columns: Vec::new(),
            values: Vec::new(),
        })
    }

    pub fn from_columns(
        index: Vec<DateTime<Utc>>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> LcResult<Self> {
        let mut dataset = Self::new(index)?;
        for (name, values) in columns {
            if dataset.has_column(&name) {
                return Err(DataError::DuplicateColumn { column: name }.into());
            }
            dataset.insert_column(name, values)?;
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.position(name).map(|i| self.values[i].as_slice())
    }

    pub fn column_at(&self, position: usize) -> Option<&[f64]> {
        self.values.get(position).map(Vec::as_slice)
    }

    /// Append a column, or overwrite it in place when the name already exists.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> LcResult<()> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(DataError::LengthMismatch {
                column: name,
                expected: self.len(),
                actual: values.len(),
            }
            .into());
        }
        match self.position(&name) {
            Some(i) => self.values[i] = values,
            None => {
                self.columns.push(name);
                self.values.push(values);
            }
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Vec<f64>> {
        let i = self.position(name)?;
        self.columns.remove(i);
        Some(self.values.remove(i))
    }

    /// Set a constant `horizon` column and move it to the last position.
    pub fn with_horizon(mut self, horizon: f64) -> Self {
        self.remove_column(HORIZON_COLUMN);
        self.columns.push(HORIZON_COLUMN.to_string());
        self.values.push(vec![horizon; self.len()]);
        self
    }

    /// Contiguous row slice, keeping every column.
    pub fn slice_rows(&self, rows: Range<usize>) -> Dataset {
        Dataset {
            index: self.index[rows.clone()].to_vec(),
            columns: self.columns.clone(),
            values: self.values.iter().map(|c| c[rows.clone()].to_vec()).collect(),
        }
    }

    /// Row subset. `rows` must be sorted ascending to keep the index ordered.
    pub fn select_rows(&self, rows: &[usize]) -> Dataset {
        debug_assert!(rows.windows(2).all(|w| w[0] < w[1]));
        Dataset {
            index: rows.iter().map(|&r| self.index[r]).collect(),
            columns: self.columns.clone(),
            values: self
                .values
                .iter()
                .map(|c| rows.iter().map(|&r| c[r]).collect())
                .collect(),
        }
    }

    /// Check the `[load, ...features..., horizon]` column order required for training.
    pub fn validate_forecast_layout(&self) -> Result<(), TuningError> {
        let first = self.columns.first().map(String::as_str).unwrap_or("<none>");
        let last = self.columns.last().map(String::as_str).unwrap_or("<none>");
        if self.columns.len() < 2 || first != LOAD_COLUMN || last != HORIZON_COLUMN {
            return Err(TuningError::ColumnOrder {
                first: first.to_string(),
                last: last.to_string(),
            });
        }
        Ok(())
    }

    /// Split into model inputs and target by position: the target is column 0,
    /// the features are every column except the first and the last.
    pub fn to_fold(&self) -> Fold {
        let n = self.columns.len();
        let target = self.values.first().cloned().unwrap_or_default();
        let (names, columns) = if n > 2 {
            (self.columns[1..n - 1].to_vec(), self.values[1..n - 1].to_vec())
        } else {
            (Vec::new(), Vec::new())
        };
        Fold {
            features: FeatureMatrix {
                names,
                columns,
                n_rows: self.len(),
            },
            target,
        }
    }
}

/// Column-major matrix of model inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    n_rows: usize,
}

impl FeatureMatrix {
    pub fn new(names: Vec<String>, columns: Vec<Vec<f64>>) -> LcResult<Self> {
        if names.len() != columns.len() {
            return Err(DataError::InvalidFormat {
                message: format!(
                    "{} feature names for {} feature columns",
                    names.len(),
                    columns.len()
                ),
            }
            .into());
        }
        let n_rows = columns.first().map_or(0, Vec::len);
        for (name, column) in names.iter().zip(&columns) {
            if column.len() != n_rows {
                return Err(DataError::LengthMismatch {
                    column: name.clone(),
                    expected: n_rows,
                    actual: column.len(),
                }
                .into());
            }
        }
        Ok(Self {
            names,
            columns,
            n_rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, feature: usize) -> &[f64] {
        &self.columns[feature]
    }

    pub fn value(&self, row: usize, feature: usize) -> f64 {
        self.columns[feature][row]
    }
}

/// One partition of a dataset, already split into `(features, target)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fold {
    pub features: FeatureMatrix,
    pub target: Vec<f64>,
}

impl Fold {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}
