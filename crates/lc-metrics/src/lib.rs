//! Forecast evaluation metrics for LoadCast.
//!
//! Provides:
//! - Scalar loss functions over `(realised, forecast)` pairs
//! - A name-based [`MetricRegistry`] used by tuning objectives and backends

pub mod functions;
pub mod registry;

pub use functions::*;
pub use registry::{MetricFn, MetricRegistry};
