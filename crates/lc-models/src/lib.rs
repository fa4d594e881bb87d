//! # lc-models
//!
//! Model backends implementing [`lc_optimizer::Regressor`].

mod gbt;
mod tree;

pub use gbt::{GbtParams, GradientBoostedTrees};
