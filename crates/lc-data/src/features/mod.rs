//! Derivation of predictive columns from raw load data.
//!
//! Adds lagged load values, calendar flags, Dutch national holidays and
//! weather-derived columns. Lag, calendar and holiday features are only
//! derived when they are named in the requested feature list; weather
//! features are derived for every source column present unless a list is
//! given, in which case the list decides.

mod calendar;
mod holidays;
mod lags;
mod weather;

use lc_types::{Dataset, LcResult, HORIZON_COLUMN};

pub use holidays::{easter_sunday, national_holidays, Holiday};

/// Computes one derived column from the current dataset.
pub(crate) type FeatureFn = Box<dyn Fn(&Dataset) -> LcResult<Vec<f64>>>;

/// Apply the feature functions and return the dataset with the derived
/// columns appended. A `horizon` column stays last.
///
/// `horizon_hours` is the forecast horizon; short horizons (one hour or less)
/// also get intraday minute lags.
pub fn apply_features(
    mut data: Dataset,
    features: Option<&[String]>,
    horizon_hours: f64,
) -> LcResult<Dataset> {
    let horizon = data.remove_column(HORIZON_COLUMN);

    let mut functions = lags::lag_feature_functions(features, horizon_hours);
    functions.extend(calendar::calendar_feature_functions());
    functions.extend(holidays::holiday_feature_functions());

    if let Some(requested) = features {
        for (name, function) in functions {
            if !requested.iter().any(|f| *f == name) {
                continue;
            }
            let values = function(&data)?;
            data.insert_column(name, values)?;
        }
    }

    weather::add_additional_wind_features(&mut data, features)?;
    weather::add_humidity_features(&mut data, features)?;

    if let Some(horizon) = horizon {
        data.insert_column(HORIZON_COLUMN, horizon)?;
    }

    tracing::debug!(columns = data.num_columns(), "applied features");
    Ok(data)
}
