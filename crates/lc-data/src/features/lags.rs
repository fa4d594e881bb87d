//! Lagged load values, named `T-<n>min` and `T-<n>d`.

use chrono::Duration;
use lc_types::{DataError, Dataset, LcResult};

use super::FeatureFn;

const DAY_LAGS: std::ops::RangeInclusive<i64> = 1..=14;
const MINUTE_LAG_STEP: i64 = 15;
const MAX_MINUTE_LAG: i64 = 900;

/// Lag of the load column, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Lag {
    minutes: i64,
    by_day: bool,
}

impl Lag {
    fn name(&self) -> String {
        if self.by_day {
            format!("T-{}d", self.minutes / (24 * 60))
        } else {
            format!("T-{}min", self.minutes)
        }
    }

    fn parse(name: &str) -> Option<Lag> {
        let rest = name.strip_prefix("T-")?;
        if let Some(minutes) = rest.strip_suffix("min") {
            let minutes: i64 = minutes.parse().ok()?;
            return (minutes > 0).then_some(Lag {
                minutes,
                by_day: false,
            });
        }
        let days: i64 = rest.strip_suffix('d')?.parse().ok()?;
        (days > 0).then_some(Lag {
            minutes: days * 24 * 60,
            by_day: true,
        })
    }
}

/// Lags always offered: day lags, plus 15-minute lags up to 15 hours when
/// the horizon is at most one hour.
fn trivial_lags(horizon_hours: f64) -> Vec<Lag> {
    let mut lags = Vec::new();
    if horizon_hours <= 1.0 {
        lags.extend(
            (MINUTE_LAG_STEP..=MAX_MINUTE_LAG)
                .step_by(MINUTE_LAG_STEP as usize)
                .map(|minutes| Lag {
                    minutes,
                    by_day: false,
                }),
        );
    }
    lags.extend(DAY_LAGS.map(|days| Lag {
        minutes: days * 24 * 60,
        by_day: true,
    }));
    lags
}

pub(super) fn lag_feature_functions(
    features: Option<&[String]>,
    horizon_hours: f64,
) -> Vec<(String, FeatureFn)> {
    let mut lags = trivial_lags(horizon_hours);
    for lag in features.unwrap_or_default().iter().filter_map(|f| Lag::parse(f)) {
        if !lags.contains(&lag) {
            lags.push(lag);
        }
    }

    lags.into_iter()
        .map(|lag| {
            let function: FeatureFn = Box::new(move |data: &Dataset| lagged_load(data, lag.minutes));
            (lag.name(), function)
        })
        .collect()
}

/// Load at `t - minutes` for every `t`, NaN where that timestamp is absent.
fn lagged_load(data: &Dataset, minutes: i64) -> LcResult<Vec<f64>> {
    let load = data.column_at(0).ok_or_else(|| DataError::ColumnNotFound {
        column: lc_types::LOAD_COLUMN.to_string(),
    })?;
    let index = data.index();
    let shift = Duration::minutes(minutes);
    Ok(index
        .iter()
        .map(|t| match index.binary_search(&(*t - shift)) {
            Ok(row) => load[row],
            Err(_) => f64::NAN,
        })
        .collect())
}
