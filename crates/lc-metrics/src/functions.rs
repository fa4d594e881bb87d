//! Loss functions comparing realised load with a forecast.
//!
//! Every function takes `(realised, forecast)` and skips pairs where either
//! side is NaN. An empty comparison yields NaN.

/// Quantile used to select the highest realised values.
const HIGHEST_QUANTILE: f64 = 0.95;
/// Quantile used to select the lowest realised values.
const LOWEST_QUANTILE: f64 = 0.05;

fn pairs(realised: &[f64], forecast: &[f64]) -> Vec<(f64, f64)> {
    realised
        .iter()
        .zip(forecast)
        .filter(|(r, f)| !r.is_nan() && !f.is_nan())
        .map(|(r, f)| (*r, *f))
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Linear-interpolated quantile of a non-empty sample.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
}

fn realised_range(pairs: &[(f64, f64)]) -> f64 {
    let (min, max) = pairs
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (r, _)| {
            (lo.min(*r), hi.max(*r))
        });
    max - min
}

/// Mean absolute error
pub fn mae(realised: &[f64], forecast: &[f64]) -> f64 {
    mean(pairs(realised, forecast).into_iter().map(|(r, f)| (r - f).abs()))
}

/// Root mean squared error
pub fn rmse(realised: &[f64], forecast: &[f64]) -> f64 {
    mean(pairs(realised, forecast).into_iter().map(|(r, f)| (r - f).powi(2))).sqrt()
}

/// Mean of `forecast - realised`; positive means over-forecasting.
pub fn bias(realised: &[f64], forecast: &[f64]) -> f64 {
    mean(pairs(realised, forecast).into_iter().map(|(r, f)| f - r))
}

/// Nash-Sutcliffe model efficiency. 1 is a perfect forecast, 0 is as good as
/// forecasting the realised mean.
pub fn nsme(realised: &[f64], forecast: &[f64]) -> f64 {
    let pairs = pairs(realised, forecast);
    let realised_mean = mean(pairs.iter().map(|(r, _)| *r));
    let residual: f64 = pairs.iter().map(|(r, f)| (r - f).powi(2)).sum();
    let variance: f64 = pairs.iter().map(|(r, _)| (r - realised_mean).powi(2)).sum();
    if pairs.is_empty() || variance == 0.0 {
        return f64::NAN;
    }
    1.0 - residual / variance
}

/// MAE relative to the range of the realised values
pub fn r_mae(realised: &[f64], forecast: &[f64]) -> f64 {
    let pairs = pairs(realised, forecast);
    let range = realised_range(&pairs);
    if pairs.is_empty() || range == 0.0 {
        return f64::NAN;
    }
    mean(pairs.iter().map(|(r, f)| (r - f).abs())) / range
}

/// Pairs whose realised value is at or beyond the given quantile.
fn tail(pairs: &[(f64, f64)], q: f64, highest: bool) -> Vec<(f64, f64)> {
    let realised: Vec<f64> = pairs.iter().map(|(r, _)| *r).collect();
    let threshold = quantile(&realised, q);
    pairs
        .iter()
        .copied()
        .filter(|(r, _)| if highest { *r >= threshold } else { *r <= threshold })
        .collect()
}

fn relative_tail_error(
    realised: &[f64],
    forecast: &[f64],
    q: f64,
    highest: bool,
    error: impl Fn(f64) -> Option<f64>,
) -> f64 {
    let pairs = pairs(realised, forecast);
    let range = realised_range(&pairs);
    if pairs.is_empty() || range == 0.0 {
        return f64::NAN;
    }
    let errors: Vec<f64> = tail(&pairs, q, highest)
        .into_iter()
        .filter_map(|(r, f)| error(f - r))
        .collect();
    if errors.is_empty() {
        return 0.0;
    }
    mean(errors.into_iter()) / range
}

/// Relative MAE over the highest 5% of realised values
pub fn r_mae_highest(realised: &[f64], forecast: &[f64]) -> f64 {
    relative_tail_error(realised, forecast, HIGHEST_QUANTILE, true, |e| Some(e.abs()))
}

/// Relative MAE over the lowest 5% of realised values
pub fn r_mae_lowest(realised: &[f64], forecast: &[f64]) -> f64 {
    relative_tail_error(realised, forecast, LOWEST_QUANTILE, false, |e| Some(e.abs()))
}

/// Relative mean negative error (under-forecast) over the highest realised values
pub fn r_mne_highest(realised: &[f64], forecast: &[f64]) -> f64 {
    relative_tail_error(realised, forecast, HIGHEST_QUANTILE, true, |e| {
        (e < 0.0).then_some(e)
    })
}

/// Relative mean positive error (over-forecast) over the highest realised values
pub fn r_mpe_highest(realised: &[f64], forecast: &[f64]) -> f64 {
    relative_tail_error(realised, forecast, HIGHEST_QUANTILE, true, |e| {
        (e > 0.0).then_some(e)
    })
}

/// `1 - MAE(forecast) / MAE(realised mean)`. Higher is better.
pub fn skill_score(realised: &[f64], forecast: &[f64]) -> f64 {
    let pairs = pairs(realised, forecast);
    let realised_mean = mean(pairs.iter().map(|(r, _)| *r));
    let baseline = mean(pairs.iter().map(|(r, _)| (r - realised_mean).abs()));
    if pairs.is_empty() || baseline == 0.0 {
        return f64::NAN;
    }
    1.0 - mean(pairs.iter().map(|(r, f)| (r - f).abs())) / baseline
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn mae_and_rmse() {
        let realised = [1.0, 2.0, 3.0, 4.0];
        let forecast = [2.0, 2.0, 1.0, 4.0];
        assert!((mae(&realised, &forecast) - 0.75).abs() < EPS);
        assert!((rmse(&realised, &forecast) - (5.0f64 / 4.0).sqrt()).abs() < EPS);
    }

    #[test]
    fn nan_pairs_are_skipped() {
        let realised = [1.0, f64::NAN, 3.0];
        let forecast = [2.0, 100.0, f64::NAN];
        assert!((mae(&realised, &forecast) - 1.0).abs() < EPS);
    }

    #[test]
    fn empty_comparison_is_nan() {
        assert!(mae(&[], &[]).is_nan());
        assert!(r_mae(&[f64::NAN], &[1.0]).is_nan());
    }

    #[test]
    fn bias_sign_follows_over_forecast() {
        assert!(bias(&[1.0, 1.0], &[2.0, 3.0]) > 0.0);
        assert!(bias(&[1.0, 1.0], &[0.0, 0.5]) < 0.0);
    }

    #[test]
    fn perfect_forecast_scores() {
        let realised = [1.0, 4.0, 2.0, 8.0, 5.0];
        assert!((nsme(&realised, &realised) - 1.0).abs() < EPS);
        assert!((skill_score(&realised, &realised) - 1.0).abs() < EPS);
        assert!(r_mae(&realised, &realised).abs() < EPS);
    }

    #[test]
    fn relative_mae_uses_range() {
        let realised = [0.0, 10.0];
        let forecast = [1.0, 9.0];
        assert!((r_mae(&realised, &forecast) - 0.1).abs() < EPS);
    }

    #[test]
    fn highest_tail_errors() {
        let realised: Vec<f64> = (0..100).map(f64::from).collect();
        let mut forecast = realised.clone();
        // under-forecast the peaks only
        for f in forecast.iter_mut().skip(95) {
            *f -= 9.9;
        }
        assert!(r_mae_highest(&realised, &forecast) > 0.0);
        assert!(r_mne_highest(&realised, &forecast) < 0.0);
        assert_eq!(r_mpe_highest(&realised, &forecast), 0.0);
        assert!(r_mae_lowest(&realised, &forecast).abs() < EPS);
    }

    #[test]
    fn quantile_interpolates() {
        assert!((quantile(&[1.0, 2.0, 3.0, 4.0], 0.5) - 2.5).abs() < EPS);
        assert!((quantile(&[5.0], 0.95) - 5.0).abs() < EPS);
    }
}
