//! Calendar flags derived from the time index.

use chrono::{DateTime, Datelike, Utc, Weekday};
use lc_types::Dataset;

use super::FeatureFn;

fn from_index(f: fn(&DateTime<Utc>) -> f64) -> FeatureFn {
    Box::new(move |data: &Dataset| Ok(data.index().iter().map(f).collect()))
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

pub(super) fn calendar_feature_functions() -> Vec<(String, FeatureFn)> {
    vec![
        (
            "IsWeekendDay".to_string(),
            from_index(|t| flag(t.weekday().num_days_from_monday() >= 5)),
        ),
        (
            "IsWeekDay".to_string(),
            from_index(|t| flag(t.weekday().num_days_from_monday() < 5)),
        ),
        (
            "IsSunday".to_string(),
            from_index(|t| flag(t.weekday() == Weekday::Sun)),
        ),
        ("Month".to_string(), from_index(|t| f64::from(t.month()))),
        (
            "Quarter".to_string(),
            from_index(|t| f64::from((t.month() - 1) / 3 + 1)),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn evaluate(name: &str, data: &Dataset) -> Vec<f64> {
        let (_, function) = calendar_feature_functions()
            .into_iter()
            .find(|(n, _)| n == name)
            .unwrap();
        function(data).unwrap()
    }

    #[test]
    fn weekday_flags() {
        // 2021-08-06 is a Friday
        let start = Utc.with_ymd_and_hms(2021, 8, 6, 12, 0, 0).unwrap();
        let index = (0..3).map(|d| start + Duration::days(d)).collect();
        let data = Dataset::new(index).unwrap();

        assert_eq!(evaluate("IsWeekendDay", &data), vec![0.0, 1.0, 1.0]);
        assert_eq!(evaluate("IsWeekDay", &data), vec![1.0, 0.0, 0.0]);
        assert_eq!(evaluate("IsSunday", &data), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn month_and_quarter() {
        let index = [1, 4, 7, 12]
            .iter()
            .map(|m| Utc.with_ymd_and_hms(2021, *m, 15, 0, 0, 0).unwrap())
            .collect();
        let data = Dataset::new(index).unwrap();
        assert_eq!(evaluate("Month", &data), vec![1.0, 4.0, 7.0, 12.0]);
        assert_eq!(evaluate("Quarter", &data), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
