//! Dutch national holidays and bridge days.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use lc_types::Dataset;

use super::FeatureFn;

/// A public holiday in the Dutch national calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Holiday {
    NewYearsDay,
    EasterSunday,
    EasterMonday,
    KingsDay,
    LiberationDay,
    AscensionDay,
    WhitSunday,
    WhitMonday,
    ChristmasDay,
    SecondChristmasDay,
}

impl Holiday {
    pub const ALL: [Holiday; 10] = [
        Holiday::NewYearsDay,
        Holiday::EasterSunday,
        Holiday::EasterMonday,
        Holiday::KingsDay,
        Holiday::LiberationDay,
        Holiday::AscensionDay,
        Holiday::WhitSunday,
        Holiday::WhitMonday,
        Holiday::ChristmasDay,
        Holiday::SecondChristmasDay,
    ];

    /// Name of the feature column flagging this holiday.
    pub fn feature_name(&self) -> &'static str {
        match self {
            Holiday::NewYearsDay => "IsNewYearsDay",
            Holiday::EasterSunday => "IsEasterSunday",
            Holiday::EasterMonday => "IsEasterMonday",
            Holiday::KingsDay => "IsKingsDay",
            Holiday::LiberationDay => "IsLiberationDay",
            Holiday::AscensionDay => "IsAscensionDay",
            Holiday::WhitSunday => "IsWhitSunday",
            Holiday::WhitMonday => "IsWhitMonday",
            Holiday::ChristmasDay => "IsChristmasDay",
            Holiday::SecondChristmasDay => "IsSecondChristmasDay",
        }
    }
}

/// Easter Sunday in the Gregorian calendar (anonymous computus).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// `date`, or the day before when it falls on a Sunday.
fn off_sunday(date: NaiveDate) -> NaiveDate {
    if date.weekday() == Weekday::Sun {
        date - Duration::days(1)
    } else {
        date
    }
}

/// National holidays for one year, sorted by date.
///
/// King's Day moves to the 26th when the 27th is a Sunday (Queen's Day on
/// April 30th before 2014, same rule). Liberation Day is only a day off in
/// lustrum years.
pub fn national_holidays(year: i32) -> Vec<(NaiveDate, Holiday)> {
    let ymd = |month, day| NaiveDate::from_ymd_opt(year, month, day);
    let Some(easter) = easter_sunday(year) else {
        return Vec::new();
    };
    let kings_day = if year >= 2014 { ymd(4, 27) } else { ymd(4, 30) };

    let mut holidays: Vec<(NaiveDate, Holiday)> = [
        (ymd(1, 1), Holiday::NewYearsDay),
        (Some(easter), Holiday::EasterSunday),
        (Some(easter + Duration::days(1)), Holiday::EasterMonday),
        (kings_day.map(off_sunday), Holiday::KingsDay),
        (Some(easter + Duration::days(39)), Holiday::AscensionDay),
        (Some(easter + Duration::days(49)), Holiday::WhitSunday),
        (Some(easter + Duration::days(50)), Holiday::WhitMonday),
        (ymd(12, 25), Holiday::ChristmasDay),
        (ymd(12, 26), Holiday::SecondChristmasDay),
        (ymd(5, 5).filter(|_| year % 5 == 0), Holiday::LiberationDay),
    ]
    .into_iter()
    .filter_map(|(date, holiday)| date.map(|d| (d, holiday)))
    .collect();
    holidays.sort();
    holidays
}

/// Holiday calendar covering every year present in a dataset.
struct Calendar {
    holidays: BTreeMap<NaiveDate, Vec<Holiday>>,
}

impl Calendar {
    fn for_dataset(data: &Dataset) -> Self {
        let years: BTreeSet<i32> = data.index().iter().map(|t| t.year()).collect();
        let mut holidays: BTreeMap<NaiveDate, Vec<Holiday>> = BTreeMap::new();
        // neighbouring years are needed for bridge days around New Year
        let years: BTreeSet<i32> = years.into_iter().flat_map(|y| [y - 1, y, y + 1]).collect();
        for (date, holiday) in years.into_iter().flat_map(national_holidays) {
            holidays.entry(date).or_default().push(holiday);
        }
        Self { holidays }
    }

    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains_key(&date)
    }

    fn is_off(&self, date: NaiveDate) -> bool {
        date.weekday().num_days_from_monday() >= 5 || self.is_holiday(date)
    }

    /// A working day squeezed between a holiday and a weekend.
    fn is_bridgeday(&self, date: NaiveDate) -> bool {
        if self.is_off(date) {
            return false;
        }
        let before = date - Duration::days(1);
        let after = date + Duration::days(1);
        (self.is_holiday(before) && self.is_off(after))
            || (self.is_off(before) && self.is_holiday(after))
    }
}

fn from_calendar(f: impl Fn(&Calendar, NaiveDate) -> bool + 'static) -> FeatureFn {
    Box::new(move |data: &Dataset| {
        let calendar = Calendar::for_dataset(data);
        Ok(data
            .index()
            .iter()
            .map(|t| if f(&calendar, t.date_naive()) { 1.0 } else { 0.0 })
            .collect())
    })
}

pub(super) fn holiday_feature_functions() -> Vec<(String, FeatureFn)> {
    let mut functions: Vec<(String, FeatureFn)> = vec![(
        "IsNationalHoliday".to_string(),
        from_calendar(|calendar, date| calendar.is_holiday(date)),
    )];
    for holiday in Holiday::ALL {
        functions.push((
            holiday.feature_name().to_string(),
            from_calendar(move |calendar, date| {
                calendar
                    .holidays
                    .get(&date)
                    .is_some_and(|holidays| holidays.contains(&holiday))
            }),
        ));
    }
    functions.push((
        "IsBridgeday".to_string(),
        from_calendar(|calendar, date| calendar.is_bridgeday(date)),
    ));
    functions
}
