//! Country holiday calendars for the decomposition model.
//!
//! Only fixed-date public holidays are listed. Lunar-calendar holidays (e.g. the
//! religious feasts in TR) and weekday-anchored US holidays are not modeled.

use chrono::{Datelike, NaiveDate};

type FixedHoliday = (u32, u32, &'static str);

const TR: &[FixedHoliday] = &[
    (1, 1, "new_years_day"),
    (4, 23, "national_sovereignty_and_childrens_day"),
    (5, 1, "labour_day"),
    (5, 19, "youth_and_sports_day"),
    (7, 15, "democracy_and_national_unity_day"),
    (8, 30, "victory_day"),
    (10, 29, "republic_day"),
];

const US: &[FixedHoliday] = &[
    (1, 1, "new_years_day"),
    (6, 19, "juneteenth"),
    (7, 4, "independence_day"),
    (11, 11, "veterans_day"),
    (12, 25, "christmas_day"),
];

/// Fixed-date calendar for an ISO country code (case-insensitive).
/// An empty code means "no holidays". Unknown codes return `None`.
pub fn calendar(country: &str) -> Option<&'static [FixedHoliday]> {
    match country.to_ascii_uppercase().as_str() {
        "" => Some(&[]),
        "TR" => Some(TR),
        "US" => Some(US),
        _ => None,
    }
}

/// Name of the holiday falling on `date`, if any.
pub fn holiday_on(calendar: &[FixedHoliday], date: NaiveDate) -> Option<&'static str> {
    calendar
        .iter()
        .find(|(m, d, _)| *m == date.month() && *d == date.day())
        .map(|(_, _, name)| *name)
}
