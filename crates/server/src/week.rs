// Week math for the Sunday-start scheduling week.
//
// Everything here works on chrono's naive calendar types on purpose:
// formatting a NaiveDate always uses its calendar fields, so a week boundary
// can never shift by a day the way a UTC/ISO conversion does in
// negative-offset time zones.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Hour before which a timestamp still counts as the previous calendar day.
/// Late-night schedules (midnight to 5:59) roll forward to the day people
/// actually think of them as belonging to.
const DAY_ROLLOVER_HOUR: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Sunday,
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Day::Sunday => "Sunday",
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
        }
    }

    /// Offset from the week's Sunday start, 0..=6.
    pub fn index(self) -> u32 {
        match self {
            Day::Sunday => 0,
            Day::Monday => 1,
            Day::Tuesday => 2,
            Day::Wednesday => 3,
            Day::Thursday => 4,
            Day::Friday => 5,
            Day::Saturday => 6,
        }
    }

    pub fn from_date(date: NaiveDate) -> Day {
        match date.weekday() {
            Weekday::Sun => Day::Sunday,
            Weekday::Mon => Day::Monday,
            Weekday::Tue => Day::Tuesday,
            Weekday::Wed => Day::Wednesday,
            Weekday::Thu => Day::Thursday,
            Weekday::Fri => Day::Friday,
            Weekday::Sat => Day::Saturday,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown day name: {0:?}")]
pub struct ParseDayError(pub String);

impl FromStr for Day {
    type Err = ParseDayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sunday" => Ok(Day::Sunday),
            "Monday" => Ok(Day::Monday),
            "Tuesday" => Ok(Day::Tuesday),
            "Wednesday" => Ok(Day::Wednesday),
            "Thursday" => Ok(Day::Thursday),
            "Friday" => Ok(Day::Friday),
            "Saturday" => Ok(Day::Saturday),
            _ => Err(ParseDayError(s.to_string())),
        }
    }
}

/// The Sunday-through-Saturday span containing a reference date.
///
/// `start_str` is the canonical week key: two dates are in the same week iff
/// their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub start_str: String,
    pub end_str: String,
}

impl WeekWindow {
    pub fn key(&self) -> &str {
        &self.start_str
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start.date() && date <= self.end.date()
    }
}

/// Compute the week window for any reference date: the most recent Sunday at
/// midnight (the date itself if it is a Sunday) through the following
/// Saturday at 23:59:59.999.
pub fn week_window(date: NaiveDate) -> WeekWindow {
    let back = date.weekday().num_days_from_sunday() as i64;
    let start_date = date - Duration::days(back);
    let end_date = start_date + Duration::days(6);
    WeekWindow {
        start: start_date.and_hms_opt(0, 0, 0).expect("valid time"),
        end: end_date.and_hms_milli_opt(23, 59, 59, 999).expect("valid time"),
        start_str: start_date.format("%Y-%m-%d").to_string(),
        end_str: end_date.format("%Y-%m-%d").to_string(),
    }
}

/// Concrete calendar date of a named day within a week window.
pub fn date_for_day(window: &WeekWindow, day: Day) -> NaiveDate {
    window.start.date() + Duration::days(day.index() as i64)
}

/// Two dates are "the same week" iff their canonical week keys match. Raw
/// date subtraction would misclassify e.g. Saturday vs. the following Sunday.
pub fn is_same_week(a: NaiveDate, b: NaiveDate) -> bool {
    week_window(a).start_str == week_window(b).start_str
}

/// The calendar day a timestamp belongs to for scheduling purposes: hours
/// 00:00-05:59 still count as the previous day.
pub fn effective_date(now: NaiveDateTime) -> NaiveDate {
    if now.hour() < DAY_ROLLOVER_HOUR {
        now.date() - Duration::days(1)
    } else {
        now.date()
    }
}

pub fn effective_day(now: NaiveDateTime) -> Day {
    Day::from_date(effective_date(now))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid week parameter: {0:?}")]
pub struct ParseWeekError(pub String);

/// Parse a `YYYY-MM-DD` week identifier back into a window-anchoring date.
///
/// Components are parsed explicitly; the string is never handed to a
/// locale- or timezone-dependent date constructor.
pub fn parse_week_param(s: &str) -> Result<NaiveDate, ParseWeekError> {
    let mut parts = s.splitn(3, '-');
    let (year, month, day) = match (parts.next(), parts.next(), parts.next()) {
        (Some(y), Some(m), Some(d)) => (y, m, d),
        _ => return Err(ParseWeekError(s.to_string())),
    };
    let year: i32 = year.parse().map_err(|_| ParseWeekError(s.to_string()))?;
    let month: u32 = month.parse().map_err(|_| ParseWeekError(s.to_string()))?;
    let day: u32 = day.parse().map_err(|_| ParseWeekError(s.to_string()))?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| ParseWeekError(s.to_string()))
}

/// Human-readable form of a week window, e.g. "Jan 14 - Jan 20, 2024".
pub fn format_week_range(window: &WeekWindow) -> String {
    let start = window.start.date();
    let end = window.end.date();
    if start.year() == end.year() {
        format!(
            "{} - {}, {}",
            start.format("%b %-d"),
            end.format("%b %-d"),
            start.year()
        )
    } else {
        format!(
            "{}, {} - {}, {}",
            start.format("%b %-d"),
            start.year(),
            end.format("%b %-d"),
            end.year()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_for_midweek_date() {
        // Wednesday Jan 17 2024 -> Sunday Jan 14 through Saturday Jan 20
        let window = week_window(date(2024, 1, 17));
        assert_eq!(window.start, date(2024, 1, 14).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(
            window.end,
            date(2024, 1, 20).and_hms_milli_opt(23, 59, 59, 999).unwrap()
        );
        assert_eq!(window.key(), "2024-01-14");
        assert_eq!(window.end_str, "2024-01-20");
    }

    #[test]
    fn sunday_anchors_its_own_week() {
        let window = week_window(date(2024, 1, 14));
        assert_eq!(window.start_date(), date(2024, 1, 14));
    }

    #[test]
    fn window_spans_month_boundary() {
        // Wednesday Jan 31 2024 -> week ends Saturday Feb 3
        let window = week_window(date(2024, 1, 31));
        assert_eq!(window.start_str, "2024-01-28");
        assert_eq!(window.end_str, "2024-02-03");
    }

    #[test]
    fn same_week_within_span_and_not_across() {
        assert!(is_same_week(date(2024, 1, 14), date(2024, 1, 20)));
        assert!(is_same_week(date(2024, 1, 17), date(2024, 1, 18)));
        // Saturday and the following Sunday are one day apart but different weeks
        assert!(!is_same_week(date(2024, 1, 20), date(2024, 1, 21)));
        assert!(!is_same_week(date(2024, 1, 17), date(2024, 1, 24)));
    }

    #[test]
    fn week_key_round_trips() {
        let d = date(2024, 1, 17);
        let key = week_window(d).start_str.clone();
        let parsed = parse_week_param(&key).unwrap();
        assert_eq!(week_window(parsed), week_window(d));
    }

    #[test]
    fn date_for_each_day_of_week() {
        let window = week_window(date(2024, 1, 17));
        assert_eq!(date_for_day(&window, Day::Sunday), date(2024, 1, 14));
        assert_eq!(date_for_day(&window, Day::Tuesday), date(2024, 1, 16));
        assert_eq!(date_for_day(&window, Day::Saturday), date(2024, 1, 20));
    }

    #[test]
    fn early_morning_rolls_to_previous_day() {
        let late_night = date(2024, 1, 18).and_hms_opt(2, 30, 0).unwrap();
        assert_eq!(effective_date(late_night), date(2024, 1, 17));
        assert_eq!(effective_day(late_night), Day::Wednesday);

        let morning = date(2024, 1, 18).and_hms_opt(6, 0, 0).unwrap();
        assert_eq!(effective_date(morning), date(2024, 1, 18));
    }

    #[test]
    fn rollover_crosses_week_boundary() {
        // 1am Sunday still belongs to Saturday, i.e. the previous week
        let sunday_night = date(2024, 1, 21).and_hms_opt(1, 0, 0).unwrap();
        assert_eq!(effective_date(sunday_night), date(2024, 1, 20));
        assert!(!is_same_week(
            effective_date(sunday_night),
            date(2024, 1, 21)
        ));
    }

    #[test]
    fn parse_week_param_rejects_garbage() {
        assert!(parse_week_param("not-a-date").is_err());
        assert!(parse_week_param("2024-13-01").is_err());
        assert!(parse_week_param("2024-02-30").is_err());
        assert!(parse_week_param("2024-01").is_err());
        assert!(parse_week_param("").is_err());
    }

    #[test]
    fn day_name_round_trip() {
        for day in Day::ALL {
            assert_eq!(day.name().parse::<Day>().unwrap(), day);
        }
        assert!("Funday".parse::<Day>().is_err());
        assert!("monday".parse::<Day>().is_err());
    }

    #[test]
    fn week_range_formatting() {
        let window = week_window(date(2024, 1, 17));
        assert_eq!(format_week_range(&window), "Jan 14 - Jan 20, 2024");

        let new_year = week_window(date(2024, 12, 31));
        assert_eq!(format_week_range(&new_year), "Dec 29, 2024 - Jan 4, 2025");
    }
}
