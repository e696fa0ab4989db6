use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_WEEK_RANGE_PREFIX: &str = "Tuần từ";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("invalid week token {0:?}, expected YYYY-Www")]
    InvalidWeekToken(String),
    #[error("invalid attendance category {0:?}, expected thursday or sunday")]
    InvalidCategory(String),
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
}

impl CalendarError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidWeekToken(_) => "invalid_week_token",
            Self::InvalidCategory(_) => "invalid_category",
            Self::InvalidDate(_) => "invalid_date",
        }
    }
}

/// Which of the two weekly sessions a date belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceCategory {
    Thursday,
    Sunday,
}

impl AttendanceCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thursday => "thursday",
            Self::Sunday => "sunday",
        }
    }

    pub fn weekday(self) -> Weekday {
        match self {
            Self::Thursday => Weekday::Thu,
            Self::Sunday => Weekday::Sun,
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            Self::Thursday => "Thứ 5",
            Self::Sunday => "Chủ nhật",
        }
    }
}

impl FromStr for AttendanceCategory {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "thursday" => Ok(Self::Thursday),
            "sunday" => Ok(Self::Sunday),
            other => Err(CalendarError::InvalidCategory(other.to_string())),
        }
    }
}

impl fmt::Display for AttendanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ISO week identifier rendered as `YYYY-Www`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekToken {
    year: i32,
    week: u32,
}

impl WeekToken {
    pub fn new(year: i32, week: u32) -> Result<Self, CalendarError> {
        if !(1..=9999).contains(&year) || week == 0 || week > weeks_in_year(year) {
            return Err(CalendarError::InvalidWeekToken(format!(
                "{:04}-W{:02}",
                year, week
            )));
        }
        Ok(Self { year, week })
    }

    #[allow(dead_code)]
    pub fn year(&self) -> i32 {
        self.year
    }

    #[allow(dead_code)]
    pub fn week(&self) -> u32 {
        self.week
    }
}

impl FromStr for WeekToken {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CalendarError::InvalidWeekToken(s.to_string());
        let b = s.as_bytes();
        if b.len() != 8
            || b[4] != b'-'
            || b[5] != b'W'
            || !b[..4].iter().all(u8::is_ascii_digit)
            || !b[6..].iter().all(u8::is_ascii_digit)
        {
            return Err(invalid());
        }
        let year = s[..4].parse::<i32>().map_err(|_| invalid())?;
        let week = s[6..].parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, week).map_err(|_| invalid())
    }
}

impl TryFrom<String> for WeekToken {
    type Error = CalendarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WeekToken> for String {
    fn from(value: WeekToken) -> Self {
        value.to_string()
    }
}

impl fmt::Display for WeekToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-W{:02}", self.year, self.week)
    }
}

/// Monday through Sunday of one week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub start_date_str: String,
    pub end_date_str: String,
}

impl DateRange {
    fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            start_date_str: iso_date(start),
            end_date_str: iso_date(end),
        }
    }

    #[allow(dead_code)]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidAttendanceDate {
    pub value: String,
    pub label: String,
    pub date: NaiveDate,
    pub category: AttendanceCategory,
}

impl ValidAttendanceDate {
    fn new(date: NaiveDate, category: AttendanceCategory) -> Self {
        Self {
            value: iso_date(date),
            label: format!("{} - {}", category.display_name(), date.format("%d/%m/%Y")),
            date,
            category,
        }
    }
}

pub fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses `YYYY-MM-DD`, limited to four-digit years so every date has a week token.
pub fn parse_date(raw: &str) -> Result<NaiveDate, CalendarError> {
    let t = raw.trim();
    let date = NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .map_err(|_| CalendarError::InvalidDate(raw.to_string()))?;
    if !(1..=9999).contains(&date.year()) {
        return Err(CalendarError::InvalidDate(raw.to_string()));
    }
    Ok(date)
}

/// Lenient classifier: Sunday is `sunday`, every other weekday is treated as `thursday`.
/// Use [`is_valid_attendance_date`] when the weekday itself must be checked.
pub fn category_for_date(date: NaiveDate) -> AttendanceCategory {
    if date.weekday() == Weekday::Sun {
        AttendanceCategory::Sunday
    } else {
        AttendanceCategory::Thursday
    }
}

pub fn is_valid_attendance_date(date: NaiveDate, category: AttendanceCategory) -> bool {
    date.weekday() == category.weekday()
}

pub fn most_recent_attendance_date(category: AttendanceCategory, today: NaiveDate) -> NaiveDate {
    (0..7)
        .map(|back| today - Duration::days(back))
        .find(|d| is_valid_attendance_date(*d, category))
        .or_else(|| {
            valid_attendance_dates(category, 2, today)
                .last()
                .map(|d| d.date)
        })
        .unwrap_or(today)
}

/// Session dates for the last `weeks_back` Sunday-based weeks, newest first.
/// The current week's session is skipped when it is still ahead of `today`.
pub fn valid_attendance_dates(
    category: AttendanceCategory,
    weeks_back: u32,
    today: NaiveDate,
) -> Vec<ValidAttendanceDate> {
    let target = i64::from(category.weekday().num_days_from_sunday());
    let mut dates: Vec<ValidAttendanceDate> = (0..i64::from(weeks_back))
        .filter_map(|i| {
            let anchor = today - Duration::days(7 * i);
            let offset = target - i64::from(anchor.weekday().num_days_from_sunday());
            let date = anchor + Duration::days(offset);
            (date <= today).then(|| ValidAttendanceDate::new(date, category))
        })
        .collect();
    dates.sort_by(|a, b| b.date.cmp(&a.date));
    dates
}

/// Thursday of the Monday-based week containing `date`; its year owns the week.
fn iso_thursday(date: NaiveDate) -> NaiveDate {
    let iso_weekday = i64::from(date.weekday().number_from_monday());
    date + Duration::days(4 - iso_weekday)
}

pub fn week_number(date: NaiveDate) -> u32 {
    let thursday = iso_thursday(date);
    // Week 1 is the week holding the year's first Thursday (equivalently, Jan 4),
    // so whole weeks elapsed since that Thursday give the number.
    thursday.ordinal0() / 7 + 1
}

pub fn week_token(date: NaiveDate) -> WeekToken {
    WeekToken {
        year: iso_thursday(date).year(),
        week: week_number(date),
    }
}

pub fn default_week_token(today: NaiveDate) -> WeekToken {
    week_token(most_recent_attendance_date(
        AttendanceCategory::Thursday,
        today,
    ))
}

fn weeks_in_year(year: i32) -> u32 {
    // Dec 28 always sits in the last ISO week of its year.
    NaiveDate::from_ymd_opt(year, 12, 28)
        .map(week_number)
        .unwrap_or(52)
}

fn week_one_monday(year: i32) -> Option<NaiveDate> {
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let weekday = i64::from(jan1.weekday().number_from_monday());
    if weekday <= 4 {
        Some(jan1 - Duration::days(weekday - 1))
    } else {
        Some(jan1 + Duration::days(8 - weekday))
    }
}

pub fn week_date_range(token: &WeekToken) -> Result<DateRange, CalendarError> {
    let monday = week_one_monday(token.year)
        .ok_or_else(|| CalendarError::InvalidWeekToken(token.to_string()))?;
    let start = monday + Duration::days(7 * (i64::from(token.week) - 1));
    Ok(DateRange::new(start, start + Duration::days(6)))
}

#[allow(dead_code)]
pub fn format_week_range(token: &WeekToken) -> Result<String, CalendarError> {
    format_week_range_with_prefix(token, DEFAULT_WEEK_RANGE_PREFIX)
}

pub fn format_week_range_with_prefix(
    token: &WeekToken,
    prefix: &str,
) -> Result<String, CalendarError> {
    let range = week_date_range(token)?;
    Ok(format!(
        "{} {} đến {}",
        prefix,
        range.start.format("%d/%m"),
        range.end.format("%d/%m")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    fn wednesday() -> NaiveDate {
        d(2024, 1, 17)
    }

    #[test]
    fn classifier_maps_sunday_and_everything_else() {
        assert_eq!(category_for_date(d(2024, 1, 14)), AttendanceCategory::Sunday);
        assert_eq!(category_for_date(d(2024, 1, 18)), AttendanceCategory::Thursday);
        // Lenient: a Wednesday is still classified as thursday.
        assert_eq!(category_for_date(wednesday()), AttendanceCategory::Thursday);
    }

    #[test]
    fn strict_check_disagrees_with_classifier_off_session_days() {
        let start = d(2024, 1, 1);
        for offset in 0..28 {
            let date = start + Duration::days(offset);
            let valid = is_valid_attendance_date(date, category_for_date(date));
            let session_day = matches!(date.weekday(), Weekday::Thu | Weekday::Sun);
            assert_eq!(valid, session_day, "{}", date);
        }
    }

    #[test]
    fn category_parse_rejects_unknown_values() {
        assert_eq!(
            "sunday".parse::<AttendanceCategory>(),
            Ok(AttendanceCategory::Sunday)
        );
        assert_eq!(
            "monday".parse::<AttendanceCategory>(),
            Err(CalendarError::InvalidCategory("monday".to_string()))
        );
        assert!("".parse::<AttendanceCategory>().is_err());
    }

    #[test]
    fn most_recent_dates_for_a_wednesday() {
        assert_eq!(
            most_recent_attendance_date(AttendanceCategory::Thursday, wednesday()),
            d(2024, 1, 11)
        );
        assert_eq!(
            most_recent_attendance_date(AttendanceCategory::Sunday, wednesday()),
            d(2024, 1, 14)
        );
    }

    #[test]
    fn most_recent_on_the_session_day_is_today() {
        let thursday = d(2024, 1, 18);
        assert_eq!(
            most_recent_attendance_date(AttendanceCategory::Thursday, thursday),
            thursday
        );
        let sunday = d(2024, 1, 21);
        assert_eq!(
            most_recent_attendance_date(AttendanceCategory::Sunday, sunday),
            sunday
        );
    }

    #[test]
    fn valid_sunday_dates_cross_the_year() {
        let got: Vec<String> = valid_attendance_dates(AttendanceCategory::Sunday, 3, wednesday())
            .into_iter()
            .map(|v| v.value)
            .collect();
        assert_eq!(got, vec!["2024-01-14", "2024-01-07", "2023-12-31"]);
    }

    #[test]
    fn valid_thursday_dates_skip_the_upcoming_session() {
        let got = valid_attendance_dates(AttendanceCategory::Thursday, 3, wednesday());
        let values: Vec<&str> = got.iter().map(|v| v.value.as_str()).collect();
        assert_eq!(values, vec!["2024-01-11", "2024-01-04"]);
        assert_eq!(got[0].label, "Thứ 5 - 11/01/2024");
    }

    #[test]
    fn valid_dates_hold_their_invariants() {
        let start = d(2023, 12, 1);
        for offset in 0..60 {
            let today = start + Duration::days(offset);
            for category in [AttendanceCategory::Thursday, AttendanceCategory::Sunday] {
                for weeks_back in [1u32, 2, 5, 12] {
                    let dates = valid_attendance_dates(category, weeks_back, today);
                    assert!(dates.len() <= weeks_back as usize);
                    assert!(!dates.is_empty() || weeks_back == 1);
                    for v in &dates {
                        assert!(is_valid_attendance_date(v.date, category));
                        assert!(v.date <= today);
                    }
                    for pair in dates.windows(2) {
                        assert!(pair[0].date > pair[1].date);
                    }
                }
                let newest = valid_attendance_dates(category, 2, today)[0].date;
                assert_eq!(most_recent_attendance_date(category, today), newest);
            }
        }
    }

    #[test]
    fn zero_weeks_back_is_empty() {
        assert!(valid_attendance_dates(AttendanceCategory::Sunday, 0, wednesday()).is_empty());
    }

    #[test]
    fn week_token_and_range_for_mid_january() {
        let token = week_token(wednesday());
        assert_eq!(token.to_string(), "2024-W03");
        assert_eq!(week_number(wednesday()), 3);
        let range = week_date_range(&token).expect("range");
        assert_eq!(range.start_date_str, "2024-01-15");
        assert_eq!(range.end_date_str, "2024-01-21");
        assert_eq!(
            format_week_range(&token).expect("label"),
            "Tuần từ 15/01 đến 21/01"
        );
    }

    #[test]
    fn year_boundaries_follow_iso_attribution() {
        // 2021-01-03 (Sun) belongs to 2020-W53; 2024-12-30 (Mon) to 2025-W01.
        assert_eq!(week_token(d(2021, 1, 3)).to_string(), "2020-W53");
        assert_eq!(week_token(d(2024, 12, 30)).to_string(), "2025-W01");
        assert_eq!(week_token(d(2027, 1, 1)).to_string(), "2026-W53");
        assert_eq!(week_token(d(2019, 12, 30)).to_string(), "2020-W01");

        for year in 2015..=2030 {
            let days = (1..=4)
                .map(|day| d(year, 1, day))
                .chain((28..=31).map(|day| d(year, 12, day)));
            for date in days {
                let iso = date.iso_week();
                let token = week_token(date);
                assert_eq!((token.year(), token.week()), (iso.year(), iso.week()), "{}", date);
                assert!(week_date_range(&token).expect("range").contains(date), "{}", date);
            }
        }
    }

    #[test]
    fn every_range_is_monday_to_sunday() {
        let start = d(2019, 6, 1);
        for offset in (0..3000).step_by(3) {
            let date = start + Duration::days(offset);
            let range = week_date_range(&week_token(date)).expect("range");
            assert_eq!(range.end - range.start, Duration::days(6));
            assert_eq!(range.start.weekday(), Weekday::Mon);
            assert_eq!(range.end.weekday(), Weekday::Sun);
            assert!(range.contains(date));
        }
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for raw in [
            "", "2024", "2024-03", "2024W03", "2024-w03", "24-W03", "2024-W3", "2024-W00",
            "2024-W54", "2024-W53", "abcd-W01", "2024-W03 ",
        ] {
            assert_eq!(
                raw.parse::<WeekToken>(),
                Err(CalendarError::InvalidWeekToken(raw.to_string())),
                "{:?}",
                raw
            );
        }
        assert!("2020-W53".parse::<WeekToken>().is_ok());
        assert!("2026-W53".parse::<WeekToken>().is_ok());
    }

    #[test]
    fn default_week_token_is_stable_within_a_day() {
        let first = format_week_range(&default_week_token(wednesday())).expect("label");
        let second = format_week_range(&default_week_token(wednesday())).expect("label");
        assert_eq!(first, second);
        assert_eq!(default_week_token(wednesday()).to_string(), "2024-W02");
    }

    #[test]
    fn parse_date_limits_to_four_digit_years() {
        assert_eq!(parse_date(" 2024-01-17 "), Ok(wednesday()));
        assert!(matches!(parse_date("17/01/2024"), Err(CalendarError::InvalidDate(_))));
        assert!(matches!(parse_date("2024-02-30"), Err(CalendarError::InvalidDate(_))));
    }
}
