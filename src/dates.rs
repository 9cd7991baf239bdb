//! Free-form review date normalization.
//!
//! Retail sites print review dates as "2 дні тому", "вчора", "06 серпня 2022",
//! "15.03.2021" and so on. [`normalize_date`] turns all of them into a
//! calendar date relative to an injected `today`, so the result is a pure
//! function of its inputs.
//!
//! Rules are tried in order and the first match wins:
//!
//! 1. relative-past marker ("ago", "тому", "назад") → `today` minus the first
//!    integer in the text (1 if there is none)
//! 2. "yesterday" → `today - 1`
//! 3. "today" → `today`
//! 4. Ukrainian genitive month name → `day <month> year`, read positionally
//! 5. general day-first parse
//! 6. anything else → `today`

use chrono::{DateTime, Datelike, Duration, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;

const RELATIVE_PAST_MARKERS: &[&str] = &["ago", "тому", "назад"];
const YESTERDAY_MARKERS: &[&str] = &["yesterday", "вчора", "вчера"];
const TODAY_MARKERS: &[&str] = &["today", "сьогодні", "сегодня"];

const UKRAINIAN_MONTHS: [(&str, u32); 12] = [
    ("січня", 1),
    ("лютого", 2),
    ("березня", 3),
    ("квітня", 4),
    ("травня", 5),
    ("червня", 6),
    ("липня", 7),
    ("серпня", 8),
    ("вересня", 9),
    ("жовтня", 10),
    ("листопада", 11),
    ("грудня", 12),
];

/// Day-first formats, most specific first.
///
/// `%Y` also accepts one or two digits, so the two-digit `%y` forms come
/// first and parses landing before year 1000 are rejected.
const DAY_FIRST_FORMATS: &[&str] = &[
    "%d.%m.%y",
    "%d/%m/%y",
    "%d-%m-%y",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d %B %Y",
    "%d %b %Y",
    "%d %B, %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
];

static FIRST_INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Normalize a site-formatted date string to a calendar date.
///
/// Never fails: unparseable input yields `today`.
pub fn normalize_date(raw: &str, today: NaiveDate) -> NaiveDate {
    let text = raw.trim().to_lowercase();

    if contains_any(&text, RELATIVE_PAST_MARKERS) {
        let days = FIRST_INTEGER
            .find(&text)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(1);
        return Duration::try_days(days)
            .and_then(|d| today.checked_sub_signed(d))
            .unwrap_or(today);
    }

    if contains_any(&text, YESTERDAY_MARKERS) {
        return today.pred_opt().unwrap_or(today);
    }

    if contains_any(&text, TODAY_MARKERS) {
        return today;
    }

    if let Some(date) = parse_ukrainian_month(&text) {
        return date;
    }

    parse_day_first(&text).unwrap_or(today)
}

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text.contains(m))
}

/// `"06 серпня 2022"` → 2022-08-06. Day is the first token, year the third.
fn parse_ukrainian_month(text: &str) -> Option<NaiveDate> {
    let (_, month) = UKRAINIAN_MONTHS
        .iter()
        .find(|(name, _)| text.contains(name))?;

    let parts: Vec<&str> = text.split_whitespace().collect();
    let day = parts.first()?.trim_matches(|c: char| !c.is_ascii_digit());
    let year = parts.get(2)?.trim_matches(|c: char| !c.is_ascii_digit());

    NaiveDate::from_ymd_opt(year.parse().ok()?, *month, day.parse().ok()?)
}

fn parse_day_first(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }

    for format in DAY_FIRST_FORMATS {
        match NaiveDate::parse_from_str(text, format) {
            Ok(date) if date.year() >= 1000 => return Some(date),
            _ => {}
        }
    }

    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_ago() {
        assert_eq!(normalize_date("2 days ago", today()), ymd(2024, 3, 8));
        assert_eq!(normalize_date("2 дні тому", today()), ymd(2024, 3, 8));
        assert_eq!(normalize_date("5 дней назад", today()), ymd(2024, 3, 5));
    }

    #[test]
    fn test_ago_without_number_defaults_to_one_day() {
        assert_eq!(normalize_date("день тому", today()), ymd(2024, 3, 9));
    }

    #[test]
    fn test_ago_crosses_month_boundary() {
        assert_eq!(normalize_date("12 днів тому", today()), ymd(2024, 2, 27));
    }

    #[test]
    fn test_yesterday_and_today() {
        assert_eq!(normalize_date("Вчора", today()), ymd(2024, 3, 9));
        assert_eq!(normalize_date("yesterday", today()), ymd(2024, 3, 9));
        assert_eq!(normalize_date("today", today()), today());
        assert_eq!(normalize_date("Сьогодні, 14:05", today()), today());
    }

    #[test]
    fn test_ukrainian_month_name() {
        assert_eq!(normalize_date("06 серпня 2022", today()), ymd(2022, 8, 6));
        assert_eq!(normalize_date(" 1 січня 2023 ", today()), ymd(2023, 1, 1));
    }

    #[test]
    fn test_ukrainian_month_invalid_day_falls_back() {
        assert_eq!(normalize_date("31 лютого 2023", today()), today());
    }

    #[test]
    fn test_numeric_dates_are_day_first() {
        assert_eq!(normalize_date("15.03.2021", today()), ymd(2021, 3, 15));
        assert_eq!(normalize_date("03/04/2021", today()), ymd(2021, 4, 3));
        assert_eq!(normalize_date("2021-12-25", today()), ymd(2021, 12, 25));
    }

    #[test]
    fn test_two_digit_years() {
        assert_eq!(normalize_date("15.03.21", today()), ymd(2021, 3, 15));
        assert_eq!(normalize_date("15/03/21", today()), ymd(2021, 3, 15));
        assert_eq!(normalize_date("15-03-21", today()), ymd(2021, 3, 15));
    }

    #[test]
    fn test_short_year_never_lands_in_first_millennium() {
        assert_eq!(normalize_date("5 March 20", today()), today());
    }

    #[test]
    fn test_english_month_names() {
        assert_eq!(normalize_date("5 March 2020", today()), ymd(2020, 3, 5));
        assert_eq!(normalize_date("March 5, 2020", today()), ymd(2020, 3, 5));
    }

    #[test]
    fn test_unparseable_falls_back_to_today() {
        assert_eq!(normalize_date("колись давно", today()), today());
        assert_eq!(normalize_date("", today()), today());
    }

    #[test]
    fn test_deterministic_for_fixed_today() {
        let a = normalize_date("3 days ago", today());
        let b = normalize_date("3 days ago", today());
        assert_eq!(a, b);
    }
}
