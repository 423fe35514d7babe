use crate::constants::END_DATE_SENTINELS;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Outcome of normalizing one free-text date field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "date", rename_all = "snake_case")]
pub enum NormalizedDate {
    Date(NaiveDate),
    /// The field was intentionally blank (dash, empty, "N/A")
    Sentinel,
    /// Text was present but matched no known format
    Unparsed,
}

impl NormalizedDate {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            NormalizedDate::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, NormalizedDate::Sentinel)
    }
}

static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})(?:st|nd|rd|th)?\s+([A-Za-z]{3,})\.?,?\s+(\d{4})\b")
        .expect("day-month-year pattern")
});
static MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z]{3,})\.?,?\s+(\d{4})\b").expect("month-year pattern"));
static NUMERIC_DMY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("numeric date pattern")
});

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Resolves "Mar", "March", "Sept" etc. to a month number
pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim_end_matches('.').to_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|month| month.starts_with(&lower))
        .map(|idx| idx as u32 + 1)
}

type FormatParser = fn(&str) -> Option<NaiveDate>;

/// Formats attempted in order; the first that yields a valid date wins.
const FORMATS: &[(&str, FormatParser)] = &[
    ("d_month_yyyy", parse_day_month_year),
    ("month_yyyy", parse_month_year),
    ("dd_mm_yyyy", parse_numeric),
];

fn parse_day_month_year(text: &str) -> Option<NaiveDate> {
    DAY_MONTH_YEAR.captures_iter(text).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_from_name(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

fn parse_month_year(text: &str) -> Option<NaiveDate> {
    MONTH_YEAR.captures_iter(text).find_map(|caps| {
        let month = month_from_name(&caps[1])?;
        let year: i32 = caps[2].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, 1)
    })
}

fn parse_numeric(text: &str) -> Option<NaiveDate> {
    NUMERIC_DMY.captures_iter(text).find_map(|caps| {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Parses registry date cells into a date, a sentinel, or an explicit
/// parse failure.
#[derive(Debug, Clone)]
pub struct DateNormalizer {
    sentinels: Vec<String>,
}

impl Default for DateNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DateNormalizer {
    pub fn new() -> Self {
        Self::with_sentinels(END_DATE_SENTINELS.iter().copied())
    }

    pub fn with_sentinels<'a>(sentinels: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            sentinels: sentinels.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    pub fn is_sentinel(&self, raw: &str) -> bool {
        let folded = collapse_whitespace(raw).to_lowercase();
        self.sentinels.iter().any(|s| *s == folded)
    }

    pub fn normalize(&self, raw: &str) -> NormalizedDate {
        if self.is_sentinel(raw) {
            return NormalizedDate::Sentinel;
        }
        let text = collapse_whitespace(raw);
        for (_name, parse) in FORMATS {
            if let Some(date) = parse(&text) {
                return NormalizedDate::Date(date);
            }
        }
        NormalizedDate::Unparsed
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_sentinels() {
        let normalizer = DateNormalizer::new();
        for raw in ["", "-", "–", "—", "N/A", "n/a", "  -  ", "- -", "--"] {
            assert_eq!(normalizer.normalize(raw), NormalizedDate::Sentinel, "{:?}", raw);
        }
    }

    #[test]
    fn test_day_month_year() {
        let normalizer = DateNormalizer::new();
        assert_eq!(normalizer.normalize("1 March 2025"), NormalizedDate::Date(ymd(2025, 3, 1)));
        assert_eq!(normalizer.normalize("01 Mar 2025"), NormalizedDate::Date(ymd(2025, 3, 1)));
        assert_eq!(normalizer.normalize("3rd Sept 2024"), NormalizedDate::Date(ymd(2024, 9, 3)));
    }

    #[test]
    fn test_month_year() {
        let normalizer = DateNormalizer::new();
        assert_eq!(normalizer.normalize("Mar 2025"), NormalizedDate::Date(ymd(2025, 3, 1)));
        assert_eq!(normalizer.normalize("December 2019"), NormalizedDate::Date(ymd(2019, 12, 1)));
    }

    #[test]
    fn test_numeric() {
        let normalizer = DateNormalizer::new();
        assert_eq!(normalizer.normalize("15/03/2025"), NormalizedDate::Date(ymd(2025, 3, 15)));
        assert_eq!(normalizer.normalize("5/1/2024"), NormalizedDate::Date(ymd(2024, 1, 5)));
    }

    #[test]
    fn test_first_format_wins() {
        let normalizer = DateNormalizer::new();
        // The day is kept even though "March 2025" alone would also match
        assert_eq!(normalizer.normalize("20 March 2025"), NormalizedDate::Date(ymd(2025, 3, 20)));
    }

    #[test]
    fn test_unparsed_is_distinct_from_sentinel() {
        let normalizer = DateNormalizer::new();
        assert_eq!(normalizer.normalize("Ongoing"), NormalizedDate::Unparsed);
        assert_eq!(normalizer.normalize("31/02/2025"), NormalizedDate::Unparsed);
        assert_eq!(normalizer.normalize("Smarch 2025"), NormalizedDate::Unparsed);
    }

    #[test]
    fn test_month_from_name() {
        assert_eq!(month_from_name("Jan"), Some(1));
        assert_eq!(month_from_name("sept"), Some(9));
        assert_eq!(month_from_name("Dec."), Some(12));
        assert_eq!(month_from_name("Ma"), None);
        assert_eq!(month_from_name("Foo"), None);
    }
}
