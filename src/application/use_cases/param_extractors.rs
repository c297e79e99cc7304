//! Parameter Extractors
//!
//! Pure text scanners that pull template parameters out of a question.
//! Every extractor is total: when nothing matches it yields a default
//! instead of failing, so the matching pipeline always has a value to bind.

use crate::domain::match_result::ParamMap;
use chrono::{Days, Months, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const START_DATE_PARAM: &str = "start_date";
pub const END_DATE_PARAM: &str = "end_date";
pub const DIMENSIONS_PARAM: &str = "dimensions";
pub const FAMILY_ID_PARAM: &str = "family_id";

/// Window used when the question names no period.
const DEFAULT_LOOKBACK_MONTHS: u32 = 6;
const DEFAULT_FAMILY_ID: i64 = 1;

/// Stoplight dimensions recognised in questions, in reporting order.
pub const DIMENSION_VOCABULARY: [&str; 11] = [
    "health",
    "income",
    "housing",
    "education",
    "transportation",
    "work",
    "services",
    "environment",
    "social",
    "influence",
    "community",
];

static PERIOD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:last|past)\s+(?:(\d+)\s+)?(day|week|month|quarter|year)s?\b").unwrap()
});

static DIMENSION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    DIMENSION_VOCABULARY
        .iter()
        .map(|dim| (*dim, Regex::new(&format!(r"(?i)\b{}\b", dim)).unwrap()))
        .collect()
});

static FAMILY_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfamily\s+(?:id\s*)?#?\s*(\d+)").unwrap());

static FAMILY_CALLED_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bfamily\s+(?:named|called)\s+["']?([a-z]+)"#).unwrap());

static FAMILY_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:the\s+)?([a-z]+)\s+family\b").unwrap());

/// Inclusive calendar date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn start_date(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_date(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }

    /// Writes both bounds into `params`, replacing any existing values.
    pub fn write_into(&self, params: &mut ParamMap) {
        params.insert(START_DATE_PARAM.to_string(), Value::String(self.start_date()));
        params.insert(END_DATE_PARAM.to_string(), Value::String(self.end_date()));
    }

    /// Fills only the bounds `params` is missing (absent, null or empty).
    pub fn fill_missing(&self, params: &mut ParamMap) {
        if is_blank(params.get(START_DATE_PARAM)) {
            params.insert(START_DATE_PARAM.to_string(), Value::String(self.start_date()));
        }
        if is_blank(params.get(END_DATE_PARAM)) {
            params.insert(END_DATE_PARAM.to_string(), Value::String(self.end_date()));
        }
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Date window ending today (UTC) as described by the question.
pub fn extract_date_range(text: &str) -> DateRange {
    extract_date_range_at(text, Utc::now().date_naive())
}

/// `last|past [N] day|week|month|quarter|year` relative to `today`; six months otherwise.
///
/// Oversized counts saturate, and a window reaching back before year 1 starts
/// on 0001-01-01.
pub fn extract_date_range_at(text: &str, today: NaiveDate) -> DateRange {
    let start = match PERIOD_PATTERN.captures(text) {
        Some(caps) => {
            let amount = caps
                .get(1)
                .map_or(1, |m| m.as_str().parse::<u32>().unwrap_or(u32::MAX));
            let unit = caps.get(2).map_or("", |m| m.as_str()).to_lowercase();
            step_back(today, amount, &unit)
        }
        None => today
            .checked_sub_months(Months::new(DEFAULT_LOOKBACK_MONTHS))
            .unwrap_or(today),
    };

    DateRange { start, end: today }
}

fn step_back(today: NaiveDate, amount: u32, unit: &str) -> NaiveDate {
    let days = |per: u64| today.checked_sub_days(Days::new(u64::from(amount) * per));
    let months = |per: u32| today.checked_sub_months(Months::new(amount.saturating_mul(per)));
    match unit {
        "day" => days(1),
        "week" => days(7),
        "month" => months(1),
        "quarter" => months(3),
        "year" => months(12),
        _ => Some(today),
    }
    .filter(|start| *start >= earliest_start())
    .unwrap_or_else(earliest_start)
}

/// First day of year 1, the earliest start date rendered without an era sign.
fn earliest_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Dimension names mentioned as whole words, in vocabulary order; `["all"]` when none are.
pub fn extract_dimensions(text: &str) -> Vec<String> {
    let found: Vec<String> = DIMENSION_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(text))
        .map(|(dim, _)| dim.to_string())
        .collect();

    if found.is_empty() {
        vec!["all".to_string()]
    } else {
        found
    }
}

/// Resolves a family's name to its id.
pub trait FamilyDirectory: Send + Sync {
    fn resolve(&self, name: &str) -> Option<i64>;
}

/// Fixed name table used until a real family lookup is wired in.
#[derive(Debug, Clone)]
pub struct StaticFamilyDirectory {
    entries: Vec<(String, i64)>,
}

impl StaticFamilyDirectory {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, id)| (name.into().to_lowercase(), id))
                .collect(),
        }
    }
}

impl Default for StaticFamilyDirectory {
    fn default() -> Self {
        Self::new([
            ("gonzalez", 1),
            ("garcia", 2),
            ("smith", 3),
            ("johnson", 4),
            ("lopez", 5),
        ])
    }
}

impl FamilyDirectory for StaticFamilyDirectory {
    fn resolve(&self, name: &str) -> Option<i64> {
        let name = name.to_lowercase();
        self.entries
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, id)| *id)
    }
}

/// Explicit `family [id] N` / `family #N` first, then a named family, then 1.
pub fn extract_family_reference(text: &str, directory: &dyn FamilyDirectory) -> i64 {
    if let Some(id) = FAMILY_ID_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
    {
        return id;
    }

    // "family named X" is checked first so "the family named X" does not read as family "the".
    FAMILY_CALLED_PATTERN
        .captures(text)
        .or_else(|| FAMILY_NAME_PATTERN.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|name| directory.resolve(name.as_str()))
        .unwrap_or(DEFAULT_FAMILY_ID)
}
