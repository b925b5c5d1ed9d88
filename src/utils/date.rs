// Entry-date parsing and date-range filters

use chrono::{Datelike, Local, NaiveDate, TimeZone};

/// Layouts accepted for a lot's entry date, as written by upstream order sheets
const ENTRY_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y"];

/// Parse a lot's raw entry date.
///
/// Returns None for placeholders such as `HOLD` or an empty cell; those lots
/// never match a date filter.
pub fn parse_entry_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    ENTRY_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Date filter on a lot's entry date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    /// Exact calendar year
    Year(i32),
    /// Exact calendar month
    Month { year: i32, month: u32 },
    /// Inclusive range of days
    Range { from: NaiveDate, to: NaiveDate },
}

impl DateFilter {
    /// Parse `yyyy`, `yyyy-mm`, `yyyy-mm-dd..yyyy-mm-dd`, or a single `yyyy-mm-dd`
    pub fn parse(expr: &str) -> Result<Self, String> {
        let expr = expr.trim();

        if let Ok(day) = parse_day(expr) {
            return Ok(DateFilter::Range { from: day, to: day });
        }

        if let Some((from, to)) = expr.split_once("..") {
            let from = parse_day(from)?;
            let to = parse_day(to)?;
            if from > to {
                return Err(format!("Date range starts after it ends: {}..{}", from, to));
            }
            return Ok(DateFilter::Range { from, to });
        }

        if let Some((year, month)) = expr.split_once('-') {
            let year = parse_year(year)?;
            let month: u32 = month
                .parse()
                .map_err(|_| format!("Invalid month in '{}'", expr))?;
            if !(1..=12).contains(&month) {
                return Err(format!("Month must be between 1 and 12, got {}", month));
            }
            return Ok(DateFilter::Month { year, month });
        }

        Ok(DateFilter::Year(parse_year(expr)?))
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        match *self {
            DateFilter::Year(year) => date.year() == year,
            DateFilter::Month { year, month } => date.year() == year && date.month() == month,
            DateFilter::Range { from, to } => from <= date && date <= to,
        }
    }

    /// Match against a raw entry date; placeholders never match
    pub fn matches_raw(&self, raw: &str) -> bool {
        parse_entry_date(raw).is_some_and(|date| self.matches(date))
    }
}

fn parse_year(s: &str) -> Result<i32, String> {
    let s = s.trim();
    if s.len() != 4 {
        return Err(format!("Year must have four digits, got '{}'", s));
    }
    s.parse().map_err(|_| format!("Invalid year '{}'", s))
}

fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}': expected YYYY-MM-DD", s.trim()))
}

/// Format a UTC timestamp in local time for display
pub fn format_timestamp(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => ts.to_string(),
    }
}
