use crate::error::FormatError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Accounting period with ISO `YYYY-MM-DD` bounds; an open end means "until now"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: String,
    pub end: Option<String>,
}

impl Period {
    pub fn new(start: &str, end: Option<&str>) -> Result<Self, FormatError> {
        let start_date = parse_date(start)?;
        if let Some(end) = end {
            let end_date = parse_date(end)?;
            if end_date < start_date {
                return Err(FormatError::Date(format!("{end} is before {start}")));
            }
        }

        Ok(Self {
            start: start.trim().to_string(),
            end: end.map(|e| e.trim().to_string()),
        })
    }

    /// Expand `YYYY-MM` to the first and last day of that month
    pub fn month(month: &str) -> Result<Self, FormatError> {
        let first = parse_month(month)?;
        let last = next_month(first)
            .pred_opt()
            .ok_or_else(|| FormatError::Month(month.to_string()))?;

        Ok(Self {
            start: first.format(DATE_FORMAT).to_string(),
            end: Some(last.format(DATE_FORMAT).to_string()),
        })
    }

    /// The `YYYY-MM` month the period starts in
    pub fn month_key(&self) -> String {
        self.start.chars().take(7).collect()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end.as_deref().unwrap_or("now"))
    }
}

pub fn parse_date(text: &str) -> Result<NaiveDate, FormatError> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
        .map_err(|_| FormatError::Date(text.to_string()))
}

fn parse_month(text: &str) -> Result<NaiveDate, FormatError> {
    NaiveDate::parse_from_str(&format!("{}-01", text.trim()), DATE_FORMAT)
        .map_err(|_| FormatError::Month(text.to_string()))
}

fn next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
}

/// Every `YYYY-MM` month from `from` to `to`, both included
pub fn months_between(from: &str, to: &str) -> Result<Vec<String>, FormatError> {
    let mut current = parse_month(from)?;
    let last = parse_month(to)?;
    if last < current {
        return Err(FormatError::Month(format!("{to} is before {from}")));
    }

    let mut months = Vec::new();
    while current <= last {
        months.push(current.format("%Y-%m").to_string());
        current = next_month(current);
    }
    Ok(months)
}
