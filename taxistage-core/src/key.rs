//! Dataset identity: which monthly trip-record file a request refers to.
//!
//! A `DatasetKey` is validated once at construction. Everything derived from
//! it (file name, source URL, cache path) is a pure function of the key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// First year the TLC publishes trip records for.
pub const MIN_YEAR: i32 = 2009;

/// File names carry a four-digit year.
pub const MAX_YEAR: i32 = 9999;

/// Errors raised while building a `DatasetKey`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid key: year {0} is outside 2009..=9999")]
    YearOutOfRange(i32),

    #[error("invalid key: month {0} is outside 1..=12")]
    MonthOutOfRange(u32),

    #[error("invalid key: unknown category '{0}' (expected yellow, green, fhv or fhvhv)")]
    UnknownCategory(String),

    #[error("invalid key: {field} '{value}' is not a number")]
    NotANumber { field: &'static str, value: String },

    #[error("invalid key: cannot parse '{0}' as a period (expected YYYY-MM)")]
    BadPeriod(String),
}

/// Trip record type published by the TLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripCategory {
    Yellow,
    Green,
    /// For-hire vehicles.
    Fhv,
    /// High-volume for-hire vehicles.
    Fhvhv,
}

impl TripCategory {
    pub const ALL: [TripCategory; 4] = [
        TripCategory::Yellow,
        TripCategory::Green,
        TripCategory::Fhv,
        TripCategory::Fhvhv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TripCategory::Yellow => "yellow",
            TripCategory::Green => "green",
            TripCategory::Fhv => "fhv",
            TripCategory::Fhvhv => "fhvhv",
        }
    }
}

impl fmt::Display for TripCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripCategory {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yellow" => Ok(TripCategory::Yellow),
            "green" => Ok(TripCategory::Green),
            "fhv" => Ok(TripCategory::Fhv),
            "fhvhv" => Ok(TripCategory::Fhvhv),
            _ => Err(KeyError::UnknownCategory(s.to_string())),
        }
    }
}

/// A calendar month, `YYYY-MM`.
///
/// Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, KeyError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(KeyError::YearOutOfRange(year));
        }
        if !(1..=12).contains(&month) {
            return Err(KeyError::MonthOutOfRange(month));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following month, or `None` past `MAX_YEAR`.
    pub fn succ(&self) -> Option<Self> {
        if self.month == 12 {
            Self::new(self.year + 1, 1).ok()
        } else {
            Some(Self {
                year: self.year,
                month: self.month + 1,
            })
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| KeyError::BadPeriod(s.to_string()))?;
        Self::new(parse_number("year", year)?, parse_number("month", month)?)
    }
}

/// Logical identity of one monthly trip-record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetKey {
    period: Period,
    category: TripCategory,
}

impl DatasetKey {
    /// Build a key, range-checking year and month.
    pub fn new(year: i32, month: u32, category: TripCategory) -> Result<Self, KeyError> {
        Ok(Self {
            period: Period::new(year, month)?,
            category,
        })
    }

    /// Build a key from loosely-typed input such as `("2023", "01", "Yellow")`.
    pub fn parse(year: &str, month: &str, category: &str) -> Result<Self, KeyError> {
        let category = category.parse()?;
        Self::new(
            parse_number("year", year)?,
            parse_number("month", month)?,
            category,
        )
    }

    pub fn from_period(period: Period, category: TripCategory) -> Self {
        Self { period, category }
    }

    pub fn year(&self) -> i32 {
        self.period.year
    }

    pub fn month(&self) -> u32 {
        self.period.month
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn category(&self) -> TripCategory {
        self.category
    }

    /// `{category}_tripdata_{year}-{month:02}.parquet`
    pub fn file_name(&self) -> String {
        format!("{}_tripdata_{}.parquet", self.category, self.period)
    }

    /// Inverse of [`DatasetKey::file_name`]. Returns `None` for anything else.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".parquet")?;
        let (category, period) = stem.split_once("_tripdata_")?;
        // Reject non-canonical spellings like "2023-1" so the round trip is exact.
        if period.len() != 7 {
            return None;
        }
        let category = category.parse().ok()?;
        let key = Self::from_period(period.parse().ok()?, category);
        (key.file_name() == name).then_some(key)
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.period)
    }
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, KeyError> {
    value.trim().parse().map_err(|_| KeyError::NotANumber {
        field,
        value: value.to_string(),
    })
}

/// Expand a chronological span of months across categories into keys.
///
/// Keys are ordered by period first, then by the order of `categories`.
#[derive(Debug, Clone)]
pub struct KeyRange {
    pub start: Period,
    pub end: Period,
    pub categories: Vec<TripCategory>,
}

impl KeyRange {
    pub fn new(start: Period, end: Period, categories: Vec<TripCategory>) -> Self {
        Self {
            start,
            end,
            categories,
        }
    }

    /// Parse `YYYY-MM..YYYY-MM` (inclusive), or a single `YYYY-MM`.
    pub fn parse_span(span: &str, categories: Vec<TripCategory>) -> Result<Self, KeyError> {
        let (start, end) = match span.split_once("..") {
            Some((a, b)) => (a.parse()?, b.parse()?),
            None => {
                let p: Period = span.parse()?;
                (p, p)
            }
        };
        Ok(Self::new(start, end, categories))
    }

    pub fn periods(&self) -> Vec<Period> {
        let mut out = Vec::new();
        let mut cur = Some(self.start);
        while let Some(p) = cur {
            if p > self.end {
                break;
            }
            out.push(p);
            cur = p.succ();
        }
        out
    }

    pub fn keys(&self) -> Vec<DatasetKey> {
        self.periods()
            .into_iter()
            .flat_map(|p| {
                self.categories
                    .iter()
                    .map(move |c| DatasetKey::from_period(p, *c))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_pads_month() {
        let key = DatasetKey::new(2023, 1, TripCategory::Yellow).unwrap();
        assert_eq!(key.file_name(), "yellow_tripdata_2023-01.parquet");

        let key = DatasetKey::new(2019, 12, TripCategory::Fhvhv).unwrap();
        assert_eq!(key.file_name(), "fhvhv_tripdata_2019-12.parquet");
    }

    #[test]
    fn month_thirteen_rejected() {
        assert_eq!(
            DatasetKey::new(2023, 13, TripCategory::Yellow),
            Err(KeyError::MonthOutOfRange(13))
        );
        assert_eq!(
            DatasetKey::new(2023, 0, TripCategory::Yellow),
            Err(KeyError::MonthOutOfRange(0))
        );
    }

    #[test]
    fn year_before_records_rejected() {
        assert_eq!(
            DatasetKey::new(2008, 6, TripCategory::Green),
            Err(KeyError::YearOutOfRange(2008))
        );
    }

    #[test]
    fn parse_normalizes_loose_input() {
        let key = DatasetKey::parse(" 2023", "01", "Yellow").unwrap();
        assert_eq!(key, DatasetKey::new(2023, 1, TripCategory::Yellow).unwrap());
    }

    #[test]
    fn parse_reports_bad_fields() {
        assert!(matches!(
            DatasetKey::parse("twenty", "1", "green"),
            Err(KeyError::NotANumber { field: "year", .. })
        ));
        assert!(matches!(
            DatasetKey::parse("2023", "1", "purple"),
            Err(KeyError::UnknownCategory(_))
        ));
    }

    #[test]
    fn file_name_inverse() {
        let key = DatasetKey::new(2021, 7, TripCategory::Green).unwrap();
        assert_eq!(DatasetKey::from_file_name(&key.file_name()), Some(key));
        assert_eq!(DatasetKey::from_file_name("green_tripdata_2021-7.parquet"), None);
        assert_eq!(DatasetKey::from_file_name("notes.txt"), None);
        assert_eq!(
            DatasetKey::from_file_name("yellow_tripdata_2023-01.parquet.part"),
            None
        );
    }

    #[test]
    fn span_crosses_year_boundary() {
        let range = KeyRange::parse_span(
            "2022-11..2023-02",
            vec![TripCategory::Yellow, TripCategory::Green],
        )
        .unwrap();
        let names: Vec<String> = range.keys().iter().map(|k| k.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "yellow_tripdata_2022-11.parquet",
                "green_tripdata_2022-11.parquet",
                "yellow_tripdata_2022-12.parquet",
                "green_tripdata_2022-12.parquet",
                "yellow_tripdata_2023-01.parquet",
                "green_tripdata_2023-01.parquet",
                "yellow_tripdata_2023-02.parquet",
                "green_tripdata_2023-02.parquet",
            ]
        );
    }

    #[test]
    fn reversed_span_is_empty() {
        let range = KeyRange::parse_span("2023-05..2023-01", vec![TripCategory::Yellow]).unwrap();
        assert!(range.keys().is_empty());
    }

    #[test]
    fn single_period_span() {
        let range = KeyRange::parse_span("2024-03", vec![TripCategory::Fhv]).unwrap();
        assert_eq!(range.keys().len(), 1);
    }
}
