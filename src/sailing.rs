//! Sailing data model
//!
//! Identifiers, per-response rows, and per-sailing summary aggregates.
//! Everything here is immutable once the dataset store is loaded.

use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::query_engine::QueryError;
use crate::utils::{normalize_key, sailing_key};

// ============================================================================
// Identifiers
// ============================================================================

/// One voyage of one ship: `(ship name, sailing number)`
///
/// Equality and hashing use the normalized (trimmed, lowercased) form, while
/// the display form is kept for responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SailingIdentifier {
    ship_name: String,
    #[serde(deserialize_with = "string_or_number")]
    sailing_number: String,
}

impl SailingIdentifier {
    pub fn new(ship_name: impl Into<String>, sailing_number: impl Into<String>) -> Self {
        Self {
            ship_name: ship_name.into(),
            sailing_number: sailing_number.into(),
        }
    }

    pub fn ship_name(&self) -> &str {
        &self.ship_name
    }

    pub fn sailing_number(&self) -> &str {
        &self.sailing_number
    }

    /// Normalized store key (`"explorer_1"`)
    pub fn key(&self) -> String {
        sailing_key(&self.ship_name, &self.sailing_number)
    }
}

impl PartialEq for SailingIdentifier {
    fn eq(&self, other: &Self) -> bool {
        normalize_key(&self.ship_name) == normalize_key(&other.ship_name)
            && normalize_key(&self.sailing_number) == normalize_key(&other.sailing_number)
    }
}

impl Eq for SailingIdentifier {}

impl Hash for SailingIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Sailing numbers are strings ("CR352"), but clients also send bare numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
    }

    match Raw::deserialize(deserializer) {
        Ok(Raw::Text(s)) => Ok(s),
        Ok(Raw::Int(n)) => Ok(n.to_string()),
        Err(_) => Err(de::Error::custom("sailingNumber must be a string or integer")),
    }
}

// ============================================================================
// Guest-response rows
// ============================================================================

/// Which text field accompanies a value in filtered listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    /// Free-text review column (plain layout)
    Review,
    /// Reason column from the paired reasons file (paired layout)
    Reason,
}

/// A single guest response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SailingRecord {
    /// Scores aligned with `SailingRecords::metric_columns`; `None` when the
    /// cell was empty or not numeric
    pub scores: Vec<Option<f64>>,
    pub review: Option<String>,
    pub reason: Option<String>,
}

/// All guest responses of one sailing
#[derive(Debug, Clone)]
pub struct SailingRecords {
    pub identifier: SailingIdentifier,
    /// Numeric columns present in the source file, in file order
    pub metric_columns: Vec<String>,
    pub rows: Vec<SailingRecord>,
    pub text_source: TextSource,
}

impl SailingRecords {
    /// Position of a metric column, `None` when the file has no such column
    pub fn column_index(&self, metric: &str) -> Option<usize> {
        self.metric_columns.iter().position(|c| c == metric)
    }

    /// `(value, paired text)` for every row, in row order
    pub fn metric_rows(&self, column: usize) -> impl Iterator<Item = (Option<f64>, Option<&str>)> + '_ {
        self.rows.iter().map(move |row| {
            let value = row.scores.get(column).copied().flatten();
            let text = match self.text_source {
                TextSource::Review => row.review.as_deref(),
                TextSource::Reason => row.reason.as_deref(),
            };
            (value, text)
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// Summaries
// ============================================================================

/// Pre-computed per-sailing averages, one per metric category
#[derive(Debug, Clone, PartialEq)]
pub struct SailingSummary {
    pub ship_name: String,
    pub sailing_number: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub fleet: Option<String>,
    /// `(score name, average)` in source column order
    pub scores: Vec<(String, Option<f64>)>,
}

impl SailingSummary {
    pub fn identifier(&self) -> SailingIdentifier {
        SailingIdentifier::new(self.ship_name.clone(), self.sailing_number.clone())
    }

    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| *v)
    }
}

// Wire form keeps the dashboard's column titles as keys
impl Serialize for SailingSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("Sailing Number", &self.sailing_number)?;
        map.serialize_entry("Ship Name", &self.ship_name)?;
        if let Some(start) = &self.start_date {
            map.serialize_entry("Start Date", start)?;
        }
        if let Some(end) = &self.end_date {
            map.serialize_entry("End Date", end)?;
        }
        if let Some(fleet) = &self.fleet {
            map.serialize_entry("Fleet", fleet)?;
        }
        for (name, value) in &self.scores {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

// ============================================================================
// Selections
// ============================================================================

/// Inclusive date window over sailing start/end dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self, QueryError> {
        match (from, to) {
            (None, None) => Err(QueryError::InvalidDateRange(
                "at least one of fromDate/toDate is required".to_string(),
            )),
            (Some(f), Some(t)) if f > t => Err(QueryError::InvalidDateRange(format!(
                "fromDate {} is after toDate {}",
                f, t
            ))),
            _ => Ok(Self { from, to }),
        }
    }

    pub fn from_date(&self) -> Option<NaiveDate> {
        self.from
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        self.to
    }

    /// A summary matches only when it carries both dates and lies inside the window
    pub fn contains(&self, summary: &SailingSummary) -> bool {
        let (Some(start), Some(end)) = (summary.start_date, summary.end_date) else {
            return false;
        };
        self.from.map_or(true, |f| start >= f) && self.to.map_or(true, |t| end <= t)
    }
}

/// How a request picks its sailings
#[derive(Debug, Clone, PartialEq)]
pub enum SailingSelection {
    Sailings(Vec<SailingIdentifier>),
    Dates(DateRange),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn summary(start: Option<&str>, end: Option<&str>) -> SailingSummary {
        SailingSummary {
            ship_name: "Voyager".to_string(),
            sailing_number: "CR352".to_string(),
            start_date: start.map(date),
            end_date: end.map(date),
            fleet: None,
            scores: vec![("Cabins".to_string(), Some(6.3))],
        }
    }

    #[test]
    fn test_identifier_equality_is_normalized() {
        let a = SailingIdentifier::new("EXPLORER", "1");
        let b = SailingIdentifier::new(" explorer ", "1 ");
        assert_eq!(a, b);
        assert_eq!(a.key(), "explorer_1");
        assert_eq!(a.ship_name(), "EXPLORER");
        assert_ne!(a, SailingIdentifier::new("Explorer 2", "1"));
    }

    #[test]
    fn test_identifier_deserialize_requires_both_fields() {
        let ok: SailingIdentifier =
            serde_json::from_str(r#"{"shipName": "Voyager", "sailingNumber": 12}"#).unwrap();
        assert_eq!(ok.sailing_number(), "12");

        let missing = serde_json::from_str::<SailingIdentifier>(r#"{"shipName": "Voyager"}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn test_date_range_validation() {
        assert!(DateRange::new(None, None).is_err());
        assert!(DateRange::new(Some(date("2024-05-02")), Some(date("2024-05-01"))).is_err());
        assert!(DateRange::new(Some(date("2024-05-01")), None).is_ok());
    }

    #[test]
    fn test_date_range_contains() {
        let range = DateRange::new(Some(date("2024-03-01")), Some(date("2024-03-31"))).unwrap();
        assert!(range.contains(&summary(Some("2024-03-01"), Some("2024-03-08"))));
        assert!(!range.contains(&summary(Some("2024-03-28"), Some("2024-04-04"))));
        assert!(!range.contains(&summary(None, Some("2024-03-08"))));
    }

    #[test]
    fn test_summary_serializes_with_column_titles() {
        let json = serde_json::to_value(summary(Some("2024-03-01"), None)).unwrap();
        assert_eq!(json["Ship Name"], "Voyager");
        assert_eq!(json["Sailing Number"], "CR352");
        assert_eq!(json["Start Date"], "2024-03-01");
        assert!(json.get("End Date").is_none());
        assert_eq!(json["Cabins"], 6.3);
    }

    #[test]
    fn test_metric_rows_pairs_text_source() {
        let records = SailingRecords {
            identifier: SailingIdentifier::new("Explorer", "1"),
            metric_columns: vec!["Cabins".to_string()],
            rows: vec![SailingRecord {
                scores: vec![Some(4.0)],
                review: Some("review".to_string()),
                reason: Some("reason".to_string()),
            }],
            text_source: TextSource::Reason,
        };
        let rows: Vec<_> = records.metric_rows(0).collect();
        assert_eq!(rows, vec![(Some(4.0), Some("reason"))]);
    }
}
