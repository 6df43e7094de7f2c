//! Metric Query Engine
//!
//! Purpose: per-sailing statistics for one metric, plus the list of guest
//! responses rated below a threshold (complaint triage).
//!
//! Every sailing in a request is processed independently: a sailing with no
//! data, or without the requested column, yields an entry carrying `error`
//! while its siblings still get full statistics. Only request-level problems
//! (unknown metric, unusable threshold) fail the whole call.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::MetricCatalog;
use crate::data::DatasetStore;
use crate::sailing::{SailingIdentifier, SailingSelection};
use crate::utils::{mean, round2};

pub const ERROR_DATA_NOT_FOUND: &str = "Data not found";
pub const ERROR_INVALID_METRIC: &str = "Invalid metric";

/// Request-level validation failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("Invalid metric '{metric}'. Must be one of: {}", valid.join(", "))]
    InvalidMetric { metric: String, valid: Vec<String> },

    #[error("Threshold must be a finite number, got {0}")]
    InvalidThreshold(f64),

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),
}

// ============================================================================
// Results
// ============================================================================

/// Statistics for one sailing and one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricStats {
    pub metric: String,
    /// Mean of the non-null values, 2 decimals; `None` when there are none
    pub average_rating: Option<f64>,
    pub rating_count: usize,
    pub filtered_reviews: Vec<String>,
    pub filtered_metric: Vec<f64>,
    pub filtered_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_to_overall: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
    Stats(MetricStats),
    Failed { error: String },
}

/// One entry per requested sailing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub ship: String,
    pub sailing_number: String,
    #[serde(flatten)]
    pub outcome: QueryOutcome,
}

impl QueryResult {
    fn failed(sailing: &SailingIdentifier, error: &str) -> Self {
        QueryResult {
            ship: sailing.ship_name().to_string(),
            sailing_number: sailing.sailing_number().to_string(),
            outcome: QueryOutcome::Failed {
                error: error.to_string(),
            },
        }
    }

    pub fn stats(&self) -> Option<&MetricStats> {
        match &self.outcome {
            QueryOutcome::Stats(stats) => Some(stats),
            QueryOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            QueryOutcome::Stats(_) => None,
            QueryOutcome::Failed { error } => Some(error),
        }
    }
}

/// Results plus every non-null value seen, pooled across successful sailings
///
/// The pooled values feed the cross-sailing comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQueryOutput {
    pub results: Vec<QueryResult>,
    pub pooled_values: Vec<f64>,
}

// ============================================================================
// Engine
// ============================================================================

/// Read-only query context: the loaded store and the metric catalog
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<DatasetStore>,
    catalog: Arc<MetricCatalog>,
}

impl QueryEngine {
    pub fn new(store: Arc<DatasetStore>, catalog: Arc<MetricCatalog>) -> Self {
        Self { store, catalog }
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    /// Reject metric names outside the catalog
    pub fn validate_metric(&self, metric: &str) -> Result<(), QueryError> {
        if self.catalog.contains(metric) {
            Ok(())
        } else {
            Err(QueryError::InvalidMetric {
                metric: metric.to_string(),
                valid: self.catalog.metrics().to_vec(),
            })
        }
    }

    /// Turn a selection into concrete sailing identifiers
    ///
    /// A date range picks the sailings whose summary dates fall inside it,
    /// in summary order.
    pub fn resolve_selection(&self, selection: &SailingSelection) -> Vec<SailingIdentifier> {
        match selection {
            SailingSelection::Sailings(sailings) => sailings.clone(),
            SailingSelection::Dates(range) => self
                .store
                .summaries()
                .iter()
                .filter(|s| range.contains(s))
                .map(|s| s.identifier())
                .collect(),
        }
    }

    /// Statistics for `metric` on each sailing, in request order
    pub fn query_metric(
        &self,
        sailings: &[SailingIdentifier],
        metric: &str,
        threshold: Option<f64>,
    ) -> Result<Vec<QueryResult>, QueryError> {
        self.query_metric_detailed(sailings, metric, threshold)
            .map(|output| output.results)
    }

    /// Same as [`QueryEngine::query_metric`], also returning the pooled values
    pub fn query_metric_detailed(
        &self,
        sailings: &[SailingIdentifier],
        metric: &str,
        threshold: Option<f64>,
    ) -> Result<MetricQueryOutput, QueryError> {
        self.validate_metric(metric)?;
        if let Some(t) = threshold {
            if !t.is_finite() {
                return Err(QueryError::InvalidThreshold(t));
            }
        }

        let mut results = Vec::with_capacity(sailings.len());
        let mut pooled_values = Vec::new();

        for sailing in sailings {
            let Some(table) = self.store.resolve(sailing) else {
                tracing::debug!("No data for sailing {}", sailing.key());
                results.push(QueryResult::failed(sailing, ERROR_DATA_NOT_FOUND));
                continue;
            };
            let Some(column) = table.column_index(metric) else {
                tracing::debug!("Sailing {} has no '{}' column", sailing.key(), metric);
                results.push(QueryResult::failed(sailing, ERROR_INVALID_METRIC));
                continue;
            };

            let mut values = Vec::new();
            let mut filtered_reviews = Vec::new();
            let mut filtered_metric = Vec::new();

            for (value, text) in table.metric_rows(column) {
                let Some(value) = value else { continue };
                values.push(value);

                if threshold.map_or(false, |t| value < t) {
                    filtered_reviews.push(text.unwrap_or_default().to_string());
                    filtered_metric.push(value);
                }
            }

            let filtered_count = filtered_reviews.len();
            let stats = MetricStats {
                metric: metric.to_string(),
                average_rating: mean(&values).map(round2),
                rating_count: values.len(),
                filtered_reviews,
                filtered_metric,
                filtered_count,
                comparison_to_overall: None,
            };
            pooled_values.extend_from_slice(&values);

            results.push(QueryResult {
                ship: sailing.ship_name().to_string(),
                sailing_number: sailing.sailing_number().to_string(),
                outcome: QueryOutcome::Stats(stats),
            });
        }

        Ok(MetricQueryOutput {
            results,
            pooled_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sailing::{DateRange, SailingRecord, SailingRecords, SailingSummary, TextSource};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    const METRIC: &str = "cabin cleanliness";

    fn row(value: Option<f64>, review: &str) -> SailingRecord {
        SailingRecord {
            scores: vec![value],
            review: Some(review.to_string()),
            reason: None,
        }
    }

    fn table(ship: &str, rows: Vec<SailingRecord>) -> SailingRecords {
        SailingRecords {
            identifier: SailingIdentifier::new(ship, "1"),
            metric_columns: vec![METRIC.to_string()],
            rows,
            text_source: TextSource::Review,
        }
    }

    fn engine(tables: Vec<SailingRecords>, summaries: Vec<SailingSummary>) -> QueryEngine {
        QueryEngine::new(
            Arc::new(DatasetStore::new(tables, summaries)),
            Arc::new(MetricCatalog::default()),
        )
    }

    fn explorer() -> SailingRecords {
        table(
            "Explorer",
            vec![
                row(Some(7.0), "Great"),
                row(Some(3.0), "Poor"),
                row(None, "N/A"),
            ],
        )
    }

    #[test]
    fn test_explorer_scenario() {
        let engine = engine(vec![explorer()], vec![]);
        let results = engine
            .query_metric(&[SailingIdentifier::new("Explorer", "1")], METRIC, Some(5.0))
            .unwrap();

        assert_eq!(results.len(), 1);
        let stats = results[0].stats().unwrap();
        assert_relative_eq!(stats.average_rating.unwrap(), 5.0);
        assert_eq!(stats.rating_count, 2);
        assert_eq!(stats.filtered_metric, vec![3.0]);
        assert_eq!(stats.filtered_reviews, vec!["Poor".to_string()]);
        assert_eq!(stats.filtered_count, 1);
        assert_eq!(stats.comparison_to_overall, None);
    }

    #[test]
    fn test_invalid_metric_lists_catalog() {
        let engine = engine(vec![explorer()], vec![]);
        let err = engine
            .query_metric(&[SailingIdentifier::new("Explorer", "1")], "Review", None)
            .unwrap_err();

        match err {
            QueryError::InvalidMetric { metric, valid } => {
                assert_eq!(metric, "Review");
                assert_eq!(valid, MetricCatalog::default().metrics().to_vec());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_partial_failure_is_isolated() {
        let engine = engine(vec![explorer()], vec![]);
        let results = engine
            .query_metric(
                &[
                    SailingIdentifier::new("explorer", "1"),
                    SailingIdentifier::new("Atlantis", "1"),
                ],
                METRIC,
                None,
            )
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].stats().is_some());
        assert_eq!(results[1].error(), Some(ERROR_DATA_NOT_FOUND));

        let json = serde_json::to_value(&results[1]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ship": "Atlantis", "sailingNumber": "1", "error": "Data not found"})
        );
    }

    #[test]
    fn test_missing_column_reports_invalid_metric() {
        let engine = engine(vec![explorer()], vec![]);
        let results = engine
            .query_metric(&[SailingIdentifier::new("Explorer", "1")], "Entertainment", Some(5.0))
            .unwrap();
        assert_eq!(results[0].error(), Some(ERROR_INVALID_METRIC));
    }

    #[test]
    fn test_no_threshold_means_no_filtered_rows() {
        let engine = engine(vec![explorer()], vec![]);
        let results = engine
            .query_metric(&[SailingIdentifier::new("Explorer", "1")], METRIC, None)
            .unwrap();
        let stats = results[0].stats().unwrap();
        assert!(stats.filtered_reviews.is_empty());
        assert!(stats.filtered_metric.is_empty());
        assert_eq!(stats.filtered_count, 0);
    }

    #[test]
    fn test_filter_is_strict_and_keeps_row_order() {
        let rows = vec![
            row(Some(4.0), "a"),
            row(Some(9.0), "b"),
            row(Some(5.0), "c"),
            row(Some(1.0), "d"),
            row(Some(4.5), "e"),
        ];
        let engine = engine(vec![table("Voyager", rows)], vec![]);
        let results = engine
            .query_metric(&[SailingIdentifier::new("Voyager", "1")], METRIC, Some(5.0))
            .unwrap();
        let stats = results[0].stats().unwrap();

        assert_eq!(stats.filtered_metric, vec![4.0, 1.0, 4.5]);
        assert_eq!(stats.filtered_reviews, vec!["a", "d", "e"]);
        assert_eq!(stats.filtered_count, stats.filtered_metric.len());
        assert_eq!(stats.filtered_count, stats.filtered_reviews.len());
    }

    #[test]
    fn test_all_null_average_is_none() {
        let engine = engine(vec![table("Voyager", vec![row(None, "x"), row(None, "y")])], vec![]);
        let results = engine
            .query_metric(&[SailingIdentifier::new("Voyager", "1")], METRIC, Some(5.0))
            .unwrap();
        let stats = results[0].stats().unwrap();
        assert_eq!(stats.average_rating, None);
        assert_eq!(stats.rating_count, 0);

        let json = serde_json::to_value(&results[0]).unwrap();
        assert!(json["averageRating"].is_null());
    }

    #[test]
    fn test_average_is_rounded() {
        let rows = vec![row(Some(7.0), "a"), row(Some(8.0), "b"), row(Some(8.0), "c")];
        let engine = engine(vec![table("Voyager", rows)], vec![]);
        let results = engine
            .query_metric(&[SailingIdentifier::new("Voyager", "1")], METRIC, None)
            .unwrap();
        assert_relative_eq!(results[0].stats().unwrap().average_rating.unwrap(), 7.67);
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let engine = engine(vec![explorer()], vec![]);
        let err = engine
            .query_metric(&[SailingIdentifier::new("Explorer", "1")], METRIC, Some(f64::NAN))
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidThreshold(_)));
    }

    #[test]
    fn test_query_is_idempotent() {
        let engine = engine(vec![explorer()], vec![]);
        let sailings = [SailingIdentifier::new("Explorer", "1"), SailingIdentifier::new("Nope", "2")];
        let first = engine.query_metric(&sailings, METRIC, Some(5.0)).unwrap();
        let second = engine.query_metric(&sailings, METRIC, Some(5.0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_date_selection() {
        let summary = |ship: &str, start: (i32, u32, u32), end: (i32, u32, u32)| SailingSummary {
            ship_name: ship.to_string(),
            sailing_number: "1".to_string(),
            start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2),
            fleet: None,
            scores: vec![],
        };
        let engine = engine(
            vec![],
            vec![
                summary("Explorer", (2024, 3, 1), (2024, 3, 8)),
                summary("Voyager", (2024, 5, 1), (2024, 5, 8)),
            ],
        );

        let range = DateRange::new(NaiveDate::from_ymd_opt(2024, 2, 1), NaiveDate::from_ymd_opt(2024, 3, 31))
            .unwrap();
        let resolved = engine.resolve_selection(&SailingSelection::Dates(range));
        assert_eq!(resolved, vec![SailingIdentifier::new("Explorer", "1")]);
    }
}
