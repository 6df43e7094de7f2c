//! Comparison Layer
//!
//! Multi-metric comparisons and each sailing's deviation from the
//! cross-sailing mean. One metric failing never aborts the others.

use serde::Serialize;

use crate::query_engine::{QueryEngine, QueryError, QueryOutcome, QueryResult};
use crate::sailing::{SailingIdentifier, SailingSelection};
use crate::utils::{mean, round2};

/// Outcome for one requested metric
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricComparison {
    #[serde(rename_all = "camelCase")]
    Compared {
        metric: String,
        filter_below: Option<f64>,
        results: Vec<QueryResult>,
    },
    Failed {
        metric: String,
        error: String,
    },
}

impl MetricComparison {
    pub fn metric(&self) -> &str {
        match self {
            MetricComparison::Compared { metric, .. } | MetricComparison::Failed { metric, .. } => metric,
        }
    }
}

/// Attach `comparisonToOverall` to every sailing with a defined average
///
/// The overall mean is taken over `pooled_values`: every non-null value of
/// every sailing that produced statistics. Errored sailings contribute
/// nothing and receive nothing.
pub fn attach_comparison_to_overall(results: &mut [QueryResult], pooled_values: &[f64]) {
    let Some(overall) = mean(pooled_values) else {
        return;
    };

    for result in results.iter_mut() {
        if let QueryOutcome::Stats(stats) = &mut result.outcome {
            if let Some(average) = stats.average_rating {
                stats.comparison_to_overall = Some(round2(average - overall));
            }
        }
    }
}

/// One metric, optionally compared against the overall mean
pub fn metric_rating(
    engine: &QueryEngine,
    sailings: &[SailingIdentifier],
    metric: &str,
    threshold: Option<f64>,
    compare_to_average: bool,
) -> Result<Vec<QueryResult>, QueryError> {
    let mut output = engine.query_metric_detailed(sailings, metric, threshold)?;
    if compare_to_average {
        attach_comparison_to_overall(&mut output.results, &output.pooled_values);
    }
    Ok(output.results)
}

/// Run the query engine once per metric, always comparing to the overall mean
///
/// Returns exactly one entry per requested metric, in request order.
pub fn compare_metrics(
    engine: &QueryEngine,
    selection: &SailingSelection,
    metrics: &[String],
    threshold: Option<f64>,
) -> Vec<MetricComparison> {
    let sailings = engine.resolve_selection(selection);

    metrics
        .iter()
        .map(|metric| match metric_rating(engine, &sailings, metric, threshold, true) {
            Ok(results) => MetricComparison::Compared {
                metric: metric.clone(),
                filter_below: threshold,
                results,
            },
            Err(e) => {
                tracing::debug!("Comparison for '{}' failed: {}", metric, e);
                MetricComparison::Failed {
                    metric: metric.clone(),
                    error: e.to_string(),
                }
            }
        })
        .collect()
}
