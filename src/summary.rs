//! Sailing summary selection and cross-sailing statistics
//!
//! Backs the overview and trend views: pick summaries by sailing list and/or
//! date window, then describe each score across the picked sailings
//! (highest, lowest, mean, and the slope of a least-squares trend line).

use serde::Serialize;

use crate::catalog::MetricCatalog;
use crate::data::DatasetStore;
use crate::sailing::{DateRange, SailingIdentifier, SailingSummary};
use crate::utils::{linear_slope, mean, round2};

/// Pick summaries by explicit sailings, by date window, or both
///
/// Explicit sailings keep request order (unknown ones are skipped, repeats
/// returned once). Without explicit sailings, every summary is a candidate,
/// in load order. A date window further restricts either way.
pub fn select_summaries(
    store: &DatasetStore,
    sailings: Option<&[SailingIdentifier]>,
    dates: Option<&DateRange>,
) -> Vec<SailingSummary> {
    let candidates: Vec<&SailingSummary> = match sailings {
        Some(requested) => {
            let mut seen: Vec<&SailingIdentifier> = Vec::new();
            let mut picked = Vec::new();
            for sailing in requested {
                if seen.contains(&sailing) {
                    continue;
                }
                seen.push(sailing);
                match store.summary(sailing) {
                    Some(summary) => picked.push(summary),
                    None => tracing::debug!("No summary for sailing {}", sailing.key()),
                }
            }
            picked
        }
        None => store.summaries().iter().collect(),
    };

    candidates
        .into_iter()
        .filter(|s| dates.map_or(true, |range| range.contains(s)))
        .cloned()
        .collect()
}

/// One score described across a set of summaries
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummaryStats {
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub highest: f64,
    pub lowest: f64,
    pub average: f64,
    pub sailing_count: usize,
    /// Slope of score against sailing position; `None` below two sailings
    pub trend_slope: Option<f64>,
}

/// Describe every score present in at least one summary, in first-seen order
///
/// Scores that belong to a catalog category carry its name.
pub fn summary_stats(summaries: &[SailingSummary], catalog: &MetricCatalog) -> Vec<MetricSummaryStats> {
    let mut names: Vec<&str> = Vec::new();
    for summary in summaries {
        for (name, _) in &summary.scores {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
    }

    names
        .into_iter()
        .filter_map(|name| {
            let values: Vec<f64> = summaries.iter().filter_map(|s| s.score(name)).collect();
            let average = mean(&values)?;
            let highest = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let lowest = values.iter().copied().fold(f64::INFINITY, f64::min);

            Some(MetricSummaryStats {
                metric: name.to_string(),
                category: catalog.category_of(name).map(str::to_string),
                highest: round2(highest),
                lowest: round2(lowest),
                average: round2(average),
                sailing_count: values.len(),
                trend_slope: linear_slope(&values).map(round2),
            })
        })
        .collect()
}
