//! Metric Catalog
//!
//! The ordered list of metric names a query may ask for, plus the category
//! groupings the dashboard uses for its tabs. Membership in this catalog is
//! the only thing standing between a request and an arbitrary column lookup.

use serde::{Deserialize, Serialize};

use crate::utils::normalize_key;

/// A named group of metrics (one dashboard tab)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCategory {
    pub name: String,
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricCatalog {
    metrics: Vec<String>,
    categories: Vec<MetricCategory>,
}

impl MetricCatalog {
    /// Build a catalog, dropping category members that are not catalog metrics
    pub fn new(metrics: Vec<String>, categories: Vec<MetricCategory>) -> Self {
        let mut deduped: Vec<String> = Vec::with_capacity(metrics.len());
        for metric in metrics {
            if !deduped.contains(&metric) {
                deduped.push(metric);
            }
        }

        let categories = categories
            .into_iter()
            .map(|category| {
                let (known, unknown): (Vec<String>, Vec<String>) = category
                    .metrics
                    .into_iter()
                    .partition(|m| deduped.contains(m));
                for metric in &unknown {
                    tracing::warn!(
                        "Category '{}' lists '{}', which is not in the metric catalog; ignoring",
                        category.name,
                        metric
                    );
                }
                MetricCategory {
                    name: category.name,
                    metrics: known,
                }
            })
            .collect();

        Self {
            metrics: deduped,
            categories,
        }
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.metrics.iter().any(|m| m == metric)
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn categories(&self) -> &[MetricCategory] {
        &self.categories
    }

    /// First category listing `metric`, ignoring case
    ///
    /// Summary exports title-case their columns ("Bar Service") while the
    /// survey columns are not ("bar service"). Query gating stays exact.
    pub fn category_of(&self, metric: &str) -> Option<&str> {
        let key = normalize_key(metric);
        self.categories
            .iter()
            .find(|c| c.metrics.iter().any(|m| normalize_key(m) == key))
            .map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl Default for MetricCatalog {
    /// Numeric guest-response columns of the survey export
    fn default() -> Self {
        let metrics = [
            "Ship overall",
            "Ship rooms",
            "F&B quality overall",
            "F&B service overall",
            "F&B quality main dining",
            "Entertainment",
            "Excursions",
            "drinks offerings",
            "bar service",
            "cabin cleanliness",
            "crew friendliness",
            "Sentiment analysis",
        ];

        let category = |name: &str, members: &[&str]| MetricCategory {
            name: name.to_string(),
            metrics: members.iter().map(|m| m.to_string()).collect(),
        };

        Self::new(
            metrics.iter().map(|m| m.to_string()).collect(),
            vec![
                category("Ship", &["Ship overall", "Ship rooms", "cabin cleanliness"]),
                category(
                    "Food & Beverage",
                    &[
                        "F&B quality overall",
                        "F&B service overall",
                        "F&B quality main dining",
                        "drinks offerings",
                        "bar service",
                    ],
                ),
                category(
                    "Experience",
                    &["Entertainment", "Excursions", "crew friendliness", "Sentiment analysis"],
                ),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = MetricCatalog::default();
        assert_eq!(catalog.len(), 12);
        assert!(catalog.contains("cabin cleanliness"));
        assert!(!catalog.contains("Review"));
        // Exact match only
        assert!(!catalog.contains("Cabin Cleanliness"));
        assert_eq!(catalog.category_of("bar service"), Some("Food & Beverage"));
        assert_eq!(catalog.category_of(" Cabin Cleanliness"), Some("Ship"));
        assert_eq!(catalog.category_of("Cabins"), None);
    }

    #[test]
    fn test_unknown_category_members_are_dropped() {
        let catalog = MetricCatalog::new(
            vec!["Entertainment".to_string(), "Entertainment".to_string()],
            vec![MetricCategory {
                name: "Experience".to_string(),
                metrics: vec!["Entertainment".to_string(), "Karaoke".to_string()],
            }],
        );
        assert_eq!(catalog.metrics(), &["Entertainment".to_string()]);
        assert_eq!(catalog.categories()[0].metrics, vec!["Entertainment".to_string()]);
    }
}
