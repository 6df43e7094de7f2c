//! Sailing Metrics Service
//!
//! Guest-satisfaction queries over per-sailing survey tables.
//!
//! Layout:
//! - `data`: CSV loading with Polars into the read-only dataset store
//! - `query_engine`: per-sailing statistics and threshold filtering for one metric
//! - `comparison`: multi-metric comparison and deviation from the cross-sailing mean
//! - `summary`: sailing summary selection and trend statistics
//! - `auth` / `sessions`: credential file verification and per-session review triage
//! - `api_server`: Axum HTTP/JSON adapter (feature `api`)

pub mod utils;
pub mod sailing;
pub mod catalog;
pub mod config;
pub mod data;
pub mod query_engine;
pub mod comparison;
pub mod summary;
pub mod auth;

#[cfg(feature = "api")]
pub mod sessions;

#[cfg(feature = "api")]
pub mod api_server;

// Re-export commonly used types
pub use catalog::{MetricCatalog, MetricCategory};
pub use config::AppConfig;
pub use data::DatasetStore;
pub use query_engine::{MetricStats, QueryEngine, QueryError, QueryOutcome, QueryResult};
pub use comparison::{compare_metrics, metric_rating, MetricComparison};
pub use sailing::{DateRange, SailingIdentifier, SailingSelection, SailingSummary};
pub use summary::{select_summaries, summary_stats, MetricSummaryStats};
pub use auth::{AuthError, AuthenticatedUser, CredentialStore};

#[cfg(feature = "api")]
pub use api_server::{create_router, AppState};
