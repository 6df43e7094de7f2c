// Axum API Server Module
//
// Purpose: HTTP/JSON surface over the query engine, comparison layer,
// summary statistics, credential store and session triage store.
// All paths live under /sailing except the health check.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{AuthError, CredentialStore};
use crate::comparison::{compare_metrics, metric_rating};
use crate::config::AppConfig;
use crate::data::DatasetStore;
use crate::query_engine::{QueryEngine, QueryError};
use crate::sailing::{DateRange, SailingIdentifier, SailingSelection, SailingSummary};
use crate::sessions::{SessionStore, TriageAction};
use crate::summary::{select_summaries, summary_stats};

/// Header carrying the id returned by `/sailing/auth`
pub const SESSION_HEADER: &str = "x-session-id";

// ============================================================================
// Application State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub engine: QueryEngine,
    pub credentials: CredentialStore,
    pub sessions: SessionStore,
    pub request_timeout: Duration,
}

impl AppState {
    /// Build state around an already loaded store
    pub fn new(config: &AppConfig, store: DatasetStore) -> Self {
        let catalog = config.catalog();
        tracing::info!("Metric catalog: {} metrics", catalog.len());

        Self {
            engine: QueryEngine::new(Arc::new(store), Arc::new(catalog)),
            credentials: CredentialStore::new(config.auth.auth_file.clone()),
            sessions: SessionStore::new(Duration::from_secs(config.server.session_idle_secs)),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        }
    }

    /// Load the dataset named by `config` and build state around it
    pub fn load(config: &AppConfig) -> anyhow::Result<Self> {
        let store = DatasetStore::load(&config.data)?;
        Ok(Self::new(config, store))
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    let timeout = state.request_timeout;

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Catalog endpoints
        .route("/sailing/ships", get(get_ships))
        .route("/sailing/metrics", get(get_metrics))

        // Summary endpoints
        .route("/sailing/getRatingSmry", post(get_rating_summary))
        .route("/sailing/getRatingStats", post(get_rating_stats))

        // Metric query endpoints
        .route("/sailing/getMetricRating", post(get_metric_rating))
        .route("/sailing/compareMetrics", post(compare_metrics_handler))

        // Authentication + review triage
        .route("/sailing/auth", post(authenticate))
        .route("/sailing/session", delete(end_session))
        .route("/sailing/triage", get(get_triage).post(update_triage))

        // Middleware (applied in reverse order)
        .layer(TimeoutLayer::new(timeout)) // 408 once the request exceeds the budget
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Request Types
// ============================================================================

/// JSON body extractor whose rejections use the API error shape
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
struct ApiJson<T>(T);

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FilterBy {
    Date,
    Sailing,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateFilters {
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
}

impl DateFilters {
    fn is_empty(&self) -> bool {
        self.from_date.is_none() && self.to_date.is_none()
    }

    fn range(&self) -> Result<DateRange, AppError> {
        Ok(DateRange::new(self.from_date, self.to_date)?)
    }
}

/// Sailing selection shared by every query body
///
/// `filter_by: "date"` selects by `filters`; otherwise `sailings` is required.
#[derive(Debug, Deserialize)]
struct SelectionRequest {
    filter_by: Option<FilterBy>,
    sailings: Option<Vec<SailingIdentifier>>,
    filters: Option<DateFilters>,
}

impl SelectionRequest {
    fn date_range(&self) -> Result<Option<DateRange>, AppError> {
        match &self.filters {
            Some(filters) if !filters.is_empty() => filters.range().map(Some),
            _ => Ok(None),
        }
    }

    fn required_range(&self) -> Result<DateRange, AppError> {
        self.date_range()?
            .ok_or_else(|| AppError::bad_request("filter_by 'date' requires filters.fromDate or filters.toDate"))
    }

    fn required_sailings(&self) -> Result<&[SailingIdentifier], AppError> {
        self.sailings
            .as_deref()
            .ok_or_else(|| AppError::bad_request("Missing sailings parameter"))
    }

    fn selection(&self) -> Result<SailingSelection, AppError> {
        match self.filter_by {
            Some(FilterBy::Date) => Ok(SailingSelection::Dates(self.required_range()?)),
            Some(FilterBy::Sailing) | None => Ok(SailingSelection::Sailings(self.required_sailings()?.to_vec())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryRequest {
    #[serde(flatten)]
    selection: SelectionRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetricRatingRequest {
    #[serde(flatten)]
    selection: SelectionRequest,
    metric: String,
    #[serde(default)]
    filter_below: Option<f64>,
    #[serde(default)]
    compare_to_average: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompareMetricsRequest {
    #[serde(flatten)]
    selection: SelectionRequest,
    metrics: Vec<String>,
    #[serde(default)]
    filter_below: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AuthRequest {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriageRequest {
    review_id: String,
    action: TriageAction,
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_ships(State(state): State<AppState>) -> Json<serde_json::Value> {
    let data: Vec<serde_json::Value> = state
        .engine
        .store()
        .ship_names()
        .into_iter()
        .enumerate()
        .map(|(idx, name)| serde_json::json!({ "name": name, "id": idx + 1 }))
        .collect();

    Json(serde_json::json!({
        "status": "success",
        "data": data,
    }))
}

async fn get_metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let catalog = state.engine.catalog();
    Json(serde_json::json!({
        "status": "success",
        "metrics": catalog.metrics(),
        "categories": catalog.categories(),
    }))
}

/// Summaries for explicit sailings (optionally narrowed by date) or a date window
async fn get_rating_summary(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SummaryRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let summaries = summaries_for(&state, &req.selection)?;
    tracing::debug!("getRatingSmry matched {} summaries", summaries.len());

    Ok(Json(serde_json::json!({
        "status": "success",
        "count": summaries.len(),
        "data": summaries,
    })))
}

/// Highest / lowest / mean / trend per score across the selected summaries
async fn get_rating_stats(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SummaryRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let summaries = summaries_for(&state, &req.selection)?;
    let stats = summary_stats(&summaries, state.engine.catalog());

    Ok(Json(serde_json::json!({
        "status": "success",
        "count": summaries.len(),
        "data": stats,
    })))
}

fn summaries_for(
    state: &AppState,
    selection: &SelectionRequest,
) -> Result<Vec<SailingSummary>, AppError> {
    let store = state.engine.store();
    match selection.filter_by {
        Some(FilterBy::Date) => {
            let range = selection.required_range()?;
            Ok(select_summaries(store, None, Some(&range)))
        }
        Some(FilterBy::Sailing) | None => {
            let sailings = selection.required_sailings()?;
            let range = selection.date_range()?;
            Ok(select_summaries(store, Some(sailings), range.as_ref()))
        }
    }
}

async fn get_metric_rating(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<MetricRatingRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let selection = req.selection.selection()?;
    let sailings = state.engine.resolve_selection(&selection);

    let start = std::time::Instant::now();
    let results = metric_rating(
        &state.engine,
        &sailings,
        &req.metric,
        req.filter_below,
        req.compare_to_average,
    )?;
    tracing::debug!(
        "getMetricRating '{}' over {} sailings in {:?}",
        req.metric,
        sailings.len(),
        start.elapsed()
    );

    Ok(Json(serde_json::json!({
        "status": "success",
        "metric": req.metric,
        "results": results,
        "filterBelow": req.filter_below,
        "comparedToAverage": req.compare_to_average,
    })))
}

async fn compare_metrics_handler(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CompareMetricsRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.metrics.is_empty() {
        return Err(AppError::bad_request("metrics must list at least one metric"));
    }
    if let Some(t) = req.filter_below {
        if !t.is_finite() {
            return Err(QueryError::InvalidThreshold(t).into());
        }
    }

    let selection = req.selection.selection()?;
    let comparisons = compare_metrics(&state.engine, &selection, &req.metrics, req.filter_below);

    Ok(Json(serde_json::json!({
        "status": "success",
        "filterBelow": req.filter_below,
        "comparisons": comparisons,
    })))
}

/// Verify credentials and open a triage session
async fn authenticate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AuthRequest>,
) -> Response {
    let username = req.username.unwrap_or_default();
    let password = req.password.unwrap_or_default();

    // PBKDF2 runs on the blocking pool
    let credentials = state.credentials.clone();
    let verified = tokio::task::spawn_blocking(move || credentials.verify(&username, &password)).await;

    let outcome = match verified {
        Ok(outcome) => outcome,
        Err(e) => Err(AuthError::Unavailable(e.to_string())),
    };

    match outcome {
        Ok(user) => {
            tracing::info!("User '{}' authenticated", user.user);
            let session_id = state.sessions.start(user.clone()).await;
            Json(serde_json::json!({
                "authenticated": true,
                "user": user.user,
                "role": user.role,
                "sessionId": session_id,
            }))
            .into_response()
        }
        Err(e) => {
            let (status, message) = match e {
                AuthError::MissingFields => (StatusCode::BAD_REQUEST, "Username and password required".to_string()),
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, AuthError::InvalidCredentials.to_string())
                }
                other => {
                    tracing::error!("Authentication failed: {}", other);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed".to_string())
                }
            };
            (
                status,
                Json(serde_json::json!({
                    "authenticated": false,
                    "error": message,
                })),
            )
                .into_response()
        }
    }
}

async fn end_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = session_id(&headers)?;
    if !state.sessions.end(id).await {
        return Err(AppError::Unauthorized("Unknown or expired session".to_string()));
    }
    Ok(Json(serde_json::json!({ "status": "success" })))
}

async fn get_triage(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = session_id(&headers)?;
    let snapshot = state
        .sessions
        .snapshot(id)
        .await
        .ok_or_else(|| AppError::Unauthorized("Unknown or expired session".to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": snapshot,
    })))
}

async fn update_triage(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<TriageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = session_id(&headers)?;
    let review_id = req.review_id.trim();
    if review_id.is_empty() {
        return Err(AppError::bad_request("reviewId must not be empty"));
    }

    let snapshot = state
        .sessions
        .apply(id, req.action, review_id)
        .await
        .ok_or_else(|| AppError::Unauthorized("Unknown or expired session".to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": snapshot,
    })))
}

fn session_id(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", SESSION_HEADER)))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest {
        message: String,
        valid_metrics: Option<Vec<String>>,
    },
    Unauthorized(String),
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest {
            message: message.into(),
            valid_metrics: None,
        }
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        let message = e.to_string();
        match e {
            QueryError::InvalidMetric { valid, .. } => AppError::BadRequest {
                message,
                valid_metrics: Some(valid),
            },
            QueryError::InvalidThreshold(_) | QueryError::InvalidDateRange(_) => AppError::bad_request(message),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message, valid_metrics) = match self {
            AppError::BadRequest { message, valid_metrics } => (StatusCode::BAD_REQUEST, message, valid_metrics),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
        };

        let mut body = serde_json::json!({
            "status": "error",
            "error": message,
        });
        if let Some(valid) = valid_metrics {
            body["valid_metrics"] = serde_json::json!(valid);
        }

        (status, Json(body)).into_response()
    }
}
