//! REST API endpoints for the weather report service.
//!
//! Every endpoint except `/api/health` answers with the same JSON envelope:
//!
//! ```json
//! {"message": "...", "status": "success", "errorCode": "", "data": {}}
//! ```
//!
//! ## Error Handling
//!
//! Failures are rendered by [`AppError`] with `status: "error"`, a stable
//! `errorCode` and `data: null`:
//!
//! | Code | Status | Meaning |
//! |------|--------|---------|
//! | `ERR1001` | 400 | Request body is not valid JSON for the endpoint, or names an unstorable timestamp |
//! | `ERR1002` | 400 | A query parameter is malformed or out of range |
//! | `ERR1008` | 500 | Any other server error |
//! | `ERR2001` | 500 | Reading reports failed |
//! | `ERR2002` | 500 | Saving a report failed |
//! | `ERR3001` | 500 | The upstream weather API failed |
//! | `ERR4001` | 404 | No report with that id |
//!
//! # Example
//!
//! ```ignore
//! use weather_service::api;
//!
//! let app = api::app(state);
//! axum::serve(listener, app).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use weather_store::{ReportPage, ReportQuery};
use weather_types::{ComparisonResult, SortField, SortOrder, WeatherReport};

use crate::error::ReportError;
use crate::state::AppState;

/// Error code for a malformed request body.
pub const ERR_INVALID_REQUEST: &str = "ERR1001";
/// Error code for malformed query parameters.
pub const ERR_INVALID_PARAMETERS: &str = "ERR1002";
/// Error code for unclassified server errors.
pub const ERR_SERVER_ERROR: &str = "ERR1008";
/// Error code for failed report reads.
pub const ERR_DATABASE_QUERY: &str = "ERR2001";
/// Error code for failed report writes.
pub const ERR_DATABASE_INSERT: &str = "ERR2002";
/// Error code for upstream weather API failures.
pub const ERR_WEATHER_SERVICE: &str = "ERR3001";
/// Error code for unknown report ids.
pub const ERR_REPORT_NOT_FOUND: &str = "ERR4001";

/// CORS preflight cache lifetime.
pub const CORS_MAX_AGE: Duration = Duration::from_secs(3600);

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/reports", get(get_all_reports).post(generate_report))
        .route("/api/reports/paginated", get(get_paginated_reports))
        .route("/api/reports/compare", post(compare_reports))
        .route("/api/reports/{id}", get(get_report_by_id))
}

/// The router with tracing and CORS layers, bound to `state`.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_allowed_origins);
    router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS policy for the configured origins. `*` allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .max_age(CORS_MAX_AGE)
}

// ==========================================================================
// Response Types
// ==========================================================================

/// The response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub message: String,
    pub status: &'static str,
    /// Empty on success.
    pub error_code: &'static str,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// A success envelope around `data`.
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            status: "success",
            error_code: "",
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// An error envelope with `data: null`.
    pub fn error(message: impl Into<String>, error_code: &'static str) -> Self {
        Self {
            message: message.into(),
            status: "error",
            error_code,
            data: None,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Whether the cache sweeper loop is active.
    pub sweeper_running: bool,
}

/// One page of reports with its position in the full result set.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedReports {
    pub reports: Vec<WeatherReport>,
    pub total_count: u64,
    pub has_more: bool,
    pub current_page: u64,
    pub from_number: u64,
    pub to_number: u64,
}

impl From<ReportPage> for PaginatedReports {
    fn from(page: ReportPage) -> Self {
        Self {
            reports: page.reports,
            total_count: page.total_count,
            has_more: page.has_more,
            current_page: page.current_page,
            from_number: page.from_number,
            to_number: page.to_number,
        }
    }
}

// ==========================================================================
// Request Types
// ==========================================================================

/// Body of `POST /api/reports`.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    /// Observation instant. Now when absent.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

/// Body of `POST /api/reports/compare`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRequest {
    pub report_id1: String,
    pub report_id2: String,
}

/// Query string of `GET /api/reports/paginated`.
///
/// Values arrive as strings so each can be rejected with its own message.
/// Empty values count as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub from_time: Option<String>,
    pub to_time: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl PaginatedParams {
    /// Validate and convert into a store query.
    pub fn into_query(self) -> Result<ReportQuery, AppError> {
        let mut query = ReportQuery::new();

        if let Some(limit) = present(&self.limit) {
            let limit = limit
                .parse::<i64>()
                .ok()
                .filter(|l| *l > 0)
                .and_then(|l| u32::try_from(l).ok())
                .ok_or_else(|| AppError::invalid_parameter("Invalid limit parameter"))?;
            query = query.limit(limit);
        }
        if let Some(offset) = present(&self.offset) {
            let offset = offset
                .parse::<i64>()
                .ok()
                .and_then(|o| u32::try_from(o).ok())
                .ok_or_else(|| AppError::invalid_parameter("Invalid offset parameter"))?;
            query = query.offset(offset);
        }
        if let Some(from) = present(&self.from_time) {
            let from = OffsetDateTime::parse(from, &Rfc3339)
                .map_err(|_| AppError::invalid_parameter("Invalid fromTime parameter"))?;
            query = query.from(from);
        }
        if let Some(to) = present(&self.to_time) {
            let to = OffsetDateTime::parse(to, &Rfc3339)
                .map_err(|_| AppError::invalid_parameter("Invalid toTime parameter"))?;
            query = query.to(to);
        }
        if let (Some(from), Some(to)) = (query.from, query.to)
            && from > to
        {
            return Err(AppError::invalid_parameter(
                "Invalid time range: fromTime must not be after toTime",
            ));
        }
        if let Some(sort_by) = present(&self.sort_by) {
            let field: SortField = sort_by
                .parse()
                .map_err(|_| AppError::invalid_parameter("Invalid sortBy parameter"))?;
            query = query.sort_by(field);
        }
        if let Some(sort_order) = present(&self.sort_order) {
            let order: SortOrder = sort_order
                .parse()
                .map_err(|_| AppError::invalid_parameter("Invalid sortOrder parameter"))?;
            query = query.sort_order(order);
        }

        Ok(query)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ==========================================================================
// Handlers
// ==========================================================================

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        sweeper_running: state.sweeper.is_running(),
    })
}

/// Generate a report for the requested (or current) instant.
async fn generate_report(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<WeatherReport>>), AppError> {
    let Json(request) = body.map_err(|e| {
        debug!("Rejected report request body: {}", e);
        AppError::invalid_body()
    })?;

    let report = state
        .service
        .generate_report(request.timestamp)
        .await
        .map_err(AppError::Report)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success("Report generated successfully", report)),
    ))
}

async fn get_all_reports(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<WeatherReport>>>, AppError> {
    let reports = state
        .service
        .get_all_reports()
        .await
        .map_err(AppError::Report)?;
    Ok(Json(ApiResponse::success(
        "Reports retrieved successfully",
        reports,
    )))
}

/// List one page of reports.
///
/// # Query Parameters
///
/// - `limit`: page size, positive (default 10)
/// - `offset`: rows to skip, non-negative (default 0)
/// - `fromTime`, `toTime`: inclusive RFC 3339 bounds on the report timestamp
/// - `sortBy`: `timestamp`, `createdAt`, `temperature`, `pressure`, `humidity`, `cloudCover`
/// - `sortOrder`: `asc` or `desc` (default)
async fn get_paginated_reports(
    State(state): State<Arc<AppState>>,
    params: Result<Query<PaginatedParams>, QueryRejection>,
) -> Result<Json<ApiResponse<PaginatedReports>>, AppError> {
    let Query(params) = params.map_err(|e| AppError::invalid_parameter(e.body_text()))?;
    let query = params.into_query()?;

    let page = state
        .service
        .get_paginated_reports(&query)
        .await
        .map_err(AppError::Report)?;
    Ok(Json(ApiResponse::success(
        "Reports retrieved successfully",
        PaginatedReports::from(page),
    )))
}

async fn get_report_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<WeatherReport>>, AppError> {
    let report = state
        .service
        .get_report_by_id(&id)
        .await
        .map_err(AppError::Report)?;
    Ok(Json(ApiResponse::success(
        "Report retrieved successfully",
        report,
    )))
}

async fn compare_reports(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CompareRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ComparisonResult>>, AppError> {
    let Json(request) = body.map_err(|e| {
        debug!("Rejected compare request body: {}", e);
        AppError::invalid_body()
    })?;

    let result = state
        .service
        .compare_reports(&request.report_id1, &request.report_id2)
        .await
        .map_err(AppError::Report)?;
    Ok(Json(ApiResponse::success(
        "Reports compared successfully",
        result,
    )))
}

// ==========================================================================
// Errors
// ==========================================================================

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// The body could not be decoded.
    InvalidBody,
    /// A query parameter was rejected.
    InvalidParameter(String),
    /// A report operation failed.
    Report(ReportError),
}

impl AppError {
    fn invalid_body() -> Self {
        AppError::InvalidBody
    }

    fn invalid_parameter(message: impl Into<String>) -> Self {
        AppError::InvalidParameter(message.into())
    }

    /// HTTP status, error code and message for this error.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::InvalidBody => (
                StatusCode::BAD_REQUEST,
                ERR_INVALID_REQUEST,
                "Invalid request body".to_string(),
            ),
            AppError::InvalidParameter(msg) => {
                (StatusCode::BAD_REQUEST, ERR_INVALID_PARAMETERS, msg.clone())
            }
            AppError::Report(e) => report_error_parts(e),
        }
    }
}

fn report_error_parts(e: &ReportError) -> (StatusCode, &'static str, String) {
    match e {
        ReportError::Store(inner) if inner.is_not_found() => (
            StatusCode::NOT_FOUND,
            ERR_REPORT_NOT_FOUND,
            "Report not found".to_string(),
        ),
        ReportError::FirstReportUnavailable(_) | ReportError::SecondReportUnavailable(_)
            if e.is_not_found() =>
        {
            (StatusCode::NOT_FOUND, ERR_REPORT_NOT_FOUND, e.to_string())
        }
        ReportError::UnsupportedTimestamp(_) => {
            (StatusCode::BAD_REQUEST, ERR_INVALID_REQUEST, e.to_string())
        }
        ReportError::WeatherFetchFailed(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ERR_WEATHER_SERVICE,
            e.to_string(),
        ),
        ReportError::ReportPersistFailed(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ERR_DATABASE_INSERT,
            e.to_string(),
        ),
        ReportError::FirstReportUnavailable(inner)
        | ReportError::SecondReportUnavailable(inner)
        | ReportError::Store(inner) => {
            let code = match inner {
                weather_store::Error::Read { .. } | weather_store::Error::Database(_) => {
                    ERR_DATABASE_QUERY
                }
                _ => ERR_SERVER_ERROR,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, code, e.to_string())
        }
    }
}

impl From<ReportError> for AppError {
    fn from(e: ReportError) -> Self {
        AppError::Report(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            error!(code, "{}", message);
        }
        (status, Json(ApiResponse::error(message, code))).into_response()
    }
}
