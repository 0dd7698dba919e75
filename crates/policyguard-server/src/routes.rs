//! HTTP routes and handlers

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use policyguard_core::{AnalysisResponse, PipelineRequest};
use policyguard_telemetry::{AuditEntry, AuditRecord};
use serde::Deserialize;
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::guardrails::{validate_content, Rejection};
use crate::state::AppState;

/// Records returned by `/audit/recent` when no limit is given
const DEFAULT_RECENT_LIMIT: usize = 50;

pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/analyze", post(analyze))
        .route("/audit/recent", get(audit_recent))
        .fallback(fallback)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Content submitted for moderation
#[derive(Debug, Deserialize)]
struct ContentItem {
    id: String,
    text: String,
    #[serde(default)]
    language: Option<String>,
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<ContentItem>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let Json(item) = payload?;
    validate_content(&item.id, &item.text, state.max_text_chars)?;

    let mut request = PipelineRequest::new(item.id, item.text);
    if let Some(language) = item.language {
        request = request.with_language(language);
    }

    let report = state.pipeline.analyze_with_trace(&request).await;
    let trace = &report.trace;

    let entry = AuditEntry::new(&report.response)
        .with_path(trace.path.as_str())
        .with_category(trace.classification.category)
        .with_retrieved(trace.retrieved_policy_ids.clone())
        .with_degraded_stages(
            trace
                .degraded_stages
                .iter()
                .map(|stage| stage.as_str().to_string())
                .collect(),
        )
        .with_latency_us(trace.total_latency_us);
    state.audit.record(entry);

    Ok(Json(report.response))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

async fn audit_recent(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Json<Vec<AuditRecord>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .min(state.recent_capacity);
    debug!(limit, "Serving recent audit records");
    Json(state.audit.recent(limit).await)
}

async fn fallback() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "message": "Not found",
                "type": "invalid_request_error",
            }
        })),
    )
}

/// Application error type
#[derive(Debug)]
enum AppError {
    InvalidRequest(StatusCode, String),
    Rejected(Rejection),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.status(), rejection.body_text())
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        AppError::Rejected(rejection)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, kind) = match self {
            AppError::InvalidRequest(status, msg) => (status, msg, "invalid_request_error"),
            AppError::Rejected(rejection) => {
                (rejection.status(), rejection.to_string(), rejection.reason())
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}
