//! Feedback aggregation endpoints and the annotation-committed boundary

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tmgr_common::Error;

use crate::api::runs::RunResponse;
use crate::api::ApiError;
use crate::models::feedback::validate_learning_rate;
use crate::models::{Annotation, FeedbackSnapshot, FeedbackSummary};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LearningRateQuery {
    pub learning_rate: f64,
}

/// POST /api/feedback/annotations
///
/// Boundary with the annotation subsystem: one committed human edit comes in,
/// the dataset grows by one record and a QUEUED run comes back. Export I/O
/// failures surface as errors rather than being swallowed.
pub async fn submit_annotation(
    State(state): State<AppState>,
    Json(annotation): Json<Annotation>,
) -> Result<Json<RunResponse>, ApiError> {
    let run = state.pipeline.handle_annotation_feedback(&annotation).await?;
    Ok(Json(RunResponse::from(run)))
}

/// GET /api/feedback/summary?learning_rate=
pub async fn feedback_summary(
    State(state): State<AppState>,
    Query(query): Query<LearningRateQuery>,
) -> Result<Json<FeedbackSummary>, ApiError> {
    validate_learning_rate(query.learning_rate)?;
    let summary = state.aggregator.summarize(query.learning_rate).await?;
    Ok(Json(summary))
}

/// POST /api/feedback/snapshot?learning_rate=
///
/// Aggregates, persists an immutable snapshot and returns the inference
/// payload.
pub async fn feedback_snapshot(
    State(state): State<AppState>,
    Query(query): Query<LearningRateQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_learning_rate(query.learning_rate)?;
    let (_summary, payload) = state.aggregator.snapshot(query.learning_rate).await?;
    Ok(Json(payload))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    /// RFC3339 timestamp; takes precedence over `limit` when present
    pub since: Option<String>,
}

/// GET /api/feedback/history?limit=&since=
pub async fn feedback_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<FeedbackSnapshot>>, ApiError> {
    let snapshots = match query.since.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => {
            let since = chrono::DateTime::parse_from_rfc3339(raw)
                .map_err(|e| Error::InvalidInput(format!("Invalid 'since' timestamp: {}", e)))?
                .with_timezone(&chrono::Utc);
            state.aggregator.history_since(since).await?
        }
        None => state.aggregator.history(query.limit).await?,
    };
    Ok(Json(snapshots))
}
