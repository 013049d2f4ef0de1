//! Training run endpoints

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tmgr_common::Error;

use crate::api::ApiError;
use crate::db;
use crate::models::ModelTrainingRun;
use crate::AppState;

/// Run as presented to API clients; metrics parsed into structured JSON
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub id: i64,
    pub run_id: String,
    pub status: &'static str,
    pub trigger_type: &'static str,
    pub version_tag: Option<String>,
    pub requested_by: Option<String>,
    pub feedback_summary: Option<String>,
    pub dataset_path: Option<String>,
    pub model_output_path: Option<String>,
    pub error_message: Option<String>,
    pub appended_annotations: i64,
    pub appended_boxes: i64,
    pub source_annotation_id: Option<i64>,
    pub analysis_job_id: Option<i64>,
    pub transformer_id: Option<i64>,
    pub inspection_id: Option<i64>,
    pub image_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metrics: Option<serde_json::Value>,
}

impl From<ModelTrainingRun> for RunResponse {
    fn from(run: ModelTrainingRun) -> Self {
        // Unparsable stored metrics degrade to null rather than failing the request
        let metrics = run
            .metrics_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        Self {
            id: run.id,
            run_id: run.run_id,
            status: run.status.as_str(),
            trigger_type: run.trigger_type.as_str(),
            version_tag: run.version_tag,
            requested_by: run.requested_by,
            feedback_summary: run.feedback_summary,
            dataset_path: run.dataset_path,
            model_output_path: run.model_output_path,
            error_message: run.error_message,
            appended_annotations: run.appended_annotations,
            appended_boxes: run.appended_boxes,
            source_annotation_id: run.source_annotation_id,
            analysis_job_id: run.analysis_job_id,
            transformer_id: run.transformer_id,
            inspection_id: run.inspection_id,
            image_id: run.image_id,
            created_at: run.created_at,
            started_at: run.started_at,
            completed_at: run.completed_at,
            metrics,
        }
    }
}

/// GET /api/training/runs — all runs, newest first
pub async fn list_runs(State(state): State<AppState>) -> Result<Json<Vec<RunResponse>>, ApiError> {
    let runs = db::runs::list_newest_first(&state.db).await?;
    Ok(Json(runs.into_iter().map(RunResponse::from).collect()))
}

/// GET /api/training/runs/:id
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RunResponse>, ApiError> {
    let run = db::runs::fetch(&state.db, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Training run {} not found", id)))?;
    Ok(Json(RunResponse::from(run)))
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerRunRequest {
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /api/training/runs/trigger
pub async fn trigger_run(
    State(state): State<AppState>,
    Json(request): Json<TriggerRunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let requested_by = request
        .requested_by
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("system");

    let run = state
        .pipeline
        .trigger_manual(requested_by, request.notes)
        .await?;
    Ok(Json(RunResponse::from(run)))
}
