//! Training run persistence
//!
//! Runs are persisted after every state change so a crash mid-execution
//! leaves an inspectable record. Runs are never deleted.

use sqlx::{Row, SqlitePool};
use tmgr_common::{Error, Result};

use crate::models::{ModelTrainingRun, RunStatus, TriggerType};

/// Insert a freshly created QUEUED run, returning its surrogate id
pub async fn insert(pool: &SqlitePool, run: &ModelTrainingRun) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO model_training_runs (
            run_id, status, trigger_type, version_tag, requested_by,
            source_annotation_id, analysis_job_id, transformer_id, inspection_id, image_id,
            dataset_path, model_output_path, metrics_json, feedback_summary, error_message,
            appended_annotations, appended_boxes, created_at, started_at, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&run.run_id)
    .bind(run.status.as_str())
    .bind(run.trigger_type.as_str())
    .bind(&run.version_tag)
    .bind(&run.requested_by)
    .bind(run.source_annotation_id)
    .bind(run.analysis_job_id)
    .bind(run.transformer_id)
    .bind(run.inspection_id)
    .bind(run.image_id)
    .bind(&run.dataset_path)
    .bind(&run.model_output_path)
    .bind(&run.metrics_json)
    .bind(&run.feedback_summary)
    .bind(&run.error_message)
    .bind(run.appended_annotations)
    .bind(run.appended_boxes)
    .bind(run.created_at.to_rfc3339())
    .bind(run.started_at.map(|dt| dt.to_rfc3339()))
    .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Persist the mutable portion of a run after a state change
pub async fn update(pool: &SqlitePool, run: &ModelTrainingRun) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE model_training_runs SET
            status = ?, version_tag = ?, model_output_path = ?, metrics_json = ?,
            error_message = ?, appended_annotations = ?, appended_boxes = ?,
            started_at = ?, completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(run.status.as_str())
    .bind(&run.version_tag)
    .bind(&run.model_output_path)
    .bind(&run.metrics_json)
    .bind(&run.error_message)
    .bind(run.appended_annotations)
    .bind(run.appended_boxes)
    .bind(run.started_at.map(|dt| dt.to_rfc3339()))
    .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
    .bind(run.id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch one run by surrogate id
pub async fn fetch(pool: &SqlitePool, id: i64) -> Result<Option<ModelTrainingRun>> {
    let row = sqlx::query("SELECT * FROM model_training_runs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| from_row(&r)).transpose()
}

/// List all runs, newest first
pub async fn list_newest_first(pool: &SqlitePool) -> Result<Vec<ModelTrainingRun>> {
    let rows = sqlx::query("SELECT * FROM model_training_runs ORDER BY created_at DESC, id DESC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(from_row).collect()
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ModelTrainingRun> {
    let status: String = row.get("status");
    let status = RunStatus::parse(&status)
        .ok_or_else(|| Error::ParseFailure(format!("Unknown run status '{}'", status)))?;

    let trigger_type: String = row.get("trigger_type");
    let trigger_type = TriggerType::parse(&trigger_type)
        .ok_or_else(|| Error::ParseFailure(format!("Unknown trigger type '{}'", trigger_type)))?;

    let created_at: String = row.get("created_at");

    Ok(ModelTrainingRun {
        id: row.get("id"),
        run_id: row.get("run_id"),
        status,
        trigger_type,
        version_tag: row.get("version_tag"),
        requested_by: row.get("requested_by"),
        source_annotation_id: row.get("source_annotation_id"),
        analysis_job_id: row.get("analysis_job_id"),
        transformer_id: row.get("transformer_id"),
        inspection_id: row.get("inspection_id"),
        image_id: row.get("image_id"),
        dataset_path: row.get("dataset_path"),
        model_output_path: row.get("model_output_path"),
        metrics_json: row.get("metrics_json"),
        feedback_summary: row.get("feedback_summary"),
        error_message: row.get("error_message"),
        appended_annotations: row.get("appended_annotations"),
        appended_boxes: row.get("appended_boxes"),
        created_at: super::parse_timestamp(&created_at)?,
        started_at: super::parse_timestamp_opt(row.get("started_at"))?,
        completed_at: super::parse_timestamp_opt(row.get("completed_at"))?,
    })
}
