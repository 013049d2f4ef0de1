//! Database access for tmgr-ml
//!
//! All timestamps are stored as RFC3339 TEXT columns.

pub mod annotations;
pub mod runs;
pub mod snapshots;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tmgr_common::{Error, Result};

/// Initialize tmgr-ml specific tables
///
/// Creates the training-run, feedback-snapshot and annotation-corpus tables
/// if they don't exist. The annotations table is written by the annotation
/// subsystem as well; this service only needs it to exist so the aggregation
/// corpus can be read on a fresh database.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotations (
            id INTEGER PRIMARY KEY,
            version INTEGER NOT NULL DEFAULT 1,
            analysis_job_id INTEGER,
            transformer_id INTEGER,
            inspection_id INTEGER,
            image_id INTEGER,
            image_path TEXT,
            annotator TEXT,
            comments TEXT,
            original_result_json TEXT NOT NULL,
            modified_result_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_training_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL,
            trigger_type TEXT NOT NULL,
            version_tag TEXT,
            requested_by TEXT,
            source_annotation_id INTEGER,
            analysis_job_id INTEGER,
            transformer_id INTEGER,
            inspection_id INTEGER,
            image_id INTEGER,
            dataset_path TEXT,
            model_output_path TEXT,
            metrics_json TEXT,
            feedback_summary TEXT,
            error_message TEXT,
            appended_annotations INTEGER NOT NULL DEFAULT 0,
            appended_boxes INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedback_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at TEXT NOT NULL,
            learning_rate REAL NOT NULL,
            global_adjustment REAL NOT NULL,
            annotation_samples INTEGER NOT NULL,
            label_adjustments_json TEXT NOT NULL,
            label_feedback_json TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (annotations, model_training_runs, feedback_snapshots)");

    Ok(())
}

/// Parse an RFC3339 TEXT column back into a UTC timestamp
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::ParseFailure(format!("Failed to parse timestamp '{}': {}", value, e)))
}

/// Parse an optional RFC3339 TEXT column
pub(crate) fn parse_timestamp_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}
