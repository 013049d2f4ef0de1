//! Annotation corpus access
//!
//! The annotation CRUD lifecycle lives in another service; this module only
//! records committed edits into the shared corpus table and reads the full
//! corpus back for aggregation.

use sqlx::{Row, SqlitePool};
use tmgr_common::Result;

use crate::models::Annotation;

/// The slice of an annotation the feedback aggregator needs
#[derive(Debug, Clone)]
pub struct CorpusAnnotation {
    pub id: i64,
    pub original_result_json: String,
    pub modified_result_json: String,
}

/// Record a committed annotation edit into the corpus table
///
/// Re-submitting the same annotation id replaces the previous row; the
/// aggregation corpus always reflects the latest committed edit.
pub async fn upsert(pool: &SqlitePool, annotation: &Annotation) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO annotations (
            id, version, analysis_job_id, transformer_id, inspection_id, image_id,
            image_path, annotator, comments, original_result_json, modified_result_json,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
        ON CONFLICT(id) DO UPDATE SET
            version = excluded.version,
            annotator = excluded.annotator,
            comments = excluded.comments,
            original_result_json = excluded.original_result_json,
            modified_result_json = excluded.modified_result_json,
            updated_at = excluded.created_at
        "#,
    )
    .bind(annotation.id)
    .bind(annotation.version)
    .bind(annotation.analysis_job_id)
    .bind(annotation.transformer_id)
    .bind(annotation.inspection_id)
    .bind(annotation.image_id)
    .bind(&annotation.image_path)
    .bind(&annotation.annotator)
    .bind(&annotation.comments)
    .bind(&annotation.original_result_json)
    .bind(&annotation.modified_result_json)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch the full annotation corpus for one aggregation pass
pub async fn fetch_corpus(pool: &SqlitePool) -> Result<Vec<CorpusAnnotation>> {
    let rows = sqlx::query(
        "SELECT id, original_result_json, modified_result_json FROM annotations ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| CorpusAnnotation {
            id: row.get("id"),
            original_result_json: row.get("original_result_json"),
            modified_result_json: row.get("modified_result_json"),
        })
        .collect())
}
