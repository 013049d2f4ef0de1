//! Feedback snapshot persistence
//!
//! Snapshots are immutable audit records; insert and read only.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tmgr_common::Result;

/// Raw snapshot row as stored
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub learning_rate: f64,
    pub global_adjustment: f64,
    pub annotation_samples: i64,
    pub label_adjustments_json: String,
    pub label_feedback_json: String,
}

/// Persist one aggregation pass
pub async fn insert(
    pool: &SqlitePool,
    created_at: DateTime<Utc>,
    learning_rate: f64,
    global_adjustment: f64,
    annotation_samples: i64,
    label_adjustments_json: &str,
    label_feedback_json: &str,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO feedback_snapshots (
            created_at, learning_rate, global_adjustment, annotation_samples,
            label_adjustments_json, label_feedback_json
        ) VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(created_at.to_rfc3339())
    .bind(learning_rate)
    .bind(global_adjustment)
    .bind(annotation_samples)
    .bind(label_adjustments_json)
    .bind(label_feedback_json)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Fetch the most recent snapshots, newest first
pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<SnapshotRow>> {
    let rows = sqlx::query(
        "SELECT * FROM feedback_snapshots ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Fetch snapshots created after the given instant, newest first
pub async fn since(pool: &SqlitePool, since: DateTime<Utc>) -> Result<Vec<SnapshotRow>> {
    let rows = sqlx::query(
        "SELECT * FROM feedback_snapshots WHERE created_at > ? ORDER BY created_at DESC, id DESC",
    )
    .bind(since.to_rfc3339())
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SnapshotRow> {
    let created_at: String = row.get("created_at");

    Ok(SnapshotRow {
        id: row.get("id"),
        created_at: super::parse_timestamp(&created_at)?,
        learning_rate: row.get("learning_rate"),
        global_adjustment: row.get("global_adjustment"),
        annotation_samples: row.get("annotation_samples"),
        label_adjustments_json: row.get("label_adjustments_json"),
        label_feedback_json: row.get("label_feedback_json"),
    })
}
