//! Feedback aggregation service
//!
//! Turns the full corpus of human-edited annotations into bounded per-label
//! adjustment signals for the inference pipeline. Aggregation is best effort:
//! one unparsable annotation never prevents the rest of the corpus from being
//! summarized.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tmgr_common::{Error, Result};

use crate::db::annotations::{self, CorpusAnnotation};
use crate::db::snapshots::{self, SnapshotRow};
use crate::models::{FeedbackSnapshot, FeedbackSummary, LabelFeedback};

/// Default snapshot history page size
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
/// Largest snapshot history page a caller may request
pub const MAX_HISTORY_LIMIT: i64 = 500;

const AREA_EPSILON: f64 = 1e-6;

/// Detection result payload as produced by the inference pipeline
#[derive(Debug, Deserialize)]
struct DetectionSet {
    #[serde(default)]
    boxes: Vec<DetectionBox>,
}

/// One detected box: label, `[x, y, width, height]` rect, optional confidence
#[derive(Debug, Deserialize)]
struct DetectionBox {
    #[serde(rename = "type")]
    label: Option<String>,
    #[serde(rename = "box")]
    rect: Option<Vec<f64>>,
    confidence: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct LabelStats {
    count: i64,
    area_sum: f64,
    confidence_sum: f64,
}

#[derive(Debug, Default)]
struct LabelAggregate {
    total_count_delta: f64,
    total_area_delta: f64,
    total_orig_area: f64,
    total_confidence_delta: f64,
    samples: i64,
}

/// Computes adjustment signals from the annotation corpus
#[derive(Clone)]
pub struct FeedbackAggregator {
    db: SqlitePool,
}

impl FeedbackAggregator {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Aggregate the current corpus without persisting anything
    pub async fn summarize(&self, learning_rate: f64) -> Result<FeedbackSummary> {
        let corpus = annotations::fetch_corpus(&self.db).await?;
        Ok(aggregate(&corpus, learning_rate))
    }

    /// Aggregate, build the inference payload and persist an immutable snapshot
    pub async fn snapshot(&self, learning_rate: f64) -> Result<(FeedbackSummary, serde_json::Value)> {
        let summary = self.summarize(learning_rate).await?;
        let payload = build_payload(&summary);

        let adjustments_json = serde_json::to_string(&payload["label_adjustments"])
            .map_err(|e| Error::Internal(format!("Failed to serialize adjustments: {}", e)))?;
        let feedback_json = serde_json::to_string(&payload["label_feedback"])
            .map_err(|e| Error::Internal(format!("Failed to serialize label feedback: {}", e)))?;

        snapshots::insert(
            &self.db,
            summary.generated_at,
            summary.learning_rate,
            summary.global_adjustment,
            summary.annotation_samples,
            &adjustments_json,
            &feedback_json,
        )
        .await?;

        Ok((summary, payload))
    }

    /// Most recent snapshots, capped at [`MAX_HISTORY_LIMIT`], returned oldest-first
    pub async fn history(&self, limit: Option<i64>) -> Result<Vec<FeedbackSnapshot>> {
        let limit = match limit {
            Some(n) if n > 0 => n.min(MAX_HISTORY_LIMIT),
            _ => DEFAULT_HISTORY_LIMIT,
        };
        let mut rows = snapshots::recent(&self.db, limit).await?;
        rows.reverse();
        Ok(rows.iter().map(snapshot_from_row).collect())
    }

    /// Snapshots created after `since`, returned oldest-first
    pub async fn history_since(&self, since: DateTime<Utc>) -> Result<Vec<FeedbackSnapshot>> {
        let mut rows = snapshots::since(&self.db, since).await?;
        rows.reverse();
        Ok(rows.iter().map(snapshot_from_row).collect())
    }
}

/// One aggregation pass over the corpus (pure core)
pub fn aggregate(corpus: &[CorpusAnnotation], learning_rate: f64) -> FeedbackSummary {
    let mut aggregates: BTreeMap<String, LabelAggregate> = BTreeMap::new();
    let mut annotation_samples: i64 = 0;

    for annotation in corpus {
        let original = match extract_label_stats(&annotation.original_result_json) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(
                    annotation_id = annotation.id,
                    "Skipping annotation with unparsable original result: {}",
                    e
                );
                continue;
            }
        };
        let modified = match extract_label_stats(&annotation.modified_result_json) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(
                    annotation_id = annotation.id,
                    "Skipping annotation with unparsable modified result: {}",
                    e
                );
                continue;
            }
        };

        // No boxes on either side: contributes nothing, not even a sample
        if original.is_empty() && modified.is_empty() {
            continue;
        }

        let labels: BTreeSet<&String> = original.keys().chain(modified.keys()).collect();
        for label in labels {
            let orig = original.get(label).copied().unwrap_or_default();
            let new = modified.get(label).copied().unwrap_or_default();

            let agg = aggregates.entry(label.clone()).or_default();
            agg.total_count_delta += (new.count - orig.count) as f64;
            agg.total_area_delta += new.area_sum - orig.area_sum;
            agg.total_orig_area += orig.area_sum;
            agg.total_confidence_delta += new.confidence_sum - orig.confidence_sum;
            agg.samples += 1;
        }

        annotation_samples += 1;
    }

    let mut labels = Vec::new();
    let mut total_adjustment = 0.0;

    for (label, agg) in &aggregates {
        if agg.samples == 0 {
            continue;
        }
        let samples = agg.samples as f64;

        let avg_count_delta = agg.total_count_delta / samples;
        let avg_area_delta = agg.total_area_delta / samples;
        let avg_orig_area = agg.total_orig_area / samples;
        let avg_confidence_delta = agg.total_confidence_delta / samples;

        let area_ratio = if avg_orig_area > AREA_EPSILON {
            avg_area_delta / (avg_orig_area + AREA_EPSILON)
        } else if agg.total_area_delta > 0.0 {
            1.0
        } else if agg.total_area_delta < 0.0 {
            -1.0
        } else {
            0.0
        };
        let area_ratio = area_ratio.clamp(-3.0, 3.0);

        let combined_signal =
            (avg_count_delta * 0.5 + area_ratio * 0.3 + avg_confidence_delta * 0.2).clamp(-5.0, 5.0);
        let adjustment = (learning_rate * combined_signal).clamp(-0.2, 0.2);

        total_adjustment += adjustment;
        labels.push(LabelFeedback {
            label: label.clone(),
            avg_count_delta,
            avg_area_ratio: area_ratio,
            avg_confidence_delta,
            adjustment,
            samples: agg.samples,
        });
    }

    let global_adjustment = if labels.is_empty() {
        0.0
    } else {
        total_adjustment / labels.len() as f64
    };

    FeedbackSummary {
        learning_rate,
        global_adjustment,
        annotation_samples,
        generated_at: Utc::now(),
        labels,
    }
}

/// Build the JSON payload consumed by the inference service
pub fn build_payload(summary: &FeedbackSummary) -> serde_json::Value {
    let mut label_adjustments = serde_json::Map::new();
    let mut label_feedback = Vec::new();

    for feedback in &summary.labels {
        label_adjustments.insert(
            feedback.label.clone(),
            json!({
                "adjustment": feedback.adjustment,
                "avg_count_delta": feedback.avg_count_delta,
                "avg_area_ratio": feedback.avg_area_ratio,
                "avg_confidence_delta": feedback.avg_confidence_delta,
                "samples": feedback.samples,
            }),
        );
        label_feedback.push(json!({
            "label": feedback.label,
            "avg_count_delta": feedback.avg_count_delta,
            "avg_area_ratio": feedback.avg_area_ratio,
            "avg_confidence_delta": feedback.avg_confidence_delta,
            "adjustment": feedback.adjustment,
            "samples": feedback.samples,
        }));
    }

    json!({
        "generated_at": summary.generated_at.to_rfc3339(),
        "learning_rate": summary.learning_rate,
        "global_adjustment": summary.global_adjustment,
        "total_annotations_considered": summary.annotation_samples,
        "label_adjustments": serde_json::Value::Object(label_adjustments),
        "label_feedback": serde_json::Value::Array(label_feedback),
    })
}

/// Parse one detection result into per-label statistics
fn extract_label_stats(raw: &str) -> std::result::Result<BTreeMap<String, LabelStats>, serde_json::Error> {
    let mut stats: BTreeMap<String, LabelStats> = BTreeMap::new();
    if raw.trim().is_empty() {
        return Ok(stats);
    }

    let set: DetectionSet = serde_json::from_str(raw)?;
    for detection in set.boxes {
        // A box without a label or a full rect carries no usable signal
        let (Some(label), Some(rect)) = (detection.label, detection.rect) else {
            continue;
        };
        if rect.len() < 4 {
            continue;
        }

        let width = rect[2].max(0.0);
        let height = rect[3].max(0.0);

        let entry = stats.entry(label).or_default();
        entry.count += 1;
        entry.area_sum += width * height;
        entry.confidence_sum += detection.confidence.unwrap_or(0.0);
    }

    Ok(stats)
}

fn snapshot_from_row(row: &SnapshotRow) -> FeedbackSnapshot {
    let label_adjustments = serde_json::from_str(&row.label_adjustments_json).unwrap_or_else(|e| {
        tracing::warn!(snapshot_id = row.id, "Unparsable stored adjustments: {}", e);
        json!({})
    });
    let labels: Vec<LabelFeedback> =
        serde_json::from_str(&row.label_feedback_json).unwrap_or_else(|e| {
            tracing::warn!(snapshot_id = row.id, "Unparsable stored label feedback: {}", e);
            Vec::new()
        });

    FeedbackSnapshot {
        id: row.id,
        created_at: row.created_at,
        learning_rate: row.learning_rate,
        global_adjustment: row.global_adjustment,
        annotation_samples: row.annotation_samples,
        label_adjustments,
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(id: i64, original: &str, modified: &str) -> CorpusAnnotation {
        CorpusAnnotation {
            id,
            original_result_json: original.to_string(),
            modified_result_json: modified.to_string(),
        }
    }

    fn boxes_json(entries: &[(&str, f64, f64, f64)]) -> String {
        let boxes: Vec<serde_json::Value> = entries
            .iter()
            .map(|(label, w, h, conf)| {
                json!({ "type": label, "box": [0.0, 0.0, w, h], "confidence": conf })
            })
            .collect();
        json!({ "boxes": boxes }).to_string()
    }

    #[test]
    fn empty_corpus_yields_zero_adjustment() {
        let summary = aggregate(&[], 0.01);
        assert_eq!(summary.annotation_samples, 0);
        assert_eq!(summary.global_adjustment, 0.0);
        assert!(summary.labels.is_empty());
    }

    #[test]
    fn empty_box_sets_do_not_count_as_samples() {
        let corpus = vec![
            annotation(1, r#"{"boxes":[]}"#, r#"{"boxes":[]}"#),
            annotation(
                2,
                &boxes_json(&[("Overheating", 10.0, 10.0, 0.9)]),
                &boxes_json(&[("Overheating", 10.0, 10.0, 0.9)]),
            ),
        ];
        let summary = aggregate(&corpus, 0.01);
        assert_eq!(summary.annotation_samples, 1);
    }

    #[test]
    fn malformed_annotation_is_skipped_not_fatal() {
        let corpus = vec![
            annotation(1, "{not json", "{not json"),
            annotation(
                2,
                &boxes_json(&[("Corrosion", 5.0, 5.0, 0.5)]),
                &boxes_json(&[("Corrosion", 5.0, 5.0, 0.5), ("Corrosion", 5.0, 5.0, 0.8)]),
            ),
        ];
        let summary = aggregate(&corpus, 0.01);
        assert_eq!(summary.annotation_samples, 1);
        assert_eq!(summary.labels.len(), 1);
        assert_eq!(summary.labels[0].label, "Corrosion");
    }

    #[test]
    fn adjustment_stays_bounded_for_extreme_inputs() {
        // Enormous count delta pushes the combined signal to its clamp
        let modified: Vec<(&str, f64, f64, f64)> =
            std::iter::repeat(("Overheating", 1000.0, 1000.0, 1.0))
                .take(200)
                .collect();
        let corpus = vec![annotation(
            1,
            &boxes_json(&[]),
            &boxes_json(&modified),
        )];

        for lr in [MIN_LR, 0.001, 0.01, MAX_LR] {
            let summary = aggregate(&corpus, lr);
            for label in &summary.labels {
                assert!(label.adjustment >= -0.2 && label.adjustment <= 0.2);
                assert!(label.avg_area_ratio >= -3.0 && label.avg_area_ratio <= 3.0);
            }
        }
    }

    const MIN_LR: f64 = crate::models::feedback::MIN_LEARNING_RATE;
    const MAX_LR: f64 = crate::models::feedback::MAX_LEARNING_RATE;

    #[test]
    fn area_ratio_sign_fallback_at_zero_original_area() {
        // Original area ~ 0, area grew: ratio pinned at +1
        let grew = vec![annotation(
            1,
            &boxes_json(&[("Leak", 0.0, 0.0, 0.0)]),
            &boxes_json(&[("Leak", 20.0, 20.0, 0.0)]),
        )];
        let summary = aggregate(&grew, 0.01);
        assert_eq!(summary.labels[0].avg_area_ratio, 1.0);

        // Area shrank to zero from zero original: delta < 0 impossible, check shrink
        let shrank = vec![annotation(
            1,
            &boxes_json(&[("Leak", 0.0, 0.0, 0.0)]),
            &boxes_json(&[]),
        )];
        let summary = aggregate(&shrank, 0.01);
        assert_eq!(summary.labels[0].avg_area_ratio, 0.0);
    }

    #[test]
    fn area_ratio_negative_fallback() {
        // avg original area below epsilon but total delta negative
        let corpus = vec![
            annotation(
                1,
                &boxes_json(&[("Leak", 0.001, 0.001, 0.0)]),
                &boxes_json(&[]),
            ),
        ];
        let summary = aggregate(&corpus, 0.01);
        assert_eq!(summary.labels[0].avg_area_ratio, -1.0);
    }

    #[test]
    fn single_label_global_equals_label_adjustment() {
        let corpus = vec![
            annotation(
                1,
                &boxes_json(&[("Overheating", 10.0, 10.0, 0.6)]),
                &boxes_json(&[("Overheating", 12.0, 12.0, 0.8), ("Overheating", 8.0, 8.0, 0.7)]),
            ),
            annotation(
                2,
                &boxes_json(&[("Overheating", 30.0, 30.0, 0.9)]),
                &boxes_json(&[("Overheating", 25.0, 25.0, 0.9)]),
            ),
        ];
        let summary = aggregate(&corpus, 0.01);
        assert_eq!(summary.labels.len(), 1);
        assert_eq!(summary.global_adjustment, summary.labels[0].adjustment);
    }

    #[test]
    fn payload_carries_all_labels() {
        let corpus = vec![annotation(
            1,
            &boxes_json(&[("Corrosion", 10.0, 10.0, 0.5)]),
            &boxes_json(&[("Corrosion", 10.0, 10.0, 0.7), ("Leak", 4.0, 4.0, 0.9)]),
        )];
        let summary = aggregate(&corpus, 0.01);
        let payload = build_payload(&summary);

        assert_eq!(payload["learning_rate"], json!(0.01));
        assert_eq!(payload["total_annotations_considered"], json!(1));
        assert!(payload["label_adjustments"].get("Corrosion").is_some());
        assert!(payload["label_adjustments"].get("Leak").is_some());
        assert_eq!(payload["label_feedback"].as_array().unwrap().len(), 2);
    }
}
