//! Model training run lifecycle state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Training run lifecycle status
///
/// Transitions are one-directional: QUEUED → RUNNING → terminal.
/// A run never re-enters QUEUED or RUNNING after reaching a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "QUEUED",
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(RunStatus::Queued),
            "RUNNING" => Some(RunStatus::Running),
            "SUCCEEDED" => Some(RunStatus::Succeeded),
            "FAILED" => Some(RunStatus::Failed),
            "SKIPPED" => Some(RunStatus::Skipped),
            _ => None,
        }
    }

    /// SUCCEEDED, FAILED and SKIPPED are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Skipped
        )
    }
}

/// What caused a training run to be created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    AutoFeedback,
    Manual,
    // Reserved for a future scheduler; never produced today
    Scheduled,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::AutoFeedback => "AUTO_FEEDBACK",
            TriggerType::Manual => "MANUAL",
            TriggerType::Scheduled => "SCHEDULED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTO_FEEDBACK" => Some(TriggerType::AutoFeedback),
            "MANUAL" => Some(TriggerType::Manual),
            "SCHEDULED" => Some(TriggerType::Scheduled),
            _ => None,
        }
    }
}

/// One tracked attempt to retrain the detection model
///
/// Created in QUEUED state before being handed to the queue, mutated only by
/// the training worker afterwards, and never deleted (audit trail).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainingRun {
    /// Surrogate database id (0 until persisted)
    pub id: i64,
    /// Globally unique, caller-visible run identifier
    pub run_id: String,
    pub status: RunStatus,
    pub trigger_type: TriggerType,
    pub version_tag: Option<String>,
    pub requested_by: Option<String>,
    pub source_annotation_id: Option<i64>,
    pub analysis_job_id: Option<i64>,
    pub transformer_id: Option<i64>,
    pub inspection_id: Option<i64>,
    pub image_id: Option<i64>,
    pub dataset_path: Option<String>,
    pub model_output_path: Option<String>,
    /// Opaque result payload from the trainer, stored verbatim
    pub metrics_json: Option<String>,
    pub feedback_summary: Option<String>,
    pub error_message: Option<String>,
    pub appended_annotations: i64,
    pub appended_boxes: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ModelTrainingRun {
    /// Create a fresh QUEUED run with a new random run id
    pub fn new_queued(trigger_type: TriggerType) -> Self {
        Self {
            id: 0,
            run_id: Uuid::new_v4().to_string(),
            status: RunStatus::Queued,
            trigger_type,
            version_tag: None,
            requested_by: None,
            source_annotation_id: None,
            analysis_job_id: None,
            transformer_id: None,
            inspection_id: None,
            image_id: None,
            dataset_path: None,
            model_output_path: None,
            metrics_json: None,
            feedback_summary: None,
            error_message: None,
            appended_annotations: 0,
            appended_boxes: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Succeeded,
            RunStatus::Failed,
            RunStatus::Skipped,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Skipped.is_terminal());
    }

    #[test]
    fn new_runs_have_unique_ids() {
        let a = ModelTrainingRun::new_queued(TriggerType::Manual);
        let b = ModelTrainingRun::new_queued(TriggerType::Manual);
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.status, RunStatus::Queued);
    }
}
