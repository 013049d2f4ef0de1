//! Feedback aggregation result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tmgr_common::{Error, Result};

/// Lower bound of the accepted feedback learning rate
pub const MIN_LEARNING_RATE: f64 = 0.00001;
/// Upper bound of the accepted feedback learning rate
pub const MAX_LEARNING_RATE: f64 = 0.05;

/// Reject out-of-range learning rates at the API boundary.
///
/// Values outside the range are an error, never clamped silently.
pub fn validate_learning_rate(learning_rate: f64) -> Result<()> {
    if !learning_rate.is_finite()
        || learning_rate < MIN_LEARNING_RATE
        || learning_rate > MAX_LEARNING_RATE
    {
        return Err(Error::InvalidInput(format!(
            "learning rate must be between {} and {}",
            MIN_LEARNING_RATE, MAX_LEARNING_RATE
        )));
    }
    Ok(())
}

/// Aggregate adjustment signal for one defect label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelFeedback {
    pub label: String,
    pub avg_count_delta: f64,
    pub avg_area_ratio: f64,
    pub avg_confidence_delta: f64,
    /// Bounded scalar nudge for inference confidence, always in [-0.2, 0.2]
    pub adjustment: f64,
    /// Number of annotations that mentioned this label
    pub samples: i64,
}

/// One aggregation pass over the whole annotation corpus
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackSummary {
    pub learning_rate: f64,
    /// Mean of all per-label adjustments (0.0 when no labels)
    pub global_adjustment: f64,
    /// Annotations that contributed at least one box
    pub annotation_samples: i64,
    pub generated_at: DateTime<Utc>,
    pub labels: Vec<LabelFeedback>,
}

/// Immutable audit record of one persisted aggregation pass
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackSnapshot {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub learning_rate: f64,
    pub global_adjustment: f64,
    pub annotation_samples: i64,
    /// Per-label adjustment map as stored
    pub label_adjustments: serde_json::Value,
    pub labels: Vec<LabelFeedback>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learning_rate_bounds() {
        assert!(validate_learning_rate(MIN_LEARNING_RATE).is_ok());
        assert!(validate_learning_rate(MAX_LEARNING_RATE).is_ok());
        assert!(validate_learning_rate(0.001).is_ok());
        assert!(validate_learning_rate(0.0).is_err());
        assert!(validate_learning_rate(0.051).is_err());
        assert!(validate_learning_rate(f64::NAN).is_err());
    }
}
