//! Annotation boundary types
//!
//! An `Annotation` is the value the annotation-editing subsystem hands over
//! whenever a human edit is committed. The CRUD lifecycle of annotations is
//! owned elsewhere; this service only consumes committed edits.

use serde::{Deserialize, Serialize};

/// What the reviewer did to one box relative to the AI output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoxAction {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

/// One reviewed rectangular defect region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    /// Defect-type label
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// AI confidence for the original detection, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<BoxAction>,
}

/// A committed human correction set over one AI analysis result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: i64,
    /// Monotonically increasing edit version
    pub version: i64,
    #[serde(default)]
    pub analysis_job_id: Option<i64>,
    #[serde(default)]
    pub transformer_id: Option<i64>,
    #[serde(default)]
    pub inspection_id: Option<i64>,
    #[serde(default)]
    pub image_id: Option<i64>,
    /// Source image path, relative to the uploads root
    #[serde(default)]
    pub image_path: Option<String>,
    /// Annotator display name
    #[serde(default)]
    pub annotator: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    /// Original AI-generated detection result
    pub original_result_json: String,
    /// User-modified detection result
    pub modified_result_json: String,
    /// Current reviewed box list with per-box action tags
    #[serde(default)]
    pub boxes: Vec<AnnotationBox>,
}
