//! Data models for tmgr-ml (model retraining pipeline service)

pub mod annotation;
pub mod feedback;
pub mod run;

pub use annotation::{Annotation, AnnotationBox, BoxAction};
pub use feedback::{FeedbackSnapshot, FeedbackSummary, LabelFeedback};
pub use run::{ModelTrainingRun, RunStatus, TriggerType};
