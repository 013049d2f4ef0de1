//! Pipeline services for tmgr-ml

pub mod dataset;
pub mod executor;
pub mod feedback;
pub mod pipeline;
pub mod promoter;
pub mod queue;

pub use dataset::{DatasetAppender, DatasetLayout};
pub use executor::{ProcessExecutor, RunExecutor, RunWorkspace, TrainingOutcome};
pub use feedback::FeedbackAggregator;
pub use pipeline::TrainingPipeline;
pub use promoter::ModelPromoter;
pub use queue::{training_queue, TrainingQueue, TrainingWorker};
