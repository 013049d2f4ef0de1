//! Retraining pipeline facade
//!
//! Entry points for the two ways a training run comes into existence:
//! a committed annotation edit (auto-feedback) and a manual trigger. Both
//! persist a QUEUED run before handing its id to the queue.

use sqlx::SqlitePool;
use tmgr_common::{Error, Result};

use crate::db;
use crate::models::{Annotation, ModelTrainingRun, TriggerType};
use crate::services::dataset::DatasetAppender;
use crate::services::queue::TrainingQueue;

pub struct TrainingPipeline {
    db: SqlitePool,
    appender: DatasetAppender,
    queue: TrainingQueue,
    enabled: bool,
    auto_trigger: bool,
}

impl TrainingPipeline {
    pub fn new(
        db: SqlitePool,
        appender: DatasetAppender,
        queue: TrainingQueue,
        enabled: bool,
        auto_trigger: bool,
    ) -> Self {
        Self {
            db,
            appender,
            queue,
            enabled,
            auto_trigger,
        }
    }

    /// Handle one committed annotation edit.
    ///
    /// Records the edit into the corpus, exports it to the dataset, creates
    /// a QUEUED run carrying the append statistics, and (when auto-trigger is
    /// enabled) enqueues it. Export failures surface to the caller; the
    /// annotation save itself is not ours to roll back.
    pub async fn handle_annotation_feedback(
        &self,
        annotation: &Annotation,
    ) -> Result<ModelTrainingRun> {
        self.ensure_enabled()?;

        db::annotations::upsert(&self.db, annotation).await?;
        let outcome = self.appender.append(annotation).await?;

        let mut run = ModelTrainingRun::new_queued(TriggerType::AutoFeedback);
        run.requested_by = outcome.annotator.clone();
        run.source_annotation_id = Some(annotation.id);
        run.analysis_job_id = annotation.analysis_job_id;
        run.transformer_id = annotation.transformer_id;
        run.inspection_id = annotation.inspection_id;
        run.image_id = annotation.image_id;
        run.dataset_path = Some(self.appender.layout().root.display().to_string());
        run.feedback_summary = Some(outcome.summary.clone());
        run.appended_annotations = 1;
        run.appended_boxes = outcome.box_count;

        run.id = db::runs::insert(&self.db, &run).await?;

        tracing::info!(
            annotation_id = annotation.id,
            run_id = %run.run_id,
            "Recorded feedback annotation for training run"
        );

        if self.auto_trigger {
            self.queue.enqueue(run.id);
        }

        Ok(run)
    }

    /// Manually trigger a training run; always enqueued
    pub async fn trigger_manual(
        &self,
        requested_by: &str,
        notes: Option<String>,
    ) -> Result<ModelTrainingRun> {
        self.ensure_enabled()?;

        let mut run = ModelTrainingRun::new_queued(TriggerType::Manual);
        run.requested_by = Some(requested_by.to_string());
        run.dataset_path = Some(self.appender.layout().root.display().to_string());
        run.feedback_summary = notes;

        run.id = db::runs::insert(&self.db, &run).await?;
        self.queue.enqueue(run.id);

        tracing::info!(run_id = %run.run_id, requested_by, "Manual training run queued");
        Ok(run)
    }

    fn ensure_enabled(&self) -> Result<()> {
        if !self.enabled {
            return Err(Error::InvalidInput(
                "Model training pipeline is disabled".to_string(),
            ));
        }
        Ok(())
    }
}
