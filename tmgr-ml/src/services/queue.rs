//! Training run queue and worker
//!
//! An unbounded FIFO of run ids drained by exactly one background task. The
//! single consumer is the correctness guarantee that at most one training
//! process executes at a time, protecting the shared base model file.
//!
//! The queue carries ids, not run objects: the worker re-reads the run from
//! the database before processing so it observes any updates made after
//! enqueue.

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tmgr_common::Result;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::db;
use crate::models::{ModelTrainingRun, RunStatus};
use crate::services::executor::{RunExecutor, RunWorkspace, TrainerStatus};
use crate::services::promoter::ModelPromoter;

/// Enqueue handle shared across request handlers; send never blocks
#[derive(Clone)]
pub struct TrainingQueue {
    tx: UnboundedSender<i64>,
}

impl TrainingQueue {
    /// Fire-and-forget enqueue of a persisted run's id
    pub fn enqueue(&self, run_id: i64) {
        if self.tx.send(run_id).is_err() {
            tracing::warn!(run_id, "Training queue closed; run will stay QUEUED");
        }
    }
}

/// Create the queue and the receiver end for the worker
pub fn training_queue() -> (TrainingQueue, UnboundedReceiver<i64>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TrainingQueue { tx }, rx)
}

/// The single background consumer of the training queue
pub struct TrainingWorker {
    db: SqlitePool,
    executor: Arc<dyn RunExecutor>,
    promoter: Option<ModelPromoter>,
    versions_root: std::path::PathBuf,
}

impl TrainingWorker {
    pub fn new(
        db: SqlitePool,
        executor: Arc<dyn RunExecutor>,
        promoter: Option<ModelPromoter>,
        versions_root: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            db,
            executor,
            promoter,
            versions_root: versions_root.into(),
        }
    }

    /// Drain the queue until shutdown is requested or the channel closes.
    ///
    /// A single run's failure never terminates the loop.
    pub async fn run(self, mut rx: UnboundedReceiver<i64>, shutdown: CancellationToken) {
        tracing::info!("Training worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Training worker shutting down");
                    break;
                }
                next = rx.recv() => {
                    match next {
                        Some(run_id) => {
                            if let Err(e) = self.process_run(run_id).await {
                                tracing::error!(run_id, "Unexpected failure processing run: {}", e);
                            }
                        }
                        None => {
                            tracing::info!("Training queue closed; worker exiting");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn process_run(&self, run_id: i64) -> Result<()> {
        let Some(mut run) = db::runs::fetch(&self.db, run_id).await? else {
            tracing::warn!(run_id, "Requested training run not found");
            return Ok(());
        };

        // Double-enqueue guard: terminal runs are never re-executed
        if run.status.is_terminal() {
            tracing::debug!(run_id = %run.run_id, status = run.status.as_str(), "Run already terminal; skipping");
            return Ok(());
        }

        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        db::runs::update(&self.db, &run).await?;

        let workspace = RunWorkspace::for_run(&self.versions_root, &run.run_id);
        if let Err(e) = workspace.ensure() {
            return self
                .fail_run(run, format!("Unable to create run workspace: {}", e))
                .await;
        }

        match self.executor.execute(&run, &workspace).await {
            Ok(outcome) => {
                run.metrics_json = Some(outcome.metrics_json.clone());
                run.version_tag = outcome.version_tag.clone();
                run.model_output_path = outcome.model_output_path.clone();
                run.error_message = outcome.message.clone();
                if let Some(n) = outcome.appended_annotations {
                    run.appended_annotations = n;
                }
                if let Some(n) = outcome.appended_boxes {
                    run.appended_boxes = n;
                }
                run.status = match outcome.status {
                    TrainerStatus::Ok => RunStatus::Succeeded,
                    TrainerStatus::Skipped => RunStatus::Skipped,
                    TrainerStatus::Failed => RunStatus::Failed,
                };
                run.completed_at = Some(Utc::now());
                db::runs::update(&self.db, &run).await?;

                tracing::info!(
                    run_id = %run.run_id,
                    status = run.status.as_str(),
                    "Training run completed"
                );

                if run.status == RunStatus::Succeeded {
                    if let Some(promoter) = &self.promoter {
                        promoter.promote(outcome.model_path.as_deref());
                    }
                }
                Ok(())
            }
            Err(e) => self.fail_run(run, e.to_string()).await,
        }
    }

    async fn fail_run(&self, mut run: ModelTrainingRun, message: String) -> Result<()> {
        tracing::error!(run_id = %run.run_id, "Training run failed: {}", message);
        run.status = RunStatus::Failed;
        run.error_message = Some(message);
        run.completed_at = Some(Utc::now());
        db::runs::update(&self.db, &run).await
    }
}
