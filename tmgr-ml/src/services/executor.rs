//! External training process execution
//!
//! The trainer is an opaque external program. It is invoked with an explicit
//! argument vector (never through a shell), its combined stdout/stderr is
//! captured to a per-run log file, and it reports back through a JSON result
//! file unique to the run.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tmgr_common::{Error, Result};
use tokio::process::Command;

use crate::models::ModelTrainingRun;

/// Per-run workspace: result file and process log live here
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    pub dir: PathBuf,
    pub result_file: PathBuf,
    pub log_file: PathBuf,
}

impl RunWorkspace {
    /// Isolated workspace under the versions root, keyed by run id
    pub fn for_run(versions_root: &Path, run_id: &str) -> Self {
        let dir = versions_root.join(format!("run-{}", run_id));
        Self {
            result_file: dir.join("training_result.json"),
            log_file: dir.join("stdout.log"),
            dir,
        }
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}

/// Trainer-reported outcome classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerStatus {
    Ok,
    Skipped,
    Failed,
}

impl TrainerStatus {
    /// Anything other than "failed" or "skipped" counts as success
    fn classify(status: &str) -> Self {
        if status.eq_ignore_ascii_case("failed") {
            TrainerStatus::Failed
        } else if status.eq_ignore_ascii_case("skipped") {
            TrainerStatus::Skipped
        } else {
            TrainerStatus::Ok
        }
    }
}

/// Parsed training result payload
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub status: TrainerStatus,
    /// Full result payload, stored verbatim on the run
    pub metrics_json: String,
    pub version_tag: Option<String>,
    /// Model path relative to the versions root
    pub model_output_path: Option<String>,
    /// Absolute path to the produced model, required for promotion
    pub model_path: Option<String>,
    pub message: Option<String>,
    pub appended_annotations: Option<i64>,
    pub appended_boxes: Option<i64>,
}

/// Executes one training run to completion
///
/// Trait seam so tests can substitute an instrumented fake and verify that
/// the worker serializes executions.
#[async_trait]
pub trait RunExecutor: Send + Sync {
    async fn execute(&self, run: &ModelTrainingRun, workspace: &RunWorkspace)
        -> Result<TrainingOutcome>;
}

/// Invokes the real external training process
pub struct ProcessExecutor {
    program: PathBuf,
    script: Option<PathBuf>,
    dataset_manifest: PathBuf,
    images_dir: PathBuf,
    base_model: PathBuf,
    versions_root: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        program: impl Into<PathBuf>,
        script: Option<PathBuf>,
        dataset_manifest: impl Into<PathBuf>,
        images_dir: impl Into<PathBuf>,
        base_model: impl Into<PathBuf>,
        versions_root: impl Into<PathBuf>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            program: program.into(),
            script,
            dataset_manifest: dataset_manifest.into(),
            images_dir: images_dir.into(),
            base_model: base_model.into(),
            versions_root: versions_root.into(),
            timeout,
        }
    }

    fn build_command(&self, run: &ModelTrainingRun, workspace: &RunWorkspace) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(script) = &self.script {
            cmd.arg(script);
        }
        cmd.arg("--dataset-json").arg(&self.dataset_manifest);
        cmd.arg("--images-dir").arg(&self.images_dir);
        cmd.arg("--base-model").arg(&self.base_model);
        cmd.arg("--versions-root").arg(&self.versions_root);
        cmd.arg("--result-file").arg(&workspace.result_file);
        cmd.arg("--run-id").arg(&run.run_id);
        if let Some(notes) = run.feedback_summary.as_deref() {
            if !notes.trim().is_empty() {
                cmd.arg("--notes").arg(notes);
            }
        }
        cmd
    }
}

#[async_trait]
impl RunExecutor for ProcessExecutor {
    async fn execute(
        &self,
        run: &ModelTrainingRun,
        workspace: &RunWorkspace,
    ) -> Result<TrainingOutcome> {
        let mut cmd = self.build_command(run, workspace);

        // Combined stdout/stderr goes straight into the per-run log file
        let log = std::fs::File::create(&workspace.log_file)?;
        let log_err = log.try_clone()?;
        cmd.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        tracing::info!(
            run_id = %run.run_id,
            program = %self.program.display(),
            "Starting training process"
        );

        let mut child = cmd.spawn().map_err(|e| {
            Error::ExecutionFailure(format!("Failed to launch training process: {}", e))
        })?;

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(Error::ExecutionFailure(format!(
                        "Training process timed out after {}s",
                        limit.as_secs()
                    )));
                }
            },
            None => child.wait().await?,
        };

        if !status.success() {
            let detail = match status.code() {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by signal".to_string(),
            };
            return Err(Error::ExecutionFailure(format!("Training process {}", detail)));
        }

        if !workspace.result_file.exists() {
            return Err(Error::ExecutionFailure(
                "Training result not produced".to_string(),
            ));
        }

        let raw = std::fs::read_to_string(&workspace.result_file)?;
        parse_training_result(&raw)
    }
}

/// Parse the trainer's JSON result file into an outcome
pub fn parse_training_result(raw: &str) -> Result<TrainingOutcome> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| Error::ParseFailure(format!("Unable to parse training result: {}", e)))?;

    let status = TrainerStatus::classify(value["status"].as_str().unwrap_or("ok"));
    let metrics_json = serde_json::to_string_pretty(&value)
        .map_err(|e| Error::ParseFailure(format!("Unable to re-serialize training result: {}", e)))?;

    Ok(TrainingOutcome {
        status,
        metrics_json,
        version_tag: value["version_tag"].as_str().map(str::to_string),
        model_output_path: value["relative_model_path"].as_str().map(str::to_string),
        model_path: value["model_path"].as_str().map(str::to_string),
        message: value["message"].as_str().map(str::to_string),
        appended_annotations: value["appended_annotations"].as_i64(),
        appended_boxes: value["appended_boxes"].as_i64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_status_classification() {
        let ok = parse_training_result(r#"{"status":"ok","version_tag":"v3"}"#).unwrap();
        assert_eq!(ok.status, TrainerStatus::Ok);
        assert_eq!(ok.version_tag.as_deref(), Some("v3"));

        let skipped = parse_training_result(r#"{"status":"skipped"}"#).unwrap();
        assert_eq!(skipped.status, TrainerStatus::Skipped);

        let failed = parse_training_result(r#"{"status":"FAILED","message":"bad data"}"#).unwrap();
        assert_eq!(failed.status, TrainerStatus::Failed);
        assert_eq!(failed.message.as_deref(), Some("bad data"));

        // Missing status counts as success
        let implied = parse_training_result(r#"{"version_tag":"v4"}"#).unwrap();
        assert_eq!(implied.status, TrainerStatus::Ok);
    }

    #[test]
    fn malformed_result_is_a_parse_failure() {
        let err = parse_training_result("{not json").unwrap_err();
        assert!(matches!(err, Error::ParseFailure(_)));
        assert!(err.to_string().contains("Unable to parse training result"));
    }

    #[test]
    fn workspace_paths_are_keyed_by_run_id() {
        let ws = RunWorkspace::for_run(Path::new("/data/versions"), "abc-123");
        assert_eq!(ws.dir, PathBuf::from("/data/versions/run-abc-123"));
        assert_eq!(ws.result_file, ws.dir.join("training_result.json"));
        assert_eq!(ws.log_file, ws.dir.join("stdout.log"));
    }
}
