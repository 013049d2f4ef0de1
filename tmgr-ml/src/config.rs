//! Service configuration for tmgr-ml
//!
//! Settings come from an optional TOML file (`tmgr-ml.toml` in the root
//! folder, or a path given on the command line) with serde defaults; all
//! dataset/model paths default to locations under the root folder.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tmgr_common::{Error, Result};

/// Default HTTP listen port
pub const DEFAULT_PORT: u16 = 5731;

/// Raw `[training]` settings as they appear in the TOML file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Master switch for the whole retraining pipeline
    pub enabled: bool,
    /// Queue a run automatically after each annotation append
    pub auto_trigger: bool,
    /// Copy a successful run's model over the base model
    pub auto_promote: bool,
    /// Trainer interpreter or executable
    pub trainer_program: String,
    /// Optional script passed as the first argument
    pub trainer_script: Option<PathBuf>,
    /// Upload root holding source images (default: `<root>/uploads`)
    pub upload_dir: Option<PathBuf>,
    /// Feedback dataset root (default: `<root>/feedback_dataset`)
    pub dataset_dir: Option<PathBuf>,
    /// Versions root for run workspaces and model artifacts
    /// (default: `<root>/model_versions`)
    pub versions_dir: Option<PathBuf>,
    /// Canonical served model file (default: `<root>/model_weights/model.ckpt`)
    pub base_model: Option<PathBuf>,
    /// Kill the training process after this many seconds; absent = no limit
    pub execution_timeout_secs: Option<u64>,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_trigger: true,
            auto_promote: true,
            trainer_program: "python3".to_string(),
            trainer_script: None,
            upload_dir: None,
            dataset_dir: None,
            versions_dir: None,
            base_model: None,
            execution_timeout_secs: None,
        }
    }
}

/// Top-level TOML file shape
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub port: Option<u16>,
    pub training: TrainingSettings,
}

impl ServiceSettings {
    /// Load settings from `path`, or defaults when the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

/// Fully resolved pipeline configuration with absolute paths
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub enabled: bool,
    pub auto_trigger: bool,
    pub auto_promote: bool,
    pub trainer_program: PathBuf,
    pub trainer_script: Option<PathBuf>,
    pub upload_dir: PathBuf,
    pub dataset_root: PathBuf,
    pub versions_root: PathBuf,
    pub base_model: PathBuf,
    pub execution_timeout: Option<Duration>,
}

impl TrainingConfig {
    /// Resolve settings against the root data folder
    pub fn resolve(root: &Path, settings: TrainingSettings) -> Self {
        let under_root = |p: Option<PathBuf>, default: &str| {
            p.map(|p| absolutize(root, p))
                .unwrap_or_else(|| root.join(default))
        };

        Self {
            enabled: settings.enabled,
            auto_trigger: settings.auto_trigger,
            auto_promote: settings.auto_promote,
            trainer_program: PathBuf::from(settings.trainer_program),
            trainer_script: settings.trainer_script.map(|p| absolutize(root, p)),
            upload_dir: under_root(settings.upload_dir, "uploads"),
            dataset_root: under_root(settings.dataset_dir, "feedback_dataset"),
            versions_root: under_root(settings.versions_dir, "model_versions"),
            base_model: settings
                .base_model
                .map(|p| absolutize(root, p))
                .unwrap_or_else(|| root.join("model_weights").join("model.ckpt")),
            execution_timeout: settings.execution_timeout_secs.map(Duration::from_secs),
        }
    }

    /// Create the dataset and versions directories, warn about missing inputs
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dataset_root)?;
        std::fs::create_dir_all(&self.versions_root)?;

        if let Some(script) = &self.trainer_script {
            if !script.exists() {
                tracing::warn!("Trainer script not found at {}", script.display());
            }
        }
        if !self.base_model.exists() {
            tracing::warn!(
                "Base model {} does not exist; training runs may fail until provided",
                self.base_model.display()
            );
        }
        Ok(())
    }
}

fn absolutize(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_land_under_root() {
        let config = TrainingConfig::resolve(Path::new("/data/tmgr"), TrainingSettings::default());
        assert_eq!(config.upload_dir, PathBuf::from("/data/tmgr/uploads"));
        assert_eq!(config.dataset_root, PathBuf::from("/data/tmgr/feedback_dataset"));
        assert_eq!(config.versions_root, PathBuf::from("/data/tmgr/model_versions"));
        assert_eq!(
            config.base_model,
            PathBuf::from("/data/tmgr/model_weights/model.ckpt")
        );
        assert!(config.enabled && config.auto_trigger && config.auto_promote);
        assert!(config.execution_timeout.is_none());
    }

    #[test]
    fn relative_overrides_resolve_against_root() {
        let settings = TrainingSettings {
            dataset_dir: Some(PathBuf::from("corpus")),
            base_model: Some(PathBuf::from("/models/served.ckpt")),
            execution_timeout_secs: Some(600),
            ..Default::default()
        };
        let config = TrainingConfig::resolve(Path::new("/data/tmgr"), settings);
        assert_eq!(config.dataset_root, PathBuf::from("/data/tmgr/corpus"));
        assert_eq!(config.base_model, PathBuf::from("/models/served.ckpt"));
        assert_eq!(config.execution_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn settings_parse_from_toml() {
        let settings: ServiceSettings = toml::from_str(
            r#"
            port = 6000

            [training]
            enabled = true
            auto_trigger = false
            trainer_program = "python"
            trainer_script = "trainer/update_model.py"
            execution_timeout_secs = 1800
            "#,
        )
        .unwrap();

        assert_eq!(settings.port, Some(6000));
        assert!(!settings.training.auto_trigger);
        assert_eq!(settings.training.trainer_program, "python");
        assert_eq!(settings.training.execution_timeout_secs, Some(1800));
    }
}
