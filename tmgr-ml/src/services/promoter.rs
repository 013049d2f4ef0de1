//! Model promotion
//!
//! After a successful run, the newly trained model replaces the canonical
//! base model file served to the inference pipeline. The swap is a plain
//! copy-over: non-atomic for readers, with no cross-process coordination.
//! That limitation is accepted and documented rather than papered over.

use std::path::{Path, PathBuf};

/// Replaces the canonical base model with a newly trained one
#[derive(Debug, Clone)]
pub struct ModelPromoter {
    base_model: PathBuf,
}

impl ModelPromoter {
    pub fn new(base_model: impl Into<PathBuf>) -> Self {
        Self {
            base_model: base_model.into(),
        }
    }

    /// Promote the model at `model_path`, if it exists.
    ///
    /// Promotion problems are logged, never escalated: the run already
    /// SUCCEEDED and its record must not be disturbed by a failed copy.
    pub fn promote(&self, model_path: Option<&str>) {
        let Some(model_path) = model_path else {
            tracing::warn!("Training result missing model_path; promotion skipped");
            return;
        };

        let new_model = Path::new(model_path);
        if !new_model.exists() {
            tracing::warn!(
                "New model file {} does not exist; promotion skipped",
                new_model.display()
            );
            return;
        }

        if let Err(e) = self.copy_over(new_model) {
            tracing::error!(
                "Failed to promote new model {}: {}",
                new_model.display(),
                e
            );
        } else {
            tracing::info!(
                "Promoted model {} to {}",
                new_model.display(),
                self.base_model.display()
            );
        }
    }

    fn copy_over(&self, new_model: &Path) -> std::io::Result<()> {
        if let Some(parent) = self.base_model.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(new_model, &self.base_model)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_replaces_base_model() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("weights").join("model.ckpt");
        std::fs::create_dir_all(base.parent().unwrap()).unwrap();
        std::fs::write(&base, b"old").unwrap();

        let new_model = dir.path().join("new_model.ckpt");
        std::fs::write(&new_model, b"new").unwrap();

        let promoter = ModelPromoter::new(&base);
        promoter.promote(Some(new_model.to_str().unwrap()));

        assert_eq!(std::fs::read(&base).unwrap(), b"new");
    }

    #[test]
    fn missing_model_file_skips_promotion() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("model.ckpt");
        std::fs::write(&base, b"old").unwrap();

        let promoter = ModelPromoter::new(&base);
        promoter.promote(Some(dir.path().join("absent.ckpt").to_str().unwrap()));
        promoter.promote(None);

        // Base model untouched in both skip cases
        assert_eq!(std::fs::read(&base).unwrap(), b"old");
    }
}
