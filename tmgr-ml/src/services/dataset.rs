//! Feedback dataset appender
//!
//! Every committed annotation edit is exported into the file-backed training
//! corpus: the source image and the reviewed box list are written under
//! deterministic names, and one record is appended to the JSON-lines
//! manifest. Writes are serialized by a single process-wide lock; the
//! manifest is append-only and read only by out-of-process tooling.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tmgr_common::{Error, Result};
use tokio::sync::Mutex;

use crate::models::{Annotation, AnnotationBox, BoxAction};

/// On-disk schema version for manifest records and annotation exports
pub const DATASET_SCHEMA_VERSION: u32 = 1;

/// Directory layout of the feedback dataset
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    pub root: PathBuf,
    pub images_dir: PathBuf,
    pub annotations_dir: PathBuf,
    pub manifest: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            images_dir: root.join("images"),
            annotations_dir: root.join("annotations"),
            manifest: root.join("records.jsonl"),
            root,
        }
    }

    /// Create the dataset directories if missing
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.images_dir)?;
        std::fs::create_dir_all(&self.annotations_dir)?;
        Ok(())
    }
}

/// Per-action box counts for one export
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionCounts {
    pub added: i64,
    pub modified: i64,
    pub deleted: i64,
    pub unchanged: i64,
}

impl ActionCounts {
    /// Boxes without an action tag count toward the box total only
    fn tally(boxes: &[AnnotationBox]) -> Self {
        let mut counts = Self::default();
        for b in boxes {
            match b.action {
                Some(BoxAction::Added) => counts.added += 1,
                Some(BoxAction::Modified) => counts.modified += 1,
                Some(BoxAction::Deleted) => counts.deleted += 1,
                Some(BoxAction::Unchanged) => counts.unchanged += 1,
                None => {}
            }
        }
        counts
    }
}

/// Result of one dataset append, used to populate the new training run
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub summary: String,
    pub box_count: i64,
    pub counts: ActionCounts,
    pub annotator: Option<String>,
}

/// One JSON line in the append-only manifest
#[derive(Serialize)]
struct ManifestRecord<'a> {
    schema_version: u32,
    annotation_id: i64,
    annotation_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis_job_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transformer_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inspection_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_id: Option<i64>,
    recorded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotator: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<&'a str>,
    /// Relative to the dataset root; absent when the source image was missing
    #[serde(skip_serializing_if = "Option::is_none")]
    image_file: Option<String>,
    annotation_file: String,
    boxes: &'a [AnnotationBox],
    added_boxes: i64,
    modified_boxes: i64,
    deleted_boxes: i64,
    unchanged_boxes: i64,
    box_count: i64,
}

/// Exported box list file, one per annotation id + version
#[derive(Serialize)]
struct AnnotationExport<'a> {
    schema_version: u32,
    annotation_id: i64,
    annotation_version: i64,
    boxes: &'a [AnnotationBox],
}

/// Appends annotation exports to the feedback dataset under a writer lock
pub struct DatasetAppender {
    layout: DatasetLayout,
    uploads_root: PathBuf,
    write_lock: Mutex<()>,
}

impl DatasetAppender {
    pub fn new(layout: DatasetLayout, uploads_root: impl Into<PathBuf>) -> Self {
        Self {
            layout,
            uploads_root: uploads_root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// Export one annotation and append its manifest record.
    ///
    /// Re-exporting the same annotation id + version overwrites the image and
    /// annotation files but still appends a fresh manifest line. Any I/O
    /// failure aborts this append and surfaces to the caller.
    pub async fn append(&self, annotation: &Annotation) -> Result<AppendOutcome> {
        let _guard = self.write_lock.lock().await;

        // Filesystem work is synchronous; keep it off the runtime threads
        let layout = self.layout.clone();
        let uploads_root = self.uploads_root.clone();
        let annotation = annotation.clone();
        tokio::task::spawn_blocking(move || export_annotation(&layout, &uploads_root, &annotation))
            .await
            .map_err(|e| Error::Internal(format!("Dataset export task failed: {}", e)))?
    }
}

fn export_annotation(
    layout: &DatasetLayout,
    uploads_root: &Path,
    annotation: &Annotation,
) -> Result<AppendOutcome> {
    layout.ensure()?;

    let counts = ActionCounts::tally(&annotation.boxes);
    let base_name = format!("annotation-{}-v{}", annotation.id, annotation.version);

    // Copy the source image under its deterministic name, if it can be found
    let image_file = match resolve_image_path(uploads_root, annotation) {
        Some(source) => {
            let target = layout
                .images_dir
                .join(format!("{}{}", base_name, image_extension(&source)));
            std::fs::copy(&source, &target)?;
            Some(format!("images/{}", file_name(&target)?))
        }
        None => None,
    };

    // Serialize the reviewed box list, overwriting any prior export
    let export_path = layout.annotations_dir.join(format!("{}.json", base_name));
    let export = AnnotationExport {
        schema_version: DATASET_SCHEMA_VERSION,
        annotation_id: annotation.id,
        annotation_version: annotation.version,
        boxes: &annotation.boxes,
    };
    std::fs::write(
        &export_path,
        serde_json::to_vec_pretty(&export)
            .map_err(|e| Error::Internal(format!("Failed to serialize export: {}", e)))?,
    )?;

    let record = ManifestRecord {
        schema_version: DATASET_SCHEMA_VERSION,
        annotation_id: annotation.id,
        annotation_version: annotation.version,
        analysis_job_id: annotation.analysis_job_id,
        transformer_id: annotation.transformer_id,
        inspection_id: annotation.inspection_id,
        image_id: annotation.image_id,
        recorded_at: chrono::Utc::now().to_rfc3339(),
        annotator: annotation.annotator.as_deref(),
        comments: annotation.comments.as_deref(),
        image_file,
        annotation_file: format!("annotations/{}.json", base_name),
        boxes: &annotation.boxes,
        added_boxes: counts.added,
        modified_boxes: counts.modified,
        deleted_boxes: counts.deleted,
        unchanged_boxes: counts.unchanged,
        box_count: annotation.boxes.len() as i64,
    };

    let line = serde_json::to_string(&record)
        .map_err(|e| Error::Internal(format!("Failed to serialize manifest record: {}", e)))?;
    let mut manifest = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&layout.manifest)?;
    writeln!(manifest, "{}", line)?;

    let box_count = annotation.boxes.len() as i64;
    let summary = format!(
        "Annotation {} -> boxes:{} (added:{} modified:{} deleted:{})",
        annotation.id, box_count, counts.added, counts.modified, counts.deleted
    );

    tracing::info!(
        annotation_id = annotation.id,
        version = annotation.version,
        boxes = box_count,
        "Appended annotation to feedback dataset"
    );

    Ok(AppendOutcome {
        summary,
        box_count,
        counts,
        annotator: annotation.annotator.clone(),
    })
}

/// Resolve the annotation's source image against the ordered candidate
/// locations: the uploads root first, then the analysis subdirectory.
fn resolve_image_path(uploads_root: &Path, annotation: &Annotation) -> Option<PathBuf> {
    let raw = annotation.image_path.as_deref()?.trim();
    if raw.is_empty() {
        return None;
    }
    let relative = raw.trim_start_matches('/');

    let candidates = [
        uploads_root.join(relative),
        uploads_root.join("analysis").join(relative),
    ];
    for candidate in candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    tracing::warn!(
        annotation_id = annotation.id,
        image_path = raw,
        "Could not resolve annotation image under uploads root {}",
        uploads_root.display()
    );
    None
}

fn image_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".png".to_string())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Internal(format!("Path has no file name: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_annotation(id: i64, version: i64, image_path: Option<&str>) -> Annotation {
        Annotation {
            id,
            version,
            analysis_job_id: Some(11),
            transformer_id: Some(3),
            inspection_id: Some(7),
            image_id: Some(21),
            image_path: image_path.map(str::to_string),
            annotator: Some("inspector-a".to_string()),
            comments: None,
            original_result_json: r#"{"boxes":[]}"#.to_string(),
            modified_result_json: r#"{"boxes":[]}"#.to_string(),
            boxes: vec![
                AnnotationBox {
                    x: 0,
                    y: 0,
                    width: 10,
                    height: 10,
                    label: Some("Overheating".to_string()),
                    confidence: Some(0.9),
                    comments: None,
                    action: Some(BoxAction::Added),
                },
                AnnotationBox {
                    x: 5,
                    y: 5,
                    width: 20,
                    height: 20,
                    label: Some("Corrosion".to_string()),
                    confidence: None,
                    comments: None,
                    action: Some(BoxAction::Modified),
                },
                AnnotationBox {
                    x: 9,
                    y: 9,
                    width: 4,
                    height: 4,
                    label: Some("Leak".to_string()),
                    confidence: Some(0.4),
                    comments: None,
                    action: Some(BoxAction::Deleted),
                },
            ],
        }
    }

    fn manifest_lines(layout: &DatasetLayout) -> Vec<serde_json::Value> {
        std::fs::read_to_string(&layout.manifest)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn append_writes_files_and_manifest_line() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(uploads.join("analysis")).unwrap();
        std::fs::write(uploads.join("analysis").join("img-21.png"), b"png-bytes").unwrap();

        let layout = DatasetLayout::new(dir.path().join("dataset"));
        let appender = DatasetAppender::new(layout.clone(), &uploads);

        let annotation = sample_annotation(7, 1, Some("img-21.png"));
        let outcome = appender.append(&annotation).await.unwrap();

        assert_eq!(outcome.box_count, 3);
        assert_eq!(outcome.counts.added, 1);
        assert_eq!(outcome.counts.modified, 1);
        assert_eq!(outcome.counts.deleted, 1);

        // Fallback path under uploads/analysis was used
        assert!(layout.images_dir.join("annotation-7-v1.png").exists());
        assert!(layout.annotations_dir.join("annotation-7-v1.json").exists());

        let lines = manifest_lines(&layout);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["annotation_id"], 7);
        assert_eq!(lines[0]["added_boxes"], 1);
        assert_eq!(lines[0]["modified_boxes"], 1);
        assert_eq!(lines[0]["deleted_boxes"], 1);
        assert_eq!(lines[0]["box_count"], 3);
        assert_eq!(lines[0]["image_file"], "images/annotation-7-v1.png");
    }

    #[tokio::test]
    async fn reexport_overwrites_files_but_appends_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::write(uploads.join("img.png"), b"png-bytes").unwrap();

        let layout = DatasetLayout::new(dir.path().join("dataset"));
        let appender = DatasetAppender::new(layout.clone(), &uploads);

        let annotation = sample_annotation(7, 1, Some("img.png"));
        appender.append(&annotation).await.unwrap();
        appender.append(&annotation).await.unwrap();

        let images: Vec<_> = std::fs::read_dir(&layout.images_dir).unwrap().collect();
        let exports: Vec<_> = std::fs::read_dir(&layout.annotations_dir).unwrap().collect();
        assert_eq!(images.len(), 1);
        assert_eq!(exports.len(), 1);
        assert_eq!(manifest_lines(&layout).len(), 2);
    }

    #[tokio::test]
    async fn untagged_boxes_count_only_toward_box_total() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();

        let layout = DatasetLayout::new(dir.path().join("dataset"));
        let appender = DatasetAppender::new(layout.clone(), &uploads);

        let mut annotation = sample_annotation(4, 1, None);
        annotation.boxes = vec![
            AnnotationBox {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
                label: Some("Overheating".to_string()),
                confidence: Some(0.9),
                comments: None,
                action: Some(BoxAction::Added),
            },
            AnnotationBox {
                x: 5,
                y: 5,
                width: 6,
                height: 6,
                label: Some("Corrosion".to_string()),
                confidence: None,
                comments: None,
                action: None,
            },
        ];

        let outcome = appender.append(&annotation).await.unwrap();

        assert_eq!(outcome.box_count, 2);
        assert_eq!(outcome.counts.added, 1);
        assert_eq!(outcome.counts.unchanged, 0);

        let lines = manifest_lines(&layout);
        assert_eq!(lines[0]["box_count"], 2);
        assert_eq!(lines[0]["added_boxes"], 1);
        assert_eq!(lines[0]["unchanged_boxes"], 0);
    }

    #[tokio::test]
    async fn missing_image_is_recorded_without_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();

        let layout = DatasetLayout::new(dir.path().join("dataset"));
        let appender = DatasetAppender::new(layout.clone(), &uploads);

        let annotation = sample_annotation(9, 2, Some("gone.png"));
        appender.append(&annotation).await.unwrap();

        let lines = manifest_lines(&layout);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].get("image_file").is_none());
        assert_eq!(lines[0]["annotation_file"], "annotations/annotation-9-v2.json");
    }
}
