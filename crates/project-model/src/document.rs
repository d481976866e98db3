//! Edit document: the on-disk form of one editing session.
//!
//! The document ties a source video to its trim window, the preview
//! size the overlays were authored in, and the layers themselves.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::job::{Dimensions, ExportJob, JobError, TrimRange};
use crate::layer::Layer;
use crate::store::{OverlayStore, StoreError};

/// Top-level edit document (`*.overlaycut.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditDocument {
    /// Schema version.
    pub version: String,

    /// Human-readable name.
    pub name: String,

    /// Unique document identifier (UUID).
    pub id: String,

    /// Creation timestamp (RFC 3339).
    pub created_at: String,

    /// Last modified timestamp (RFC 3339).
    pub modified_at: String,

    /// The video being edited.
    pub source: SourceVideo,

    /// Selected export window.
    pub trim: TrimRange,

    /// Preview container size the overlays were placed in.
    pub display: Dimensions,

    /// Overlays in z-order, bottom first.
    #[serde(default)]
    pub layers: Vec<Layer>,
}

/// Reference to the source video with probed metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceVideo {
    /// Path to the media file, relative to the document or absolute.
    pub path: PathBuf,

    /// Duration in seconds.
    pub duration_secs: f64,

    /// Native pixel size.
    pub width: u32,
    pub height: u32,

    /// Native frame rate, when known.
    #[serde(default)]
    pub fps: Option<f64>,
}

impl EditDocument {
    /// New document covering the whole source, with the preview sized
    /// to the source.
    pub fn new(name: impl Into<String>, source: SourceVideo) -> Result<Self, DocumentError> {
        let now = chrono::Utc::now().to_rfc3339();
        let trim = TrimRange::full(source.duration_secs)?;
        let display = Dimensions::new(source.width, source.height);
        Ok(Self {
            version: "1.0".to_string(),
            name: name.into(),
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now.clone(),
            modified_at: now,
            source,
            trim,
            display,
            layers: vec![],
        })
    }

    /// Load a document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| DocumentError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let doc: Self = serde_json::from_str(&json).map_err(|e| DocumentError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        doc.validate()?;
        Ok(doc)
    }

    /// Save the document, refreshing `modified_at`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DocumentError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        self.modified_at = chrono::Utc::now().to_rfc3339();
        let json = serde_json::to_string_pretty(self).map_err(|e| DocumentError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| DocumentError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), DocumentError> {
        TrimRange::new(self.trim.start, self.trim.end, self.source.duration_secs)?;
        if self.display.is_empty() {
            return Err(DocumentError::ValidationError {
                message: format!(
                    "display dimensions {}x{} must be non-zero",
                    self.display.width, self.display.height
                ),
            });
        }
        for layer in &self.layers {
            if !layer.timing.is_valid() {
                return Err(DocumentError::ValidationError {
                    message: format!(
                        "layer {} has invalid timing [{}, {}]",
                        layer.id, layer.timing.start, layer.timing.end
                    ),
                });
            }
        }
        Ok(())
    }

    /// Source path resolved against the document's directory.
    pub fn resolve_source(&self, document_path: &Path) -> PathBuf {
        if self.source.path.is_absolute() {
            return self.source.path.clone();
        }
        document_path
            .parent()
            .map(|dir| dir.join(&self.source.path))
            .unwrap_or_else(|| self.source.path.clone())
    }

    /// Build an overlay store from the document's layers.
    pub fn to_store(&self) -> Result<OverlayStore, DocumentError> {
        Ok(OverlayStore::from_layers(
            self.source.duration_secs,
            self.layers.iter().cloned(),
        )?)
    }

    /// Replace the layers with the store's current contents.
    pub fn set_layers_from(&mut self, store: &OverlayStore) {
        self.layers = store.all().map(|l| l.as_ref().clone()).collect();
    }

    /// Snapshot into an export job.
    pub fn to_job(&self, document_path: &Path) -> Result<ExportJob, DocumentError> {
        let store = self.to_store()?;
        Ok(ExportJob::new(
            self.resolve_source(document_path),
            self.source.duration_secs,
            self.trim,
            store.snapshot(),
            self.display,
        )?)
    }
}

/// Errors that can occur when working with edit documents.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid document: {message}")]
    ValidationError { message: String },

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{TextStyle, Timing};

    fn source() -> SourceVideo {
        SourceVideo {
            path: PathBuf::from("clip.mp4"),
            duration_secs: 10.0,
            width: 1920,
            height: 1080,
            fps: Some(30.0),
        }
    }

    #[test]
    fn test_document_defaults_to_full_trim() {
        let doc = EditDocument::new("Test", source()).unwrap();
        assert_eq!(doc.trim, TrimRange { start: 0.0, end: 10.0 });
        assert_eq!(doc.display, Dimensions::new(1920, 1080));
        assert_eq!(doc.version, "1.0");
    }

    #[test]
    fn test_document_save_and_load() {
        let dir = std::env::temp_dir().join("overlaycut_test_document");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("edit.overlaycut.json");

        let mut doc = EditDocument::new("Roundtrip", source()).unwrap();
        doc.layers.push(Layer::text(
            "Hello",
            TextStyle::default(),
            5.0,
            5.0,
            Timing::new(1.0, 3.0).unwrap(),
        ));
        doc.save(&path).unwrap();

        let loaded = EditDocument::load(&path).unwrap();
        assert_eq!(loaded.name, "Roundtrip");
        assert_eq!(loaded.layers.len(), 1);
        assert_eq!(loaded.resolve_source(&path), dir.join("clip.mp4"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_trim_fails_validation() {
        let mut doc = EditDocument::new("Bad", source()).unwrap();
        doc.trim = TrimRange { start: 4.0, end: 12.0 };
        assert!(matches!(doc.validate(), Err(DocumentError::Job(_))));
    }

    #[test]
    fn test_to_job_snapshots_layers() {
        let mut doc = EditDocument::new("Job", source()).unwrap();
        doc.trim = TrimRange { start: 2.0, end: 7.0 };
        doc.display = Dimensions::new(400, 225);
        doc.layers.push(Layer::text(
            "Hi",
            TextStyle::default(),
            0.0,
            0.0,
            Timing::new(0.0, 10.0).unwrap(),
        ));

        let job = doc.to_job(Path::new("/work/edit.json")).unwrap();
        assert_eq!(job.video_source, PathBuf::from("/work/clip.mp4"));
        assert_eq!(job.layers.len(), 1);
        assert_eq!(job.export_duration(), 5.0);
    }
}
