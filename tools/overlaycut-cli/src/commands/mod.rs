pub mod add_drawing;
pub mod add_text;
pub mod check;
pub mod export;
pub mod init;
pub mod layout;

use std::path::Path;

use overlaycut_project_model::document::EditDocument;
use overlaycut_project_model::layer::Timing;

fn load_document(path: &Path) -> anyhow::Result<EditDocument> {
    EditDocument::load(path).map_err(|e| anyhow::anyhow!("Failed to load document: {e}"))
}

/// `[start, end]` clamped to the source; `end` defaults to its end.
fn timing_for(doc: &EditDocument, start: f64, end: Option<f64>) -> anyhow::Result<Timing> {
    let duration = doc.source.duration_secs;
    Timing::clamped(start, end.unwrap_or(duration), duration)
        .map_err(|e| anyhow::anyhow!("Invalid timing: {e}"))
}
