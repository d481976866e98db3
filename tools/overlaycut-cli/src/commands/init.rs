//! Create an edit document for a source video.

use std::path::PathBuf;

use overlaycut_project_model::document::{EditDocument, SourceVideo};
use overlaycut_project_model::job::{Dimensions, TrimRange};
use overlaycut_render_engine::ffmpeg::{probe_media, MediaInfo};

pub fn run(
    doc_path: PathBuf,
    source: PathBuf,
    duration: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
    trim_start: Option<f64>,
    trim_end: Option<f64>,
) -> anyhow::Result<()> {
    if doc_path.exists() {
        anyhow::bail!("Document already exists: {}", doc_path.display());
    }

    let probed = match probe_media(&source) {
        Ok(info) => Some(info),
        Err(e) if duration.is_some() && width.is_some() && height.is_some() => {
            tracing::warn!(error = %e, "Probe failed, using the given source metadata");
            None
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to probe {}: {e}", source.display())),
    };

    let info = probed.unwrap_or(MediaInfo {
        width: width.unwrap_or_default(),
        height: height.unwrap_or_default(),
        duration_secs: duration.unwrap_or_default(),
        fps: None,
        has_audio: false,
    });

    let source_path = source.canonicalize().unwrap_or(source);
    let name = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_string());

    let mut doc = EditDocument::new(
        name,
        SourceVideo {
            path: source_path,
            duration_secs: duration.unwrap_or(info.duration_secs),
            width: info.width,
            height: info.height,
            fps: info.fps,
        },
    )
    .map_err(|e| anyhow::anyhow!("Failed to create document: {e}"))?;

    doc.display = Dimensions::new(
        width.unwrap_or(info.width),
        height.unwrap_or(info.height),
    );
    let duration = doc.source.duration_secs;
    doc.trim = TrimRange::new(
        trim_start.unwrap_or(0.0),
        trim_end.unwrap_or(duration),
        duration,
    )?;
    doc.validate()?;
    doc.save(&doc_path)?;

    println!("Document created: {}", doc_path.display());
    println!("  Source: {}", doc.source.path.display());
    println!("  Duration: {:.3}s", duration);
    println!("  Trim: [{:.3}, {:.3}]", doc.trim.start, doc.trim.end);
    println!("  Preview: {}x{}", doc.display.width, doc.display.height);

    Ok(())
}
