//! Graph-based export backend.
//!
//! Pre-renders every layer that overlaps the trim window to a PNG still,
//! then runs one ffmpeg invocation whose filter graph loops, places and
//! time-gates those stills over the trimmed source.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use image::ImageFormat;

use overlaycut_common::error::{OverlayError, OverlayResult};
use overlaycut_project_model::job::ExportJob;
use overlaycut_project_model::layer::Layer;

use crate::compositor::FrameCompositor;
use crate::export::{ExportSettings, ProgressCallback};
use crate::ffmpeg::run_ffmpeg;
use crate::filter_graph::{build_ffmpeg_args, GraphOverlay};

/// Write a PNG still for each usable layer into `dir`, in z-order.
///
/// Layers whose asset cannot be loaded are skipped.
pub fn render_stills(
    compositor: &mut FrameCompositor,
    layers: &[Arc<Layer>],
    dir: &Path,
) -> OverlayResult<Vec<GraphOverlay>> {
    let mut overlays = Vec::with_capacity(layers.len());
    for (i, layer) in layers.iter().enumerate() {
        let Some(prepared) = compositor.prepared_layer(layer) else {
            continue;
        };
        let still = dir.join(format!("overlay-{i:03}-{}.png", layer.id.short()));
        prepared
            .image
            .save_with_format(&still, ImageFormat::Png)
            .map_err(|e| {
                OverlayError::render(format!("Failed to write still {}: {e}", still.display()))
            })?;
        overlays.push(GraphOverlay {
            layer: layer.id,
            still,
            placement: prepared.placement,
            timing: layer.timing,
        });
    }
    Ok(overlays)
}

/// Scratch directory of one graph export run.
fn work_dir(settings: &ExportSettings) -> PathBuf {
    settings
        .scratch_dir
        .join(format!("graph-{}", std::process::id()))
}

/// Remove leftovers of an earlier run and recreate `dir`.
fn reset_dir(dir: &Path) -> OverlayResult<()> {
    if dir.exists() {
        tracing::debug!(dir = %dir.display(), "Removing stale export artifacts");
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Run a graph export and return the encoded bytes.
///
/// `layers` must already be filtered to the trim window.
pub fn run_graph(
    job: &ExportJob,
    layers: &[Arc<Layer>],
    compositor: &mut FrameCompositor,
    settings: &ExportSettings,
    cancel: &AtomicBool,
    progress: Option<&ProgressCallback>,
) -> OverlayResult<Vec<u8>> {
    let dir = work_dir(settings);
    reset_dir(&dir)?;

    let result = export_in_dir(job, layers, compositor, settings, cancel, progress, &dir);

    if let Err(err) = std::fs::remove_dir_all(&dir) {
        tracing::warn!(error = %err, dir = %dir.display(), "Failed to clean scratch directory");
    }
    result
}

fn export_in_dir(
    job: &ExportJob,
    layers: &[Arc<Layer>],
    compositor: &mut FrameCompositor,
    settings: &ExportSettings,
    cancel: &AtomicBool,
    progress: Option<&ProgressCallback>,
    dir: &Path,
) -> OverlayResult<Vec<u8>> {
    let overlays = render_stills(compositor, layers, dir)?;
    let output = dir.join("output.mp4");
    let args = build_ffmpeg_args(
        &job.video_source,
        &output,
        &overlays,
        &job.trim,
        compositor.mapping().encode(),
        settings,
    );
    tracing::info!(
        overlays = overlays.len(),
        trim_start = job.trim.start,
        duration = job.export_duration(),
        "Running graph export"
    );
    run_ffmpeg(&args, job.export_duration(), progress, cancel)?;
    Ok(std::fs::read(&output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SpaceMapping;
    use crate::text::TextRasterizer;
    use image::{Rgba, RgbaImage};
    use overlaycut_project_model::job::Dimensions;
    use overlaycut_project_model::layer::{PixelSource, Timing};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbaImage::from_pixel(w, h, Rgba([0, 255, 0, 255]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_render_stills_writes_pngs_and_skips_broken_layers() {
        let dir = std::env::temp_dir().join("overlaycut_test_graph_stills");
        reset_dir(&dir).unwrap();

        let mapping = SpaceMapping::new(Dimensions::new(100, 100), Dimensions::new(200, 200));
        let mut compositor = FrameCompositor::new(mapping, TextRasterizer::new("sans-serif", 0));
        let timing = Timing::new(0.0, 1.0).unwrap();
        let layers = vec![
            Arc::new(Layer::raster(
                PixelSource::Encoded { data: png(8, 4) },
                8.0,
                4.0,
                0.0,
                0.0,
                timing,
            )),
            Arc::new(Layer::raster(
                PixelSource::Encoded {
                    data: vec![0, 1, 2],
                },
                8.0,
                4.0,
                0.0,
                0.0,
                timing,
            )),
        ];

        let overlays = render_stills(&mut compositor, &layers, &dir).unwrap();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].layer, layers[0].id);
        assert!(overlays[0].still.exists());
        // Stills keep their source size; the graph scales them.
        let still = image::open(&overlays[0].still).unwrap();
        assert_eq!((still.width(), still.height()), (8, 4));
        assert_eq!(overlays[0].placement.width, 16.0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_reset_dir_removes_stale_files() {
        let dir = std::env::temp_dir().join("overlaycut_test_graph_reset");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("output.mp4"), b"stale").unwrap();

        reset_dir(&dir).unwrap();
        assert!(dir.exists());
        assert!(!dir.join("output.mp4").exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
