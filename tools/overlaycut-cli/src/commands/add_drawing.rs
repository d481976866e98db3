//! Add a drawing overlay to a document.

use std::path::PathBuf;

use overlaycut_project_model::layer::{Layer, PixelSource};

use super::{load_document, timing_for};

pub fn run(
    doc_path: PathBuf,
    png: PathBuf,
    x: f64,
    y: f64,
    start: f64,
    end: Option<f64>,
) -> anyhow::Result<()> {
    let mut doc = load_document(&doc_path)?;
    let timing = timing_for(&doc, start, end)?;

    let data = std::fs::read(&png)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", png.display()))?;
    let decoded = image::load_from_memory(&data)
        .map_err(|e| anyhow::anyhow!("Not a decodable image {}: {e}", png.display()))?;

    // The drawing is embedded so the document stays self-contained.
    let layer = Layer::raster(
        PixelSource::Encoded { data },
        decoded.width() as f64,
        decoded.height() as f64,
        x,
        y,
        timing,
    );

    let mut store = doc.to_store()?;
    let id = store.add(layer)?;
    doc.set_layers_from(&store);
    doc.save(&doc_path)?;

    println!(
        "Added drawing layer {} ({}x{}) [{:.3}, {:.3}]",
        id.short(),
        decoded.width(),
        decoded.height(),
        timing.start,
        timing.end
    );
    Ok(())
}
