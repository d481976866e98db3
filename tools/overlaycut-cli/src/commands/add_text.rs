//! Add a text overlay to a document.

use std::path::PathBuf;

use overlaycut_project_model::layer::{Layer, Scale, TextStyle};

use super::{load_document, timing_for};

#[allow(clippy::too_many_arguments)]
pub fn run(
    doc_path: PathBuf,
    content: String,
    x: f64,
    y: f64,
    start: f64,
    end: Option<f64>,
    font_size: f64,
    color: String,
    font_family: String,
    scale: f64,
    rotation: f64,
) -> anyhow::Result<()> {
    let mut doc = load_document(&doc_path)?;
    let timing = timing_for(&doc, start, end)?;

    let style = TextStyle {
        font_size,
        color,
        font_family,
        ..TextStyle::default()
    };
    let mut layer = Layer::text(content.replace("\\n", "\n"), style, x, y, timing);
    layer.transform.scale = Scale::uniform(scale);
    layer.transform.rotation = rotation;

    let mut store = doc.to_store()?;
    let id = store.add(layer)?;
    doc.set_layers_from(&store);
    doc.save(&doc_path)?;

    println!(
        "Added text layer {} [{:.3}, {:.3}]",
        id.short(),
        timing.start,
        timing.end
    );
    Ok(())
}
