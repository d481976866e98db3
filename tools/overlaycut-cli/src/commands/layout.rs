//! Print the timeline rows of a document.

use std::path::PathBuf;
use std::sync::Arc;

use overlaycut_processing_core::layout;
use overlaycut_project_model::layer::Layer;

use super::load_document;

pub fn run(doc_path: PathBuf, json: bool) -> anyhow::Result<()> {
    let doc = load_document(&doc_path)?;
    let store = doc.to_store()?;
    let layers: Vec<Arc<Layer>> = store.all().cloned().collect();
    let timeline = layout(&layers, store.video_duration());

    if json {
        println!("{}", serde_json::to_string_pretty(timeline.rows())?);
        return Ok(());
    }

    println!("Timeline: {} ({:.3}s)", doc.name, store.video_duration());
    println!("{}", "=".repeat(50));
    for (index, row) in timeline.rows().iter().enumerate() {
        println!("Row {index}:");
        for placed in row {
            let label = store
                .get(placed.id)
                .map(|layer| layer.label())
                .unwrap_or_default();
            println!(
                "  [{:>8.3} - {:>8.3}] {} {}",
                placed.start,
                placed.end,
                placed.id.short(),
                label
            );
        }
    }
    if timeline.row_count() == 0 {
        println!("(no layers)");
    }
    Ok(())
}
