//! Export a document to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use overlaycut_common::config::AppConfig;
use overlaycut_common::error::ErrorKind;
use overlaycut_project_model::job::Dimensions;
use overlaycut_render_engine::{
    export, ExportFailure, ExportProgress, ExportRequest, ExportSettings, ExportStrategy, ProgressCallback,
    RuntimeCapabilities,
};

use super::load_document;

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: &AppConfig,
    doc_path: PathBuf,
    output: PathBuf,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    strategy: String,
    no_overlays: bool,
) -> anyhow::Result<()> {
    let doc = load_document(&doc_path)?;
    let job = doc.to_job(&doc_path)?;

    let strategy = match strategy.as_str() {
        "auto" => ExportStrategy::Auto,
        "graph" => ExportStrategy::Graph,
        "streaming" => ExportStrategy::Streaming,
        _ => {
            return Err(anyhow::anyhow!(
                "Unknown strategy: {strategy}. Use: auto, graph, streaming"
            ));
        }
    };

    let mut settings = ExportSettings::from(&config.export);
    if let Some(fps) = fps {
        settings.fps = fps.max(1);
    }

    let mut request = ExportRequest::new(job, RuntimeCapabilities::detect(), settings)
        .with_strategy(strategy);
    match (width, height) {
        (Some(w), Some(h)) => request = request.with_encode_dimensions(Dimensions::new(w, h)),
        (None, None) => {}
        _ => anyhow::bail!("--width and --height must be given together"),
    }
    if no_overlays {
        request = request.without_overlays();
    }

    println!("Exporting {}", doc_path.display());
    println!("  Output: {}", output.display());
    println!(
        "  Trim: [{:.3}, {:.3}]",
        request.job.trim.start, request.job.trim.end
    );
    let layer_count = request.layers_in_trim().len();
    println!("  Layers in trim: {layer_count}");
    println!("  Route: {}", request.route().as_str());

    let cancel = Arc::clone(&request.cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let progress: ProgressCallback = Arc::new(|p: ExportProgress| {
        match (p.progress, &p.message) {
            (_, Some(message)) => print!("\r  {:?}: {message}  ", p.stage),
            (Some(fraction), None) => print!("\r  {:?}: {:.1}%  ", p.stage, fraction * 100.0),
            (None, None) => print!("\r  {:?}  ", p.stage),
        }
        std::io::stdout().flush().ok();
    });

    match export(request, Some(progress)).await {
        Ok(result) => {
            std::fs::write(&output, &result.bytes)?;
            println!(
                "\nExport complete: {} ({} frames, {} bytes, {} backend)",
                output.display(),
                result.frames,
                result.bytes.len(),
                result.route.as_str()
            );
            Ok(())
        }
        Err(failure) => {
            println!();
            if let Some(hint) = failure_hint(&failure, layer_count) {
                println!("{hint}");
            }
            Err(anyhow::anyhow!("Export failed ({:?}): {failure}", failure.kind))
        }
    }
}

/// What the user can do about a failed export.
fn failure_hint(failure: &ExportFailure, layer_count: usize) -> Option<&'static str> {
    if failure.retryable {
        Some("The export may succeed if retried.")
    } else if failure.kind == ErrorKind::Configuration && layer_count > 0 {
        Some("Re-run with --no-overlays to export the trim only.")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(kind: ErrorKind, retryable: bool) -> ExportFailure {
        ExportFailure {
            kind,
            message: "failed".to_string(),
            retryable,
        }
    }

    #[test]
    fn test_unsupported_overlays_suggest_trim_only_flag() {
        let hint = failure_hint(&failure(ErrorKind::Configuration, false), 2);
        assert_eq!(hint, Some("Re-run with --no-overlays to export the trim only."));
    }

    #[test]
    fn test_trim_only_failure_does_not_suggest_dropping_overlays() {
        assert_eq!(failure_hint(&failure(ErrorKind::Configuration, false), 0), None);
        assert_eq!(
            failure_hint(&failure(ErrorKind::Engine, true), 2),
            Some("The export may succeed if retried.")
        );
    }
}
