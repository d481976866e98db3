//! Export configuration and job management.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use overlaycut_common::clock::frames_for_duration;
use overlaycut_common::config::ExportDefaults;
use overlaycut_common::error::{ErrorKind, OverlayError, OverlayResult};
use overlaycut_project_model::job::{Dimensions, ExportJob};
use overlaycut_project_model::layer::Layer;

use crate::backend::{run_graph, StreamingExport};
use crate::compositor::FrameCompositor;
use crate::ffmpeg::{probe_media, MediaInfo};
use crate::mapping::{round_even, SpaceMapping};
use crate::media::{EncoderSink, FfmpegEncoder, FfmpegPlayback, PlaybackSource};
use crate::router::{resolve_route, ExportRoute, ExportStrategy, RuntimeCapabilities};
use crate::text::TextRasterizer;

/// Resolved export parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub fps: u32,
    pub loop_buffer_frames: u32,
    pub watchdog_buffer_secs: f64,
    pub text_padding_px: u32,
    pub display_refresh_hz: u32,
    pub video_codec: String,
    pub crf: u32,
    pub preset: String,
    pub default_font_family: String,
    pub scratch_dir: PathBuf,
}

impl From<&ExportDefaults> for ExportSettings {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            fps: defaults.fps.max(1),
            loop_buffer_frames: defaults.loop_buffer_frames,
            watchdog_buffer_secs: defaults.watchdog_buffer_secs,
            text_padding_px: defaults.text_padding_px,
            display_refresh_hz: defaults.display_refresh_hz.max(1),
            video_codec: defaults.video_codec.clone(),
            crf: defaults.crf,
            preset: defaults.preset.clone(),
            default_font_family: defaults.default_font_family.clone(),
            scratch_dir: defaults.scratch_dir(),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from(&ExportDefaults::default())
    }
}

impl ExportSettings {
    /// Video encoder arguments for ffmpeg.
    pub fn codec_args(&self) -> Vec<String> {
        let codec = self.video_codec.as_str();
        let mut args = vec!["-c:v".to_string(), codec.to_string()];
        match codec {
            "libx264" | "libx265" => args.extend([
                "-preset".to_string(),
                self.preset.clone(),
                "-crf".to_string(),
                self.crf.to_string(),
            ]),
            "libvpx-vp9" => args.extend([
                "-crf".to_string(),
                self.crf.to_string(),
                "-b:v".to_string(),
                "0".to_string(),
            ]),
            _ => {}
        }
        args.extend([
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]);
        args
    }
}

/// Progress callback for export rendering.
pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Fraction done in `[0.0, 1.0]`; `None` while indeterminate.
    pub progress: Option<f64>,

    /// Current stage.
    pub stage: ExportStage,

    /// Diagnostic line from the engine, if any.
    pub message: Option<String>,
}

impl ExportProgress {
    pub fn stage(stage: ExportStage) -> Self {
        Self {
            progress: match stage {
                ExportStage::Complete => Some(1.0),
                _ => None,
            },
            stage,
            message: None,
        }
    }

    pub fn message(stage: ExportStage, message: impl Into<String>) -> Self {
        Self {
            progress: None,
            stage,
            message: Some(message.into()),
        }
    }
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    Encoding,
    Finalizing,
    Complete,
    Failed,
}

/// Everything one export run needs.
#[derive(Clone)]
pub struct ExportRequest {
    pub job: ExportJob,
    /// Output size. Probed from the source when `None`.
    pub encode_dimensions: Option<Dimensions>,
    pub capabilities: RuntimeCapabilities,
    pub strategy: ExportStrategy,
    pub settings: ExportSettings,
    pub cancel: Arc<AtomicBool>,
}

impl ExportRequest {
    pub fn new(job: ExportJob, capabilities: RuntimeCapabilities, settings: ExportSettings) -> Self {
        Self {
            job,
            encode_dimensions: None,
            capabilities,
            strategy: ExportStrategy::Auto,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_encode_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.encode_dimensions = Some(dimensions);
        self
    }

    pub fn with_strategy(mut self, strategy: ExportStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Trim-only fallback: the same request with every layer dropped.
    pub fn without_overlays(mut self) -> Self {
        self.job = self.job.without_layers();
        self
    }

    /// Layers that overlap the trim window, in z-order.
    pub fn layers_in_trim(&self) -> Vec<Arc<Layer>> {
        self.job.layers_in_trim().cloned().collect()
    }

    /// The backend this request would run on.
    pub fn route(&self) -> ExportRoute {
        resolve_route(&self.layers_in_trim(), &self.capabilities, self.strategy)
    }
}

/// A finished export.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// Encoded container bytes.
    pub bytes: Vec<u8>,
    pub route: ExportRoute,
    /// Frames in the output (nominal for the graph backend).
    pub frames: u64,
}

/// A failed export, classified for the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ExportFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<OverlayError> for ExportFailure {
    fn from(err: OverlayError) -> Self {
        Self {
            kind: err.kind(),
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

/// Export a trimmed, overlay-composited video.
///
/// This is the main entry point for rendering. Any backend error is
/// reported once through `progress` and returned as an
/// [`ExportFailure`].
pub async fn export(
    request: ExportRequest,
    progress: Option<ProgressCallback>,
) -> Result<ExportOutput, ExportFailure> {
    let started = std::time::Instant::now();
    tracing::info!(
        source = %request.job.video_source.display(),
        trim_start = request.job.trim.start,
        trim_end = request.job.trim.end,
        layers = request.job.layers.len(),
        strategy = ?request.strategy,
        "Starting export"
    );

    report(&progress, ExportProgress::stage(ExportStage::Preparing));

    match run_export(request, progress.as_ref()).await {
        Ok(output) => {
            tracing::info!(
                route = output.route.as_str(),
                frames = output.frames,
                bytes = output.bytes.len(),
                elapsed_secs = started.elapsed().as_secs_f64(),
                "Export finished"
            );
            report(&progress, ExportProgress::stage(ExportStage::Complete));
            Ok(output)
        }
        Err(err) => {
            let failure = ExportFailure::from(err);
            tracing::error!(
                kind = ?failure.kind,
                retryable = failure.retryable,
                error = %failure.message,
                "Export failed"
            );
            report(
                &progress,
                ExportProgress::message(ExportStage::Failed, failure.message.clone()),
            );
            Err(failure)
        }
    }
}

fn report(progress: &Option<ProgressCallback>, update: ExportProgress) {
    if let Some(cb) = progress {
        cb(update);
    }
}

async fn run_export(
    request: ExportRequest,
    progress: Option<&ProgressCallback>,
) -> OverlayResult<ExportOutput> {
    let ExportRequest {
        job,
        encode_dimensions,
        capabilities,
        strategy,
        settings,
        cancel,
    } = request;

    let layers: Vec<Arc<Layer>> = job.layers_in_trim().cloned().collect();
    let route = resolve_route(&layers, &capabilities, strategy);
    tracing::info!(route = route.as_str(), layers = layers.len(), ?capabilities, "Export routed");

    if route == ExportRoute::Unsupported {
        return Err(unsupported(layers.len()));
    }
    if route == ExportRoute::GraphBased && !capabilities.has_transcoder {
        return Err(OverlayError::unsupported(
            "Trim export needs a filter-graph transcoder (ffmpeg), which this runtime lacks",
        ));
    }

    // The streaming decoder needs the native frame size; the graph path
    // only needs it when no output size was given.
    let media = if route == ExportRoute::Streaming || encode_dimensions.is_none() {
        Some(probe_media(&job.video_source)?)
    } else {
        None
    };
    let encode = resolve_encode_dimensions(encode_dimensions, media.as_ref())?;
    let compositor = FrameCompositor::new(
        SpaceMapping::new(job.display, encode),
        TextRasterizer::new(settings.default_font_family.clone(), settings.text_padding_px),
    );

    match route {
        ExportRoute::GraphBased => {
            let frames = frames_for_duration(job.export_duration(), settings.fps);
            let progress = progress.cloned();
            let bytes = tokio::task::spawn_blocking(move || {
                let mut compositor = compositor;
                run_graph(&job, &layers, &mut compositor, &settings, &cancel, progress.as_ref())
            })
            .await
            .map_err(|e| OverlayError::engine(format!("Graph export task failed: {e}")))??;
            Ok(ExportOutput {
                bytes,
                route,
                frames,
            })
        }
        ExportRoute::Streaming => {
            let native = media
                .map(|m| Dimensions::new(m.width, m.height))
                .ok_or_else(|| OverlayError::resource("Source dimensions unknown"))?;
            let source = FfmpegPlayback::new(job.video_source.clone(), native, settings.fps);
            let output = settings
                .scratch_dir
                .join(format!("stream-{}.mp4", std::process::id()));
            let sink = FfmpegEncoder::new(&job.video_source, job.trim, settings.clone(), output);
            let (bytes, frames) =
                run_streaming(&job, layers, compositor, &settings, source, sink, cancel, progress)
                    .await?;
            Ok(ExportOutput {
                bytes,
                route,
                frames,
            })
        }
        ExportRoute::Unsupported => Err(unsupported(layers.len())),
    }
}

fn unsupported(layer_count: usize) -> OverlayError {
    OverlayError::unsupported(format!(
        "{layer_count} overlay layer(s) need frame-level codec access, which this runtime lacks; \
         retry as a trim-only export without overlays"
    ))
}

/// Run the streaming backend with caller-supplied playback and encoder.
///
/// Returns the encoded bytes and the number of frames submitted.
#[allow(clippy::too_many_arguments)]
pub async fn run_streaming<P: PlaybackSource, S: EncoderSink>(
    job: &ExportJob,
    layers: Vec<Arc<Layer>>,
    compositor: FrameCompositor,
    settings: &ExportSettings,
    source: P,
    sink: S,
    cancel: Arc<AtomicBool>,
    progress: Option<&ProgressCallback>,
) -> OverlayResult<(Vec<u8>, u64)> {
    StreamingExport::new(source, sink, compositor, layers, job.trim, settings, cancel)
        .run(settings.display_refresh_hz, progress)
        .await
}

fn resolve_encode_dimensions(
    requested: Option<Dimensions>,
    media: Option<&MediaInfo>,
) -> OverlayResult<Dimensions> {
    let raw = match (requested, media) {
        (Some(dims), _) => dims,
        (None, Some(info)) => Dimensions::new(info.width, info.height),
        (None, None) => return Err(OverlayError::config("Encode dimensions unknown")),
    };
    if raw.is_empty() {
        return Err(OverlayError::config(format!(
            "Invalid encode dimensions {}x{}",
            raw.width, raw.height
        )));
    }
    Ok(Dimensions::new(
        round_even(raw.width as f64),
        round_even(raw.height as f64),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlaycut_project_model::job::TrimRange;
    use overlaycut_project_model::layer::{TextStyle, Timing};
    use overlaycut_project_model::store::LayerSnapshot;
    use std::sync::Mutex;

    fn job(layers: Vec<Layer>) -> ExportJob {
        ExportJob::new(
            "/nonexistent/source.mp4",
            10.0,
            TrimRange::new(2.0, 7.0, 10.0).unwrap(),
            LayerSnapshot::from_layers(layers),
            Dimensions::new(400, 225),
        )
        .unwrap()
    }

    fn text_layer(start: f64, end: f64) -> Layer {
        Layer::text(
            "Hello",
            TextStyle::default(),
            10.0,
            10.0,
            Timing::new(start, end).unwrap(),
        )
    }

    #[test]
    fn test_settings_from_defaults() {
        let settings = ExportSettings::default();
        assert_eq!(settings.fps, 30);
        assert_eq!(settings.loop_buffer_frames, 10);
        assert_eq!(settings.display_refresh_hz, 60);
        let args = settings.codec_args().join(" ");
        assert!(args.starts_with("-c:v libx264 -preset veryfast -crf 20"));
        assert!(args.contains("-pix_fmt yuv420p"));
    }

    #[test]
    fn test_unknown_codec_gets_no_rate_control_args() {
        let settings = ExportSettings {
            video_codec: "mpeg4".to_string(),
            ..ExportSettings::default()
        };
        assert!(!settings.codec_args().contains(&"-crf".to_string()));
    }

    #[test]
    fn test_failure_classification() {
        let failure = ExportFailure::from(OverlayError::engine("ffmpeg exited 1"));
        assert_eq!(failure.kind, ErrorKind::Engine);
        assert!(failure.retryable);

        let failure = ExportFailure::from(OverlayError::unsupported("no codec access"));
        assert_eq!(failure.kind, ErrorKind::Configuration);
        assert!(!failure.retryable);
    }

    #[test]
    fn test_encode_dimensions_are_even() {
        let dims = resolve_encode_dimensions(Some(Dimensions::new(1919, 1081)), None).unwrap();
        assert_eq!(dims, Dimensions::new(1920, 1082));
        assert!(resolve_encode_dimensions(Some(Dimensions::new(0, 10)), None).is_err());
        assert!(resolve_encode_dimensions(None, None).is_err());
    }

    #[test]
    fn test_request_route_ignores_layers_outside_trim() {
        let caps = RuntimeCapabilities {
            has_frame_codec_access: false,
            has_transcoder: true,
        };
        let outside = ExportRequest::new(job(vec![text_layer(8.0, 9.0)]), caps, ExportSettings::default());
        assert_eq!(outside.route(), ExportRoute::GraphBased);

        let inside = ExportRequest::new(job(vec![text_layer(0.0, 10.0)]), caps, ExportSettings::default());
        assert_eq!(inside.route(), ExportRoute::Unsupported);
        assert_eq!(inside.without_overlays().route(), ExportRoute::GraphBased);
    }

    #[tokio::test]
    async fn test_unsupported_export_fails_before_engine_work() {
        let caps = RuntimeCapabilities::default();
        let request = ExportRequest::new(job(vec![text_layer(0.0, 10.0)]), caps, ExportSettings::default());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressCallback = Arc::new(move |p: ExportProgress| {
            sink.lock().unwrap().push(p.stage);
        });

        let failure = export(request, Some(progress)).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Configuration);
        assert!(!failure.retryable);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ExportStage::Preparing, ExportStage::Failed]
        );
    }

    #[tokio::test]
    async fn test_trim_only_export_without_transcoder_fails_before_engine_work() {
        let scratch = std::env::temp_dir().join("overlaycut_test_no_transcoder");
        std::fs::remove_dir_all(&scratch).ok();
        let settings = ExportSettings {
            scratch_dir: scratch.clone(),
            ..ExportSettings::default()
        };
        let request = ExportRequest::new(job(vec![]), RuntimeCapabilities::default(), settings)
            .with_encode_dimensions(Dimensions::new(1280, 720));
        assert_eq!(request.route(), ExportRoute::GraphBased);

        let failure = export(request, None).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Configuration);
        assert!(!failure.retryable);
        assert!(failure.message.contains("transcoder"));
        assert!(!scratch.exists());
    }

    #[test]
    fn test_unsupported_message_offers_trim_only_fallback() {
        let err = unsupported(2);
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("trim-only"));
    }
}
