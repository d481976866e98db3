//! Streaming export backend.
//!
//! Plays the source in real time from the trim start, composites the
//! active overlays onto every frame and feeds the result to an encoder
//! sink. The capture is an explicit state machine advanced by
//! [`StreamingExport::tick`]:
//!
//! ```text
//! Idle ─▶ Seeking ─▶ Recording ─┬─▶ Rendering ─▶ Encoding ─┐
//!                        ▲      │                          │
//!                        └──────┼──────────────────────────┘
//!                               ▼
//!                           Stopping ─▶ Complete | Aborted | Failed
//! ```
//!
//! Abort and the watchdog are checked at the start of every tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::time::MissedTickBehavior;

use overlaycut_common::clock::{frames_for_duration, ExportClock, Watchdog};
use overlaycut_common::error::{OverlayError, OverlayResult};
use overlaycut_project_model::job::{Dimensions, TrimRange};
use overlaycut_project_model::layer::Layer;

use crate::compositor::FrameCompositor;
use crate::export::{ExportProgress, ExportSettings, ExportStage, ProgressCallback};
use crate::media::{EncoderSink, PlaybackSource};

/// Capture state.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Seeking,
    Recording,
    Rendering,
    Encoding,
    Stopping,
    Complete,
    Aborted,
    Failed(String),
}

impl CaptureState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Aborted | Self::Failed(_))
    }
}

/// Why recording stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Playback reached the trim end.
    Finished,
    /// The watchdog deadline passed first.
    Watchdog,
    Aborted,
}

/// One streaming export run.
pub struct StreamingExport<P: PlaybackSource, S: EncoderSink> {
    source: P,
    sink: S,
    compositor: FrameCompositor,
    layers: Vec<Arc<Layer>>,
    trim: TrimRange,
    encode: Dimensions,
    fps: u32,
    watchdog: Watchdog,
    cancel: Arc<AtomicBool>,
    state: CaptureState,
    stop_reason: Option<StopReason>,
    frames: u64,
    last_frame: Option<RgbaImage>,
    output: Option<Vec<u8>>,
}

impl<P: PlaybackSource, S: EncoderSink> StreamingExport<P, S> {
    pub fn new(
        source: P,
        sink: S,
        mut compositor: FrameCompositor,
        layers: Vec<Arc<Layer>>,
        trim: TrimRange,
        settings: &ExportSettings,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        compositor.prepare(&layers);
        let encode = compositor.mapping().encode();
        Self {
            source,
            sink,
            compositor,
            layers,
            trim,
            encode,
            fps: settings.fps.max(1),
            watchdog: Watchdog::for_export(trim.duration(), settings.watchdog_buffer_secs),
            cancel,
            state: CaptureState::Idle,
            stop_reason: None,
            frames: 0,
            last_frame: None,
            output: None,
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Frames submitted to the sink so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames a complete run produces.
    pub fn expected_frames(&self) -> u64 {
        frames_for_duration(self.trim.duration(), self.fps)
    }

    /// The encoded artifact, once `Complete`.
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.output.take()
    }

    /// Advance the state machine. `elapsed_secs` is wall time since the
    /// run started, used for the watchdog.
    pub fn tick(&mut self, elapsed_secs: f64) -> &CaptureState {
        if self.state.is_terminal() {
            return &self.state;
        }

        if self.cancel.load(Ordering::SeqCst) {
            self.begin_stop(StopReason::Aborted);
        }

        let step = match self.state {
            CaptureState::Idle => {
                self.state = CaptureState::Seeking;
                self.source.seek(self.trim.start)
            }
            CaptureState::Seeking => self.start_recording(),
            CaptureState::Recording | CaptureState::Rendering | CaptureState::Encoding => {
                if self.watchdog.expired(elapsed_secs) {
                    tracing::warn!(
                        elapsed_secs,
                        deadline_secs = self.watchdog.deadline_secs(),
                        frames = self.frames,
                        "Watchdog expired, stopping capture"
                    );
                    self.begin_stop(StopReason::Watchdog);
                    Ok(())
                } else {
                    self.record_step()
                }
            }
            _ => Ok(()),
        };

        if let Err(err) = step {
            tracing::error!(error = %err, state = ?self.state, "Streaming export step failed");
            self.fail(err.to_string());
        }

        if self.state == CaptureState::Stopping {
            self.finalize();
        }
        &self.state
    }

    fn start_recording(&mut self) -> OverlayResult<()> {
        self.source.play()?;
        self.sink.start(self.encode, self.fps)?;
        self.state = CaptureState::Recording;
        tracing::info!(
            trim_start = self.trim.start,
            duration = self.trim.duration(),
            fps = self.fps,
            layers = self.layers.len(),
            "Recording started"
        );
        Ok(())
    }

    fn record_step(&mut self) -> OverlayResult<()> {
        let current = self.source.current_time();
        let export_time = self.trim.to_export_time(current);

        if export_time >= self.trim.duration() {
            self.pad_to_end()?;
            self.begin_stop(StopReason::Finished);
            return Ok(());
        }

        let Some(frame) = self.source.current_frame() else {
            // Nothing decoded yet.
            return Ok(());
        };

        // Emit every frame slot that playback has reached; skipped ticks
        // repeat the current frame so output duration stays exact.
        while self.slot_time(self.frames) <= export_time {
            self.state = CaptureState::Rendering;
            let t = self.trim.to_source_time(self.slot_time(self.frames));
            let composite = self.compositor.composite(&frame, t, &self.layers);

            self.state = CaptureState::Encoding;
            self.sink.submit(&composite.image)?;
            self.frames += 1;
        }
        self.last_frame = Some(frame);
        self.state = CaptureState::Recording;
        Ok(())
    }

    /// Fill slots between the last tick and the trim end with the last
    /// decoded frame.
    fn pad_to_end(&mut self) -> OverlayResult<()> {
        let Some(frame) = self.last_frame.take() else {
            return Ok(());
        };
        let total = self.expected_frames();
        while self.frames < total {
            let t = self.trim.to_source_time(self.slot_time(self.frames));
            let composite = self.compositor.composite(&frame, t, &self.layers);
            self.sink.submit(&composite.image)?;
            self.frames += 1;
        }
        Ok(())
    }

    fn slot_time(&self, index: u64) -> f64 {
        index as f64 / self.fps as f64
    }

    fn begin_stop(&mut self, reason: StopReason) {
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason);
        }
        self.state = CaptureState::Stopping;
    }

    fn fail(&mut self, message: String) {
        self.source.stop();
        self.sink.discard();
        self.state = CaptureState::Failed(message);
    }

    fn finalize(&mut self) {
        self.source.stop();

        if self.stop_reason == Some(StopReason::Aborted) {
            self.sink.discard();
            tracing::info!(frames = self.frames, "Capture aborted, partial output discarded");
            self.state = CaptureState::Aborted;
            return;
        }

        if self.frames == 0 {
            self.sink.discard();
            self.state = CaptureState::Failed("no data recorded".to_string());
            return;
        }

        match self.sink.finish() {
            Ok(bytes) => {
                tracing::info!(
                    frames = self.frames,
                    bytes = bytes.len(),
                    reason = ?self.stop_reason,
                    "Capture complete"
                );
                self.output = Some(bytes);
                self.state = CaptureState::Complete;
            }
            Err(err) => {
                self.state = CaptureState::Failed(err.to_string());
            }
        }
    }

    /// Drive the state machine at the display refresh rate until it
    /// reaches a terminal state.
    pub async fn run(
        mut self,
        refresh_hz: u32,
        progress: Option<&ProgressCallback>,
    ) -> OverlayResult<(Vec<u8>, u64)> {
        let clock = ExportClock::start();
        let period = Duration::from_secs_f64(1.0 / refresh_hz.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let total = self.expected_frames().max(1);

        loop {
            interval.tick().await;
            let state = self.tick(clock.elapsed_secs()).clone();
            if let Some(cb) = progress {
                if state == CaptureState::Recording {
                    cb(ExportProgress {
                        progress: Some((self.frames as f64 / total as f64).min(1.0)),
                        stage: ExportStage::Rendering,
                        message: None,
                    });
                }
            }
            match state {
                CaptureState::Complete => {
                    let frames = self.frames;
                    let bytes = self
                        .take_output()
                        .ok_or_else(|| OverlayError::engine("Capture completed without output"))?;
                    return Ok((bytes, frames));
                }
                CaptureState::Aborted => return Err(OverlayError::Aborted),
                CaptureState::Failed(message) => return Err(OverlayError::engine(message)),
                _ => {}
            }
        }
    }
}
