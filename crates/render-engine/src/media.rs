//! Playback sources and encoder sinks for the streaming backend.
//!
//! The shipped implementations pipe raw RGBA frames through ffmpeg
//! child processes. Playback is paced on the wall clock, so exporting a
//! five second window takes about five seconds.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::RgbaImage;

use overlaycut_common::error::{OverlayError, OverlayResult};
use overlaycut_project_model::job::{Dimensions, TrimRange};

use crate::export::ExportSettings;
use crate::ffmpeg::drain_stderr;

/// A video that can be played from a position while frames are read.
pub trait PlaybackSource: Send {
    /// Position playback at `source_secs` without starting it.
    fn seek(&mut self, source_secs: f64) -> OverlayResult<()>;

    /// Start (or resume) playback from the sought position.
    fn play(&mut self) -> OverlayResult<()>;

    /// Current playback position in source seconds.
    fn current_time(&mut self) -> f64;

    /// The frame on screen at the current position, if one has been
    /// decoded yet.
    fn current_frame(&mut self) -> Option<RgbaImage>;

    fn stop(&mut self);
}

/// Consumes composited frames and produces the encoded artifact.
pub trait EncoderSink: Send {
    fn start(&mut self, dimensions: Dimensions, fps: u32) -> OverlayResult<()>;

    fn submit(&mut self, frame: &RgbaImage) -> OverlayResult<()>;

    /// Flush and return the encoded bytes.
    fn finish(&mut self) -> OverlayResult<Vec<u8>>;

    /// Drop everything written so far.
    fn discard(&mut self);
}

/// Latest frame published by the decode thread.
#[derive(Default)]
struct FrameSlot {
    frame: Option<RgbaImage>,
}

/// Decodes a source with ffmpeg and publishes frames in real time.
pub struct FfmpegPlayback {
    path: PathBuf,
    dimensions: Dimensions,
    fps: u32,
    position: f64,
    started_at: Option<Instant>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    slot: Arc<Mutex<FrameSlot>>,
    stop_flag: Arc<AtomicBool>,
}

impl FfmpegPlayback {
    /// `dimensions` is the source's native size; frames are decoded at
    /// that size.
    pub fn new(path: impl Into<PathBuf>, dimensions: Dimensions, fps: u32) -> Self {
        Self {
            path: path.into(),
            dimensions,
            fps: fps.max(1),
            position: 0.0,
            started_at: None,
            child: None,
            reader: None,
            slot: Arc::new(Mutex::new(FrameSlot::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl PlaybackSource for FfmpegPlayback {
    fn seek(&mut self, source_secs: f64) -> OverlayResult<()> {
        self.shutdown();
        self.position = source_secs.max(0.0);
        self.started_at = None;
        if let Ok(mut slot) = self.slot.lock() {
            *slot = FrameSlot::default();
        }
        Ok(())
    }

    fn play(&mut self) -> OverlayResult<()> {
        self.shutdown();
        self.stop_flag = Arc::new(AtomicBool::new(false));

        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-ss"])
            .arg(format!("{:.3}", self.position))
            .arg("-i")
            .arg(&self.path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgba", "-r"])
            .arg(self.fps.to_string())
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| OverlayError::engine(format!("Failed to start ffmpeg decoder: {e}")))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| OverlayError::engine("Failed to capture decoder stdout"))?;

        let (w, h) = (self.dimensions.width, self.dimensions.height);
        let frame_len = w as usize * h as usize * 4;
        let fps = self.fps as f64;
        let slot = Arc::clone(&self.slot);
        let stop = Arc::clone(&self.stop_flag);
        let started_at = Instant::now();

        let reader = std::thread::spawn(move || {
            let mut index: u64 = 0;
            loop {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let mut buf = vec![0u8; frame_len];
                if stdout.read_exact(&mut buf).is_err() {
                    break;
                }
                // Hold the frame until its presentation time.
                let due = Duration::from_secs_f64(index as f64 / fps);
                if let Some(wait) = due.checked_sub(started_at.elapsed()) {
                    std::thread::sleep(wait);
                }
                let Some(frame) = RgbaImage::from_raw(w, h, buf) else {
                    break;
                };
                if let Ok(mut slot) = slot.lock() {
                    slot.frame = Some(frame);
                }
                index += 1;
            }
        });

        tracing::debug!(
            path = %self.path.display(),
            position = self.position,
            pid = child.id(),
            "Playback started"
        );
        self.started_at = Some(started_at);
        self.child = Some(child);
        self.reader = Some(reader);
        Ok(())
    }

    fn current_time(&mut self) -> f64 {
        match self.started_at {
            Some(started) => self.position + started.elapsed().as_secs_f64(),
            None => self.position,
        }
    }

    fn current_frame(&mut self) -> Option<RgbaImage> {
        self.slot.lock().ok()?.frame.clone()
    }

    fn stop(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.position += started.elapsed().as_secs_f64();
        }
        self.shutdown();
    }
}

impl Drop for FfmpegPlayback {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Encodes raw RGBA frames with ffmpeg, muxing the source's audio for
/// the trim window.
pub struct FfmpegEncoder {
    audio_source: PathBuf,
    trim: TrimRange,
    settings: ExportSettings,
    output: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
}

impl FfmpegEncoder {
    pub fn new(audio_source: &Path, trim: TrimRange, settings: ExportSettings, output: PathBuf) -> Self {
        Self {
            audio_source: audio_source.to_path_buf(),
            trim,
            settings,
            output,
            child: None,
            stdin: None,
            stderr_task: None,
        }
    }

    /// Join the stderr drain thread and return what it collected.
    fn take_stderr(&mut self) -> String {
        self.stderr_task
            .take()
            .map(|task| {
                task.join()
                    .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
            })
            .unwrap_or_default()
    }

    fn remove_output(&self) {
        if self.output.exists() {
            if let Err(err) = std::fs::remove_file(&self.output) {
                tracing::warn!(error = %err, path = %self.output.display(), "Failed to remove encoder output");
            }
        }
    }
}

impl EncoderSink for FfmpegEncoder {
    fn start(&mut self, dimensions: Dimensions, fps: u32) -> OverlayResult<()> {
        if let Some(parent) = self.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.remove_output();

        let mut args: Vec<String> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-s".into(),
            format!("{}x{}", dimensions.width, dimensions.height),
            "-r".into(),
            fps.to_string(),
            "-i".into(),
            "pipe:0".into(),
            "-ss".into(),
            format!("{:.3}", self.trim.start),
            "-t".into(),
            format!("{:.3}", self.trim.duration()),
            "-i".into(),
            self.audio_source.display().to_string(),
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "1:a?".into(),
        ];
        args.extend(self.settings.codec_args());
        args.extend([
            "-c:a".into(),
            "copy".into(),
            "-shortest".into(),
            self.output.display().to_string(),
        ]);
        tracing::debug!(?args, "Starting ffmpeg encoder");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OverlayError::engine(format!("Failed to start ffmpeg encoder: {e}")))?;
        self.stdin = Some(
            child
                .stdin
                .take()
                .ok_or_else(|| OverlayError::engine("Failed to open encoder stdin"))?,
        );
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| OverlayError::engine("Failed to capture encoder stderr"))?;
        self.stderr_task = Some(drain_stderr(stderr));
        self.child = Some(child);
        Ok(())
    }

    fn submit(&mut self, frame: &RgbaImage) -> OverlayResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| OverlayError::engine("Encoder not started"))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| OverlayError::engine(format!("Encoder rejected frame: {e}")))
    }

    fn finish(&mut self) -> OverlayResult<Vec<u8>> {
        // Closing stdin signals end of stream.
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| OverlayError::engine("Encoder not started"))?;
        let status = child
            .wait()
            .map_err(|e| OverlayError::engine(format!("Failed to wait on encoder: {e}")))?;
        let stderr = self.take_stderr();
        if !status.success() {
            self.remove_output();
            return Err(OverlayError::engine(format!(
                "ffmpeg encoder failed (status {status}): {}",
                stderr.trim()
            )));
        }
        let bytes = std::fs::read(&self.output)?;
        self.remove_output();
        Ok(bytes)
    }

    fn discard(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.take_stderr();
        self.remove_output();
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.discard();
        }
    }
}
