//! ffmpeg/ffprobe process plumbing.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use overlaycut_common::error::{OverlayError, OverlayResult};

use crate::export::{ExportProgress, ExportStage, ProgressCallback};

/// Longest an abort waits for a running ffmpeg to be noticed.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Probed properties of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    /// Average frame rate, when the container reports one.
    pub fps: Option<f64>,
    pub has_audio: bool,
}

/// Probe a media file with ffprobe.
pub fn probe_media(path: &Path) -> OverlayResult<MediaInfo> {
    if !path.exists() {
        return Err(OverlayError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type,width,height,avg_frame_rate:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| OverlayError::resource(format!("Failed to start ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(OverlayError::resource(format!(
            "ffprobe failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
    tracing::debug!(path = %path.display(), ?info, "Probed media");
    Ok(info)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse `ffprobe -of json` output.
pub fn parse_probe_output(json: &str) -> OverlayResult<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| OverlayError::resource("No video stream found"))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(OverlayError::resource("Video stream has no dimensions")),
    };

    let duration_secs = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| OverlayError::resource("Media reports no duration"))?;

    let fps = video.avg_frame_rate.as_deref().and_then(parse_rational);
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(MediaInfo {
        width,
        height,
        duration_secs,
        fps,
        has_audio,
    })
}

/// `"30000/1001"` → 29.97. Zero denominators and zero rates are `None`.
fn parse_rational(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let den = den.parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num.parse::<f64>().ok()? / den
        }
        None => value.parse::<f64>().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Latest values from ffmpeg's `-progress` key/value stream.
#[derive(Debug, Default)]
pub(crate) struct ProgressState {
    pub out_time_secs: f64,
    pub complete: bool,
}

impl ProgressState {
    pub fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, ffmpeg reports out_time_ms in microseconds.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    /// Fraction of `expected_duration_secs` encoded so far. `None` when
    /// no duration is known.
    pub fn fraction(&self, expected_duration_secs: f64) -> Option<f64> {
        if self.complete {
            return Some(1.0);
        }
        if expected_duration_secs <= 0.0 {
            return None;
        }
        Some((self.out_time_secs / expected_duration_secs).clamp(0.0, 1.0))
    }
}

/// Collect a child's stderr on a thread so the child never blocks on a
/// full pipe.
pub(crate) fn drain_stderr<R: Read + Send + 'static>(stderr: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    })
}

/// Forward lines of `reader` over a channel from a reader thread.
///
/// The channel disconnects at end of stream.
pub(crate) fn spawn_line_reader<R: Read + Send + 'static>(
    reader: R,
) -> (Receiver<String>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let handle = std::thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Failed reading ffmpeg progress");
                    break;
                }
            }
        }
    });
    (rx, handle)
}

/// How following a progress stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    /// The writer closed the stream.
    Closed,
    /// `cancel` was raised.
    Cancelled,
}

/// Hand each line to `on_line` until the stream closes or `cancel` is
/// raised. `cancel` is checked at least every `poll`, with or without
/// output.
pub(crate) fn follow_lines(
    lines: &Receiver<String>,
    cancel: &AtomicBool,
    poll: Duration,
    mut on_line: impl FnMut(&str),
) -> StreamEnd {
    loop {
        if cancel.load(Ordering::SeqCst) {
            return StreamEnd::Cancelled;
        }
        match lines.recv_timeout(poll) {
            Ok(line) => on_line(&line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return StreamEnd::Closed,
        }
    }
}

/// Run ffmpeg to completion, reporting `-progress` output.
///
/// `args` must include `-progress pipe:1`. The child is killed as soon
/// as `cancel` is raised, whether or not it is writing progress.
pub(crate) fn run_ffmpeg(
    args: &[String],
    expected_duration_secs: f64,
    progress: Option<&ProgressCallback>,
    cancel: &AtomicBool,
) -> OverlayResult<()> {
    tracing::debug!(?args, "Running ffmpeg");
    let mut cmd = Command::new("ffmpeg");
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| OverlayError::engine(format!("Failed to start ffmpeg: {e}")))?;

    tracing::info!(
        pid = child.id(),
        args_len = args.len(),
        expected_duration_secs,
        "ffmpeg process started"
    );

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| OverlayError::engine("Failed to capture ffmpeg stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| OverlayError::engine("Failed to capture ffmpeg stderr"))?;

    let stderr_task = drain_stderr(stderr);
    let (lines, stdout_task) = spawn_line_reader(stdout);

    let mut state = ProgressState::default();
    let end = follow_lines(&lines, cancel, CANCEL_POLL, |line| {
        let Some((key, value)) = line.trim().split_once('=') else {
            return;
        };
        state.update(key, value);
        if key == "progress" {
            if let Some(cb) = progress {
                cb(ExportProgress {
                    progress: state.fraction(expected_duration_secs),
                    stage: if state.complete {
                        ExportStage::Finalizing
                    } else {
                        ExportStage::Encoding
                    },
                    message: None,
                });
            }
        }
    });

    if end == StreamEnd::Cancelled {
        tracing::info!(pid = child.id(), "Abort requested, killing ffmpeg");
        if let Err(err) = child.kill() {
            tracing::warn!(error = %err, "Failed to kill ffmpeg");
        }
    }

    let status = child
        .wait()
        .map_err(|e| OverlayError::engine(format!("Failed to wait on ffmpeg: {e}")))?;

    drop(lines);
    if stdout_task.join().is_err() {
        tracing::warn!("ffmpeg progress reader panicked");
    }
    let stderr_output = stderr_task
        .join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

    if end == StreamEnd::Cancelled {
        return Err(OverlayError::Aborted);
    }

    if !status.success() {
        if let Some(cb) = progress {
            let tail: Vec<&str> = stderr_output.lines().rev().take(5).collect();
            for diagnostic in tail.into_iter().rev() {
                cb(ExportProgress::message(ExportStage::Failed, diagnostic));
            }
        }
        return Err(OverlayError::engine(format!(
            "ffmpeg export failed (status {}): {}",
            status,
            stderr_output.trim()
        )));
    }

    tracing::info!(
        elapsed_secs = start.elapsed().as_secs_f64(),
        out_time_secs = state.out_time_secs,
        "ffmpeg finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    #[test]
    fn test_progress_state_parses_microseconds() {
        let mut state = ProgressState::default();
        state.update("out_time_us", "2500000");
        assert_eq!(state.out_time_secs, 2.5);
        assert_eq!(state.fraction(5.0), Some(0.5));

        state.update("out_time_ms", "5000000");
        assert_eq!(state.fraction(5.0), Some(1.0));
    }

    #[test]
    fn test_progress_state_end_marks_complete() {
        let mut state = ProgressState::default();
        state.update("progress", "continue");
        assert!(!state.complete);
        state.update("progress", "end");
        assert!(state.complete);
        assert_eq!(state.fraction(0.0), Some(1.0));
    }

    #[test]
    fn test_progress_without_duration_is_indeterminate() {
        let state = ProgressState::default();
        assert_eq!(state.fraction(0.0), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "30000/1001"},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "10.010000"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.duration_secs - 10.01).abs() < 1e-9);
        assert!((info.fps.unwrap() - 29.97).abs() < 0.01);
        assert!(info.has_audio);
    }

    #[test]
    fn test_parse_probe_output_without_video_fails() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        assert!(parse_probe_output(json).is_err());
    }

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("30/1"), Some(30.0));
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("25"), Some(25.0));
    }

    #[test]
    fn test_follow_lines_cancels_while_writer_is_silent() {
        let (_tx, rx) = mpsc::channel::<String>();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let raiser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let end = follow_lines(&rx, &cancel, Duration::from_millis(10), |_| {});
        raiser.join().unwrap();

        assert_eq!(end, StreamEnd::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_follow_lines_reads_until_stream_closes() {
        let (rx, reader) =
            spawn_line_reader(Cursor::new("out_time_us=1000000\nprogress=continue\n"));
        let cancel = AtomicBool::new(false);
        let mut seen = Vec::new();

        let end = follow_lines(&rx, &cancel, Duration::from_millis(10), |line| {
            seen.push(line.to_string());
        });
        reader.join().unwrap();

        assert_eq!(end, StreamEnd::Closed);
        assert_eq!(seen, vec!["out_time_us=1000000", "progress=continue"]);
    }

    #[test]
    fn test_drain_stderr_collects_more_than_a_pipe_buffer() {
        let noisy = "frame dropped\n".repeat(20_000);
        let drained = drain_stderr(Cursor::new(noisy.clone())).join().unwrap();
        assert_eq!(drained.len(), noisy.len());
    }
}
