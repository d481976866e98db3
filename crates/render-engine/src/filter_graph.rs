//! ffmpeg `filter_complex` synthesis for the graph-based backend.
//!
//! Every overlay still is looped a finite number of frames, scaled,
//! optionally rotated and overlaid on the running video label inside an
//! `enable` window. All bounds are finite: an infinite loop count
//! (`loop=-1`) keeps some ffmpeg builds from ever reaching end of
//! stream even with `shortest=1`.

use std::path::{Path, PathBuf};

use overlaycut_common::clock::frames_for_duration;
use overlaycut_project_model::job::{Dimensions, TrimRange};
use overlaycut_project_model::layer::{LayerId, Timing};

use crate::export::ExportSettings;
use crate::mapping::{round_even, Placement};

/// One pre-rendered overlay still and where it goes.
#[derive(Debug, Clone)]
pub struct GraphOverlay {
    pub layer: LayerId,
    /// PNG on disk.
    pub still: PathBuf,
    pub placement: Placement,
    /// Visibility window in source seconds.
    pub timing: Timing,
}

/// Frames to loop a still for: enough to cover the export, plus a
/// buffer so the overlay never ends before the video.
pub fn loop_frame_count(export_duration_secs: f64, fps: u32, buffer_frames: u32) -> u32 {
    let frames = frames_for_duration(export_duration_secs, fps);
    u32::try_from(frames)
        .unwrap_or(u32::MAX)
        .saturating_add(buffer_frames)
}

/// Export-relative `[start, end]` of a layer, clipped to the export.
pub fn enable_window(timing: &Timing, trim: &TrimRange) -> (f64, f64) {
    let duration = trim.duration();
    let start = trim.to_export_time(timing.start).clamp(0.0, duration);
    let end = trim.to_export_time(timing.end).clamp(0.0, duration);
    (start, end)
}

/// Build the `filter_complex` string. Input 0 is the source video,
/// input `i + 1` is `overlays[i]`. The graph's output label is `[vout]`.
pub fn build_filter_graph(
    overlays: &[GraphOverlay],
    trim: &TrimRange,
    encode: Dimensions,
    settings: &ExportSettings,
) -> String {
    let mut filters = Vec::with_capacity(overlays.len() * 2 + 1);
    let loop_frames = loop_frame_count(trim.duration(), settings.fps, settings.loop_buffer_frames);

    let base_label = if overlays.is_empty() { "vout" } else { "base" };
    filters.push(format!(
        "[0:v]scale={w}:{h},setsar=1,format=yuv420p[{base_label}]",
        w = encode.width,
        h = encode.height,
    ));

    let mut current = base_label.to_string();
    for (i, overlay) in overlays.iter().enumerate() {
        let input_idx = i + 1;
        let placement = &overlay.placement;
        let sprite_label = format!("ov_sprite_{i}");

        let mut chain = format!(
            "[{input_idx}:v]loop=loop={loop_frames}:size=1:start=0,setpts=N/({fps}*TB),format=rgba,scale={w}:{h}",
            fps = settings.fps.max(1),
            w = round_even(placement.width),
            h = round_even(placement.height),
        );
        if placement.is_rotated() {
            let radians = placement.rotation_deg.to_radians();
            chain.push_str(&format!(
                ",rotate={radians:.6}:ow=rotw({radians:.6}):oh=roth({radians:.6}):c=none"
            ));
        }
        chain.push_str(&format!("[{sprite_label}]"));
        filters.push(chain);

        let bounds = placement.bounds();
        let (start_s, end_s) = enable_window(&overlay.timing, trim);
        let next_label = if i == overlays.len() - 1 {
            "vout".to_string()
        } else {
            format!("ov_{i}")
        };
        filters.push(format!(
            "[{current}][{sprite_label}]overlay=x={x}:y={y}:shortest=1:enable='between(t,{start_s:.3},{end_s:.3})'[{next_label}]",
            x = bounds.x.round() as i64,
            y = bounds.y.round() as i64,
        ));
        current = next_label;
    }

    filters.join(";")
}

/// Full ffmpeg argument list for one graph export.
pub fn build_ffmpeg_args(
    source: &Path,
    output: &Path,
    overlays: &[GraphOverlay],
    trim: &TrimRange,
    encode: Dimensions,
    settings: &ExportSettings,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-ss".into(),
        format!("{:.3}", trim.start),
        "-i".into(),
        source.display().to_string(),
    ];

    for overlay in overlays {
        args.push("-i".into());
        args.push(overlay.still.display().to_string());
    }

    args.extend([
        "-filter_complex".into(),
        build_filter_graph(overlays, trim, encode, settings),
        "-map".into(),
        "[vout]".into(),
        "-map".into(),
        "0:a?".into(),
        "-t".into(),
        format!("{:.3}", trim.duration()),
        "-r".into(),
        settings.fps.to_string(),
    ]);
    args.extend(settings.codec_args());
    args.extend([
        "-c:a".into(),
        "copy".into(),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
        output.display().to_string(),
    ]);
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{SpaceMapping, SpriteSpace};
    use overlaycut_project_model::layer::Transform;

    fn settings() -> ExportSettings {
        ExportSettings::default()
    }

    fn overlay(x: f64, y: f64, rotation: f64, start: f64, end: f64) -> GraphOverlay {
        let mapping = SpaceMapping::new(Dimensions::new(400, 225), Dimensions::new(1920, 1080));
        let mut transform = Transform::at(x, y, 40.0, 20.0);
        transform.rotation = rotation;
        GraphOverlay {
            layer: LayerId::new(),
            still: PathBuf::from("/tmp/still.png"),
            placement: Placement::compute(&transform, 40.0, 20.0, SpriteSpace::Display, &mapping),
            timing: Timing::new(start, end).unwrap(),
        }
    }

    #[test]
    fn test_loop_frame_count_is_finite_and_buffered() {
        assert_eq!(loop_frame_count(5.0, 30, 10), 150 + 10);
        assert_eq!(loop_frame_count(5.01, 30, 0), 151);
        assert_eq!(loop_frame_count(0.0, 30, 10), 10);
    }

    #[test]
    fn test_enable_window_is_export_relative() {
        let trim = TrimRange::new(2.0, 7.0, 10.0).unwrap();
        let whole = Timing::new(0.0, 10.0).unwrap();
        assert_eq!(enable_window(&whole, &trim), (0.0, 5.0));

        let inner = Timing::new(3.0, 4.5).unwrap();
        assert_eq!(enable_window(&inner, &trim), (1.0, 2.5));
    }

    #[test]
    fn test_graph_has_no_infinite_loop() {
        let trim = TrimRange::new(2.0, 7.0, 10.0).unwrap();
        let overlays = vec![overlay(50.0, 50.0, 0.0, 0.0, 10.0), overlay(10.0, 10.0, 30.0, 3.0, 4.0)];
        let graph = build_filter_graph(&overlays, &trim, Dimensions::new(1920, 1080), &settings());

        assert!(!graph.contains("loop=-1"));
        assert_eq!(graph.matches("loop=loop=160:size=1:start=0").count(), 2);
        assert!(graph.contains("shortest=1"));
        assert!(graph.ends_with("[vout]"));
    }

    #[test]
    fn test_graph_places_overlay_in_encode_space() {
        let trim = TrimRange::new(2.0, 7.0, 10.0).unwrap();
        let overlays = vec![overlay(50.0, 50.0, 0.0, 0.0, 10.0)];
        let graph = build_filter_graph(&overlays, &trim, Dimensions::new(1920, 1080), &settings());

        assert!(graph.contains("scale=192:96"));
        assert!(graph.contains("overlay=x=240:y=240:shortest=1:enable='between(t,0.000,5.000)'"));
        assert!(!graph.contains("rotate="));
    }

    #[test]
    fn test_rotated_overlay_expands_canvas() {
        let trim = TrimRange::full(10.0).unwrap();
        let overlays = vec![overlay(50.0, 50.0, 90.0, 0.0, 10.0)];
        let graph = build_filter_graph(&overlays, &trim, Dimensions::new(1920, 1080), &settings());
        assert!(graph.contains("rotate=1.570796:ow=rotw(1.570796):oh=roth(1.570796):c=none"));
    }

    #[test]
    fn test_overlays_chain_in_z_order() {
        let trim = TrimRange::full(10.0).unwrap();
        let overlays = vec![overlay(0.0, 0.0, 0.0, 0.0, 1.0), overlay(0.0, 0.0, 0.0, 0.0, 1.0)];
        let graph = build_filter_graph(&overlays, &trim, Dimensions::new(1920, 1080), &settings());

        let first = graph.find("[base][ov_sprite_0]").unwrap();
        let second = graph.find("[ov_0][ov_sprite_1]").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_trim_only_args() {
        let trim = TrimRange::new(2.0, 7.0, 10.0).unwrap();
        let args = build_ffmpeg_args(
            Path::new("in.mp4"),
            Path::new("out.mp4"),
            &[],
            &trim,
            Dimensions::new(1280, 720),
            &settings(),
        );
        let joined = args.join(" ");

        assert!(joined.contains("-ss 2.000 -i in.mp4"));
        assert!(joined.contains("-t 5.000"));
        assert!(joined.contains("-c:a copy"));
        assert!(joined.contains("-progress pipe:1"));
        assert!(joined.contains("[0:v]scale=1280:720,setsar=1,format=yuv420p[vout]"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }
}
