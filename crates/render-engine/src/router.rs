//! Export routing.
//!
//! Picks a backend from the layer set and what the host can do. The
//! decision is a pure function so it can be exercised with synthetic
//! capabilities.

use serde::{Deserialize, Serialize};

use overlaycut_project_model::layer::Layer;

use crate::ffmpeg::command_exists;

/// What the host runtime offers for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeCapabilities {
    /// Frames can be decoded into and encoded from raw pixel buffers.
    pub has_frame_codec_access: bool,
    /// A filter-graph transcoder is available.
    pub has_transcoder: bool,
}

impl RuntimeCapabilities {
    /// Probe the host for `ffmpeg` and `ffprobe`.
    ///
    /// Raw frame access needs both: `ffprobe` to size the decode pipe and
    /// `ffmpeg` for the decode and encode processes.
    pub fn detect() -> Self {
        let ffmpeg = command_exists("ffmpeg");
        let ffprobe = command_exists("ffprobe");
        let caps = Self {
            has_frame_codec_access: ffmpeg && ffprobe,
            has_transcoder: ffmpeg,
        };
        tracing::debug!(?caps, "Detected runtime capabilities");
        caps
    }
}

/// Which backend an export runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportRoute {
    /// Real-time playback, per-frame compositing, incremental encode.
    Streaming,
    /// One transcoder invocation with a synthesized filter graph.
    GraphBased,
    /// Overlays present but no backend can draw them.
    Unsupported,
}

impl ExportRoute {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::GraphBased => "graph",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Caller override of the routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStrategy {
    /// Use [`route`].
    #[default]
    Auto,
    /// Force the filter-graph backend, overlays included.
    Graph,
    /// Force the streaming backend.
    Streaming,
}

/// Choose a backend.
///
/// | layers    | frame codec access | route         |
/// |-----------|--------------------|---------------|
/// | empty     | any                | `GraphBased`  |
/// | non-empty | yes                | `Streaming`   |
/// | non-empty | no                 | `Unsupported` |
///
/// An `Unsupported` result lets the caller offer a trim-only export by
/// routing again with no layers.
pub fn route<L: AsRef<Layer>>(layers: &[L], caps: &RuntimeCapabilities) -> ExportRoute {
    if layers.is_empty() {
        ExportRoute::GraphBased
    } else if caps.has_frame_codec_access {
        ExportRoute::Streaming
    } else {
        ExportRoute::Unsupported
    }
}

/// Apply a strategy override on top of [`route`].
///
/// A forced backend still needs its capability; when it is missing the
/// result is `Unsupported`.
pub fn resolve_route<L: AsRef<Layer>>(
    layers: &[L],
    caps: &RuntimeCapabilities,
    strategy: ExportStrategy,
) -> ExportRoute {
    match strategy {
        ExportStrategy::Auto => route(layers, caps),
        ExportStrategy::Graph if caps.has_transcoder => ExportRoute::GraphBased,
        ExportStrategy::Streaming if caps.has_frame_codec_access => ExportRoute::Streaming,
        ExportStrategy::Graph | ExportStrategy::Streaming => ExportRoute::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlaycut_project_model::layer::{TextStyle, Timing};

    fn caps(frame_access: bool, transcoder: bool) -> RuntimeCapabilities {
        RuntimeCapabilities {
            has_frame_codec_access: frame_access,
            has_transcoder: transcoder,
        }
    }

    fn one_layer() -> Vec<Layer> {
        vec![Layer::text(
            "hi",
            TextStyle::default(),
            0.0,
            0.0,
            Timing::new(0.0, 1.0).unwrap(),
        )]
    }

    #[test]
    fn test_empty_layers_route_to_graph() {
        let none: Vec<Layer> = vec![];
        assert_eq!(route(&none, &caps(true, true)), ExportRoute::GraphBased);
        assert_eq!(route(&none, &caps(false, false)), ExportRoute::GraphBased);
    }

    #[test]
    fn test_layers_with_frame_access_route_to_streaming() {
        assert_eq!(route(&one_layer(), &caps(true, true)), ExportRoute::Streaming);
        assert_eq!(route(&one_layer(), &caps(true, false)), ExportRoute::Streaming);
    }

    #[test]
    fn test_layers_without_frame_access_are_unsupported() {
        assert_eq!(route(&one_layer(), &caps(false, true)), ExportRoute::Unsupported);
        assert_eq!(route(&one_layer(), &caps(false, false)), ExportRoute::Unsupported);
    }

    #[test]
    fn test_strategy_override() {
        let layers = one_layer();
        assert_eq!(
            resolve_route(&layers, &caps(true, true), ExportStrategy::Graph),
            ExportRoute::GraphBased
        );
        assert_eq!(
            resolve_route(&layers, &caps(false, false), ExportStrategy::Graph),
            ExportRoute::Unsupported
        );
        assert_eq!(
            resolve_route(&layers, &caps(false, true), ExportStrategy::Streaming),
            ExportRoute::Unsupported
        );
        assert_eq!(
            resolve_route(&layers, &caps(true, true), ExportStrategy::Auto),
            ExportRoute::Streaming
        );
    }
}
