//! Layer types: timed, transformable overlays.
//!
//! A layer is either rendered text or an encoded still image (for
//! example a freehand drawing). Every layer carries a preview-space
//! transform and a source-time visibility window.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(Uuid);

impl LayerId {
    /// Allocate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// First eight hex digits, for compact log and CLI output.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for LayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Visibility window in source-video seconds.
///
/// Invariant: `0 <= start < end`, both finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub start: f64,
    pub end: f64,
}

impl Timing {
    /// Validate a window without clamping.
    pub fn new(start: f64, end: f64) -> Result<Self, LayerError> {
        let timing = Self { start, end };
        if !start.is_finite() || !end.is_finite() {
            return Err(LayerError::NonFiniteTiming);
        }
        if !timing.is_valid() {
            return Err(LayerError::InvalidTiming { start, end });
        }
        Ok(timing)
    }

    /// Clamp both ends to `[0, video_duration]`, then validate.
    pub fn clamped(start: f64, end: f64, video_duration: f64) -> Result<Self, LayerError> {
        if !start.is_finite() || !end.is_finite() || !video_duration.is_finite() {
            return Err(LayerError::NonFiniteTiming);
        }
        let max = video_duration.max(0.0);
        Self::new(start.clamp(0.0, max), end.clamp(0.0, max))
    }

    /// The whole video.
    pub fn whole(video_duration: f64) -> Result<Self, LayerError> {
        Self::new(0.0, video_duration)
    }

    pub fn is_valid(&self) -> bool {
        0.0 <= self.start && self.start < self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Inclusive on both ends.
    pub fn is_active_at(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }

    /// Whether two windows share a non-empty interval. Touching windows
    /// (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Timing) -> bool {
        self.overlaps_range(other.start, other.end)
    }

    pub fn overlaps_range(&self, start: f64, end: f64) -> bool {
        self.start < end && start < self.end
    }

    /// Re-clamp to a (possibly shorter) video duration.
    pub fn clamp_to(&self, video_duration: f64) -> Result<Self, LayerError> {
        Self::clamped(self.start, self.end, video_duration)
    }
}

/// Multiplicative scale applied about the element's center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub sx: f64,
    pub sy: f64,
}

impl Scale {
    pub const IDENTITY: Scale = Scale { sx: 1.0, sy: 1.0 };

    pub fn uniform(s: f64) -> Self {
        Self { sx: s, sy: s }
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Preview-space placement of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Left edge in preview pixels.
    pub x: f64,
    /// Top edge in preview pixels.
    pub y: f64,
    /// Advisory bounding box width in preview pixels.
    pub width: f64,
    /// Advisory bounding box height in preview pixels.
    pub height: f64,
    #[serde(default)]
    pub scale: Scale,
    /// Degrees, clockwise, about the element's center, applied after scale.
    #[serde(default)]
    pub rotation: f64,
}

impl Transform {
    pub fn at(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            scale: Scale::IDENTITY,
            rotation: 0.0,
        }
    }
}

/// Horizontal alignment of multi-line text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Text appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    /// Font size in preview pixels.
    pub font_size: f64,
    /// CSS-style color (`#rgb`, `#rrggbb`, `#rrggbbaa` or a basic name).
    pub color: String,
    pub font_family: String,
    /// CSS weight, 100..=900.
    pub font_weight: u16,
    pub text_align: TextAlign,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 32.0,
            color: "#ffffff".to_string(),
            font_family: "sans-serif".to_string(),
            font_weight: 400,
            text_align: TextAlign::Left,
        }
    }
}

/// Where the encoded still of a raster layer lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PixelSource {
    /// Encoded image bytes (PNG, JPEG, ...) held in memory.
    Encoded {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// Encoded image on disk.
    File { path: PathBuf },
}

impl PixelSource {
    /// Read the encoded bytes.
    pub fn bytes(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match self {
            Self::Encoded { data } => Ok(Cow::Borrowed(data)),
            Self::File { path } => std::fs::read(path).map(Cow::Owned),
        }
    }
}

/// What a layer draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerKind {
    Text { content: String, style: TextStyle },
    Raster { source: PixelSource },
}

/// A timed, transformable visual element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub kind: LayerKind,
    pub transform: Transform,
    pub timing: Timing,
}

impl Layer {
    /// New text layer with a fresh id. The advisory box is estimated
    /// from the content; the rasterizer measures the real one at export.
    pub fn text(
        content: impl Into<String>,
        style: TextStyle,
        x: f64,
        y: f64,
        timing: Timing,
    ) -> Self {
        let content = content.into();
        let (width, height) = estimate_text_box(&content, style.font_size);
        Self {
            id: LayerId::new(),
            kind: LayerKind::Text { content, style },
            transform: Transform::at(x, y, width, height),
            timing,
        }
    }

    /// New raster layer with a fresh id. `width`/`height` are the
    /// source image dimensions.
    pub fn raster(
        source: PixelSource,
        width: f64,
        height: f64,
        x: f64,
        y: f64,
        timing: Timing,
    ) -> Self {
        Self {
            id: LayerId::new(),
            kind: LayerKind::Raster { source },
            transform: Transform::at(x, y, width, height),
            timing,
        }
    }

    pub fn is_active_at(&self, t: f64) -> bool {
        self.timing.is_active_at(t)
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, LayerKind::Text { .. })
    }

    /// Short human-readable description for listings.
    pub fn label(&self) -> String {
        match &self.kind {
            LayerKind::Text { content, .. } => {
                let first: String = content.chars().take(24).collect();
                format!("text \"{first}\"")
            }
            LayerKind::Raster { source } => match source {
                PixelSource::Encoded { data } => format!("drawing ({} bytes)", data.len()),
                PixelSource::File { path } => format!("drawing {}", path.display()),
            },
        }
    }
}

impl AsRef<Layer> for Layer {
    fn as_ref(&self) -> &Layer {
        self
    }
}

fn estimate_text_box(content: &str, font_size: f64) -> (f64, f64) {
    let lines = content.lines().count().max(1);
    let longest = content
        .lines()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0);
    (
        longest as f64 * font_size * 0.6,
        lines as f64 * font_size * 1.2,
    )
}

/// Errors raised while constructing or validating layers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayerError {
    #[error("Invalid layer timing: start {start} must be >= 0 and before end {end}")]
    InvalidTiming { start: f64, end: f64 },

    #[error("Layer timing must be finite")]
    NonFiniteTiming,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_predicate_is_inclusive() {
        let timing = Timing::new(2.0, 5.0).unwrap();
        assert!(timing.is_active_at(2.0));
        assert!(timing.is_active_at(5.0));
        assert!(!timing.is_active_at(1.999));
        assert!(!timing.is_active_at(5.001));
    }

    #[test]
    fn test_timing_rejects_empty_and_reversed_windows() {
        assert!(Timing::new(3.0, 3.0).is_err());
        assert!(Timing::new(4.0, 3.0).is_err());
        assert!(Timing::new(-1.0, 3.0).is_err());
        assert_eq!(
            Timing::new(f64::NAN, 3.0),
            Err(LayerError::NonFiniteTiming)
        );
    }

    #[test]
    fn test_timing_clamps_to_video_duration() {
        let timing = Timing::clamped(-2.0, 30.0, 10.0).unwrap();
        assert_eq!(timing, Timing { start: 0.0, end: 10.0 });

        // Entirely past the end collapses to an empty window.
        assert!(Timing::clamped(12.0, 15.0, 10.0).is_err());
    }

    #[test]
    fn test_touching_windows_do_not_overlap() {
        let a = Timing::new(0.0, 2.0).unwrap();
        let b = Timing::new(2.0, 4.0).unwrap();
        let c = Timing::new(1.5, 3.0).unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_layer_serialization_keeps_encoded_bytes() {
        let layer = Layer::raster(
            PixelSource::Encoded {
                data: vec![0x89, b'P', b'N', b'G'],
            },
            64.0,
            32.0,
            10.0,
            20.0,
            Timing::new(0.0, 1.0).unwrap(),
        );
        let json = serde_json::to_string(&layer).unwrap();
        assert!(json.contains("\"kind\":\"raster\""));
        assert!(json.contains("iVBORw"));

        let parsed: Layer = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, layer);
    }

    #[test]
    fn test_text_style_defaults_fill_missing_fields() {
        let style: TextStyle = serde_json::from_str(r##"{"color":"#ff0000"}"##).unwrap();
        assert_eq!(style.color, "#ff0000");
        assert_eq!(style.font_size, 32.0);
        assert_eq!(style.text_align, TextAlign::Left);
    }

    #[test]
    fn test_layer_id_parses_from_display() {
        let id = LayerId::new();
        let parsed: LayerId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.short().len(), 8);
    }
}
