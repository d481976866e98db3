//! Text layer rasterization.
//!
//! Text is rendered straight at encode resolution, so the sprite is
//! sharp regardless of how much smaller the preview was. Fonts are
//! looked up by family name among the system font directories; an
//! unknown family falls back to the configured default family, then to
//! any font that can be found.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle as GlyphStyle};
use fontdue::{Font, FontSettings};
use image::{Rgba, RgbaImage};

use overlaycut_common::error::{OverlayError, OverlayResult};
use overlaycut_project_model::layer::{TextAlign, TextStyle};

use crate::compositor::blend_over;

/// Renders text layers to RGBA sprites.
pub struct TextRasterizer {
    default_family: String,
    padding: u32,
    search_dirs: Vec<PathBuf>,
    /// Normalized file stem → font file, built on first lookup.
    index: Option<HashMap<String, PathBuf>>,
    loaded: HashMap<PathBuf, Arc<Font>>,
    /// Font used when nothing on disk matches.
    fallback: Option<Arc<Font>>,
}

impl TextRasterizer {
    pub fn new(default_family: impl Into<String>, padding: u32) -> Self {
        Self {
            default_family: default_family.into(),
            padding,
            search_dirs: system_font_dirs(),
            index: None,
            loaded: HashMap::new(),
            fallback: None,
        }
    }

    /// Search only `dirs` instead of the system font directories.
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self.index = None;
        self
    }

    /// Use the font at `path` whenever no family matches.
    pub fn with_fallback_font(mut self, path: &Path) -> OverlayResult<Self> {
        self.fallback = Some(load_font(path)?);
        Ok(self)
    }

    pub fn padding(&self) -> u32 {
        self.padding
    }

    /// Whether any font at all can be resolved.
    pub fn has_fonts(&mut self) -> bool {
        self.fallback.is_some() || !self.font_index().is_empty()
    }

    /// Rasterize `content` at `style.font_size × font_scale` pixels.
    ///
    /// The sprite is the measured text box plus `padding` on each side.
    /// Lines are aligned within the box per `style.text_align`.
    pub fn rasterize(
        &mut self,
        content: &str,
        style: &TextStyle,
        font_scale: f64,
    ) -> OverlayResult<RgbaImage> {
        let font = self.resolve_font(&style.font_family, style.font_weight >= 600)?;
        let px = scaled_font_size(style.font_size, font_scale);
        let color = parse_color(&style.color);

        let line_height = font
            .horizontal_line_metrics(px)
            .map(|m| m.new_line_size)
            .filter(|h| *h > 0.0)
            .unwrap_or(px * 1.2);

        let lines: Vec<&str> = if content.is_empty() {
            vec![""]
        } else {
            content.split('\n').collect()
        };

        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        let laid_out: Vec<(f32, Vec<fontdue::layout::GlyphPosition>)> = lines
            .iter()
            .map(|line| {
                layout.reset(&LayoutSettings {
                    x: 0.0,
                    y: 0.0,
                    max_width: None,
                    max_height: None,
                    horizontal_align: fontdue::layout::HorizontalAlign::Left,
                    vertical_align: fontdue::layout::VerticalAlign::Top,
                    line_height: 1.0,
                    wrap_style: fontdue::layout::WrapStyle::Word,
                    wrap_hard_breaks: true,
                });
                layout.append(&[font.as_ref()], &GlyphStyle::new(line.trim_end_matches('\r'), px, 0));
                let glyphs = layout.glyphs().clone();
                let width = glyphs
                    .iter()
                    .map(|g| g.x + g.width as f32)
                    .fold(0.0f32, f32::max);
                (width, glyphs)
            })
            .collect();

        let text_width = laid_out.iter().map(|(w, _)| *w).fold(0.0f32, f32::max);
        let text_height = line_height * lines.len() as f32;
        let pad = self.padding;
        let width = (text_width.ceil() as u32 + 2 * pad).max(1);
        let height = (text_height.ceil() as u32 + 2 * pad).max(1);

        let mut sprite = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
        for (row, (line_width, glyphs)) in laid_out.iter().enumerate() {
            let offset_x = pad as f32
                + match style.text_align {
                    TextAlign::Left => 0.0,
                    TextAlign::Center => (text_width - line_width) / 2.0,
                    TextAlign::Right => text_width - line_width,
                };
            let offset_y = pad as f32 + row as f32 * line_height;

            for glyph in glyphs {
                if glyph.width == 0 || glyph.height == 0 {
                    continue;
                }
                let (_, coverage) = font.rasterize_config(glyph.key);
                let gx = (offset_x + glyph.x).round() as i64;
                let gy = (offset_y + glyph.y).round() as i64;
                draw_coverage(&mut sprite, gx, gy, glyph.width, glyph.height, &coverage, color);
            }
        }

        tracing::trace!(width, height, px, lines = lines.len(), "Rasterized text");
        Ok(sprite)
    }

    fn resolve_font(&mut self, family: &str, bold: bool) -> OverlayResult<Arc<Font>> {
        if let Some(path) = self.find_family(family, bold) {
            return self.load_cached(&path);
        }

        let default_family = self.default_family.clone();
        if !family.eq_ignore_ascii_case(&default_family) {
            if let Some(path) = self.find_family(&default_family, bold) {
                tracing::warn!(
                    family,
                    fallback = %default_family,
                    "Font family not found, using default family"
                );
                return self.load_cached(&path);
            }
        }

        if let Some(font) = &self.fallback {
            return Ok(Arc::clone(font));
        }

        // Any font beats no text.
        let any = self.font_index().values().min().cloned();
        match any {
            Some(path) => {
                tracing::warn!(family, font = %path.display(), "No matching font, using first available");
                self.load_cached(&path)
            }
            None => Err(OverlayError::resource(format!(
                "No usable font for family '{family}'"
            ))),
        }
    }

    fn find_family(&mut self, family: &str, bold: bool) -> Option<PathBuf> {
        let index = self.font_index();
        for stem in family_candidates(family) {
            let variants: [String; 3] = if bold {
                [format!("{stem}bold"), stem.clone(), format!("{stem}regular")]
            } else {
                [stem.clone(), format!("{stem}regular"), format!("{stem}book")]
            };
            if let Some(path) = variants.iter().find_map(|v| index.get(v)) {
                return Some(path.clone());
            }
        }
        None
    }

    fn load_cached(&mut self, path: &Path) -> OverlayResult<Arc<Font>> {
        if let Some(font) = self.loaded.get(path) {
            return Ok(Arc::clone(font));
        }
        let font = load_font(path)?;
        self.loaded.insert(path.to_path_buf(), Arc::clone(&font));
        Ok(font)
    }

    fn font_index(&mut self) -> &HashMap<String, PathBuf> {
        let dirs = &self.search_dirs;
        self.index.get_or_insert_with(|| {
            let mut index = HashMap::new();
            for dir in dirs {
                index_fonts(dir, &mut index, 0);
            }
            tracing::debug!(fonts = index.len(), "Indexed system fonts");
            index
        })
    }
}

fn load_font(path: &Path) -> OverlayResult<Arc<Font>> {
    let bytes = std::fs::read(path)
        .map_err(|e| OverlayError::resource(format!("Failed to read font {}: {e}", path.display())))?;
    let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|e| {
        OverlayError::resource(format!("Failed to parse font {}: {e}", path.display()))
    })?;
    Ok(Arc::new(font))
}

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        dirs.push(home.join(".local/share/fonts"));
        dirs.push(home.join(".fonts"));
        dirs.push(home.join("Library/Fonts"));
    }
    dirs.extend(
        [
            "/usr/share/fonts",
            "/usr/local/share/fonts",
            "/Library/Fonts",
            "/System/Library/Fonts",
            "C:\\Windows\\Fonts",
        ]
        .into_iter()
        .map(PathBuf::from),
    );
    dirs
}

fn index_fonts(dir: &Path, index: &mut HashMap<String, PathBuf>, depth: usize) {
    if depth > 6 {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            index_fonts(&path, index, depth + 1);
            continue;
        }
        let is_font = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("ttf") || e.eq_ignore_ascii_case("otf"))
            .unwrap_or(false);
        if !is_font {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            index.entry(normalize_family(stem)).or_insert(path);
        }
    }
}

/// Lowercase alphanumerics only: `"DejaVu Sans-Bold"` → `"dejavusansbold"`.
fn normalize_family(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// File stems to try for a CSS family name, most specific first.
fn family_candidates(family: &str) -> Vec<String> {
    let generic: &[&str] = match family.trim().to_ascii_lowercase().as_str() {
        "sans-serif" | "sans" | "system-ui" => &[
            "dejavusans",
            "liberationsans",
            "notosans",
            "arial",
            "helvetica",
            "freesans",
            "opensans",
        ],
        "serif" => &["dejavuserif", "liberationserif", "notoserif", "timesnewroman", "times", "freeserif"],
        "monospace" => &["dejavusansmono", "liberationmono", "notosansmono", "couriernew", "menlo", "freemono"],
        _ => &[],
    };
    if generic.is_empty() {
        let normalized = normalize_family(family);
        if normalized.is_empty() {
            return vec![];
        }
        vec![normalized]
    } else {
        generic.iter().map(|s| s.to_string()).collect()
    }
}

/// Font size in encode pixels.
pub fn scaled_font_size(font_size: f64, font_scale: f64) -> f32 {
    ((font_size * font_scale) as f32).max(1.0)
}

/// Parse a CSS-style color. Unknown values fall back to opaque white.
pub fn parse_color(value: &str) -> [u8; 4] {
    const WHITE: [u8; 4] = [255, 255, 255, 255];
    let value = value.trim();

    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex).unwrap_or_else(|| {
            tracing::warn!(color = value, "Unparseable color, using white");
            WHITE
        });
    }

    match value.to_ascii_lowercase().as_str() {
        "white" => WHITE,
        "black" => [0, 0, 0, 255],
        "red" => [255, 0, 0, 255],
        "green" => [0, 128, 0, 255],
        "lime" => [0, 255, 0, 255],
        "blue" => [0, 0, 255, 255],
        "yellow" => [255, 255, 0, 255],
        "cyan" | "aqua" => [0, 255, 255, 255],
        "magenta" | "fuchsia" => [255, 0, 255, 255],
        "orange" => [255, 165, 0, 255],
        "gray" | "grey" => [128, 128, 128, 255],
        "transparent" => [0, 0, 0, 0],
        _ => {
            tracing::warn!(color = value, "Unknown color name, using white");
            WHITE
        }
    }
}

fn parse_hex(hex: &str) -> Option<[u8; 4]> {
    if !hex.is_ascii() {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => Some([nibble(0)?, nibble(1)?, nibble(2)?, 255]),
        4 => Some([nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?]),
        6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
        8 => Some([byte(0)?, byte(2)?, byte(4)?, byte(6)?]),
        _ => None,
    }
}

fn draw_coverage(
    sprite: &mut RgbaImage,
    x: i64,
    y: i64,
    width: usize,
    height: usize,
    coverage: &[u8],
    color: [u8; 4],
) {
    let (sw, sh) = (sprite.width() as i64, sprite.height() as i64);
    for row in 0..height {
        let py = y + row as i64;
        if py < 0 || py >= sh {
            continue;
        }
        for col in 0..width {
            let px = x + col as i64;
            if px < 0 || px >= sw {
                continue;
            }
            let mask = coverage.get(row * width + col).copied().unwrap_or(0);
            if mask == 0 {
                continue;
            }
            let alpha = ((u16::from(mask) * u16::from(color[3])) / 255) as u8;
            let dst = sprite.get_pixel_mut(px as u32, py as u32);
            blend_over(dst, [color[0], color[1], color[2], alpha]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_colors() {
        assert_eq!(parse_color("#fff"), [255, 255, 255, 255]);
        assert_eq!(parse_color("#ff000080"), [255, 0, 0, 128]);
        assert_eq!(parse_color("#1e90ff"), [30, 144, 255, 255]);
        assert_eq!(parse_color("#0f08"), [0, 255, 0, 136]);
    }

    #[test]
    fn test_parse_named_and_invalid_colors() {
        assert_eq!(parse_color("Black"), [0, 0, 0, 255]);
        assert_eq!(parse_color("transparent")[3], 0);
        assert_eq!(parse_color("#zzz"), [255, 255, 255, 255]);
        assert_eq!(parse_color("chartreuse-ish"), [255, 255, 255, 255]);
    }

    #[test]
    fn test_scaled_font_size() {
        assert!((scaled_font_size(32.0, 4.8) - 153.6).abs() < 1e-3);
        assert_eq!(scaled_font_size(0.0, 4.8), 1.0);
    }

    #[test]
    fn test_family_candidates() {
        assert_eq!(family_candidates("Open Sans"), vec!["opensans".to_string()]);
        assert!(family_candidates("sans-serif").contains(&"dejavusans".to_string()));
        assert!(family_candidates("  ").is_empty());
    }

    #[test]
    fn test_missing_fonts_are_a_resource_error() {
        let empty = std::env::temp_dir().join("overlaycut_test_no_fonts");
        std::fs::create_dir_all(&empty).unwrap();
        let mut raster = TextRasterizer::new("sans-serif", 8).with_search_dirs(vec![empty.clone()]);

        assert!(!raster.has_fonts());
        let err = raster
            .rasterize("Hello", &TextStyle::default(), 1.0)
            .unwrap_err();
        assert!(matches!(err, OverlayError::Resource { .. }));
        std::fs::remove_dir_all(&empty).ok();
    }

    #[test]
    fn test_rasterized_text_scales_with_font_scale() {
        let mut raster = TextRasterizer::new("sans-serif", 8);
        if !raster.has_fonts() {
            // Host without any fonts installed.
            return;
        }
        let style = TextStyle::default();
        let small = raster.rasterize("Hello", &style, 1.0).unwrap();
        let large = raster.rasterize("Hello", &style, 3.0).unwrap();

        assert!(large.width() > small.width() * 2);
        assert!(large.height() > small.height() * 2);
        assert!(small.pixels().any(|p| p[3] > 0));
        // Padding stays clear.
        assert!((0..small.width()).all(|x| small.get_pixel(x, 0)[3] == 0));
    }

    #[test]
    fn test_multiline_text_is_taller() {
        let mut raster = TextRasterizer::new("sans-serif", 0);
        if !raster.has_fonts() {
            return;
        }
        let style = TextStyle::default();
        let one = raster.rasterize("Line", &style, 1.0).unwrap();
        let two = raster.rasterize("Line\nLine", &style, 1.0).unwrap();
        assert!(two.height() > one.height());
    }
}
