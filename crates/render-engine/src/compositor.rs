//! Frame compositor.
//!
//! Draws the active layers of a snapshot over one decoded video frame,
//! at encode resolution. Layer sprites are rendered once per export and
//! cached by id; the snapshot is immutable for the lifetime of a job so
//! the cache never goes stale.

use std::collections::HashMap;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use overlaycut_common::error::{OverlayError, OverlayResult};
use overlaycut_project_model::layer::{Layer, LayerId, LayerKind};

use crate::mapping::{Placement, SpaceMapping, SpriteSpace};
use crate::text::TextRasterizer;

/// A layer's sprite together with where it lands in encode space.
#[derive(Debug, Clone)]
pub struct PreparedLayer {
    pub image: RgbaImage,
    pub placement: Placement,
}

/// Result of compositing one frame.
#[derive(Debug, Clone)]
pub struct Composite {
    pub image: RgbaImage,
    /// Layers drawn on this frame, bottom first.
    pub drawn: Vec<LayerId>,
}

/// Composites overlays onto video frames.
pub struct FrameCompositor {
    mapping: SpaceMapping,
    text: TextRasterizer,
    /// `None` marks a layer whose asset failed to load; it is skipped.
    prepared: HashMap<LayerId, Option<PreparedLayer>>,
}

impl FrameCompositor {
    pub fn new(mapping: SpaceMapping, text: TextRasterizer) -> Self {
        Self {
            mapping,
            text,
            prepared: HashMap::new(),
        }
    }

    pub fn mapping(&self) -> &SpaceMapping {
        &self.mapping
    }

    /// Render sprites for all `layers` up front.
    pub fn prepare<L: AsRef<Layer>>(&mut self, layers: &[L]) {
        for layer in layers {
            self.prepared_layer(layer.as_ref());
        }
    }

    /// The cached sprite for `layer`, rendering it on first use.
    ///
    /// Returns `None` (after logging) when the layer's asset cannot be
    /// loaded.
    pub fn prepared_layer(&mut self, layer: &Layer) -> Option<&PreparedLayer> {
        if !self.prepared.contains_key(&layer.id) {
            let prepared = match self.render_sprite(layer) {
                Ok(prepared) => Some(prepared),
                Err(err) => {
                    tracing::warn!(
                        layer = %layer.id.short(),
                        error = %err,
                        "Skipping layer with unusable asset"
                    );
                    None
                }
            };
            self.prepared.insert(layer.id, prepared);
        }
        self.prepared.get(&layer.id).and_then(Option::as_ref)
    }

    fn render_sprite(&mut self, layer: &Layer) -> OverlayResult<PreparedLayer> {
        let (image, space) = match &layer.kind {
            LayerKind::Text { content, style } => {
                let image = self
                    .text
                    .rasterize(content, style, self.mapping.font_scale())?;
                (image, SpriteSpace::Encode)
            }
            LayerKind::Raster { source } => {
                let bytes = source.bytes().map_err(|e| {
                    OverlayError::resource(format!("Failed to read drawing: {e}"))
                })?;
                let image = image::load_from_memory(&bytes)
                    .map_err(|e| OverlayError::resource(format!("Failed to decode drawing: {e}")))?
                    .to_rgba8();
                (image, SpriteSpace::Display)
            }
        };

        let placement = Placement::compute(
            &layer.transform,
            image.width() as f64,
            image.height() as f64,
            space,
            &self.mapping,
        );
        Ok(PreparedLayer { image, placement })
    }

    /// Composite the layers active at source time `t` over `frame`.
    ///
    /// `layers` is in z-order, bottom first. The frame is resized to the
    /// encode resolution when it differs.
    pub fn composite(&mut self, frame: &RgbaImage, t: f64, layers: &[Arc<Layer>]) -> Composite {
        let encode = self.mapping.encode();
        let mut image = if frame.dimensions() == (encode.width, encode.height) {
            frame.clone()
        } else {
            imageops::resize(frame, encode.width, encode.height, FilterType::Triangle)
        };

        let mut drawn = Vec::new();
        for layer in active_layers(layers, t) {
            if let Some(prepared) = self.prepared_layer(layer) {
                draw_sprite(&mut image, prepared);
                drawn.push(layer.id);
            }
        }

        Composite { image, drawn }
    }
}

/// Layers visible at `t`, in z-order.
pub fn active_layers(layers: &[Arc<Layer>], t: f64) -> impl Iterator<Item = &Layer> {
    layers
        .iter()
        .map(|layer| &**layer)
        .filter(move |layer| layer.is_active_at(t))
}

fn draw_sprite(target: &mut RgbaImage, prepared: &PreparedLayer) {
    let placement = &prepared.placement;
    let bounds = placement.bounds();
    debug_assert!(
        bounds.width.is_finite() && bounds.height.is_finite(),
        "placement produced non-finite bounds"
    );

    let x0 = bounds.x.floor().max(0.0) as u32;
    let y0 = bounds.y.floor().max(0.0) as u32;
    let x1 = (bounds.right().ceil().max(0.0) as u32).min(target.width());
    let y1 = (bounds.bottom().ceil().max(0.0) as u32).min(target.height());

    for y in y0..y1 {
        for x in x0..x1 {
            let Some((u, v)) = placement.to_sprite(x as f64 + 0.5, y as f64 + 0.5) else {
                continue;
            };
            let src = sample_bilinear(&prepared.image, u, v);
            if src[3] > 0 {
                blend_over(target.get_pixel_mut(x, y), src);
            }
        }
    }
}

/// Sample `sprite` at normalized `(u, v)` with bilinear filtering on
/// premultiplied color.
fn sample_bilinear(sprite: &RgbaImage, u: f64, v: f64) -> [u8; 4] {
    let (w, h) = sprite.dimensions();
    if w == 0 || h == 0 {
        return [0, 0, 0, 0];
    }
    let fx = (u * w as f64 - 0.5).clamp(0.0, (w - 1) as f64);
    let fy = (v * h as f64 - 0.5).clamp(0.0, (h - 1) as f64);
    let (ix, iy) = (fx.floor() as u32, fy.floor() as u32);
    let (ix1, iy1) = ((ix + 1).min(w - 1), (iy + 1).min(h - 1));
    let (tx, ty) = (fx - ix as f64, fy - iy as f64);

    let taps = [
        (sprite.get_pixel(ix, iy), (1.0 - tx) * (1.0 - ty)),
        (sprite.get_pixel(ix1, iy), tx * (1.0 - ty)),
        (sprite.get_pixel(ix, iy1), (1.0 - tx) * ty),
        (sprite.get_pixel(ix1, iy1), tx * ty),
    ];

    let mut acc = [0.0f64; 4];
    for (px, weight) in taps {
        let a = px[3] as f64 / 255.0;
        acc[0] += px[0] as f64 * a * weight;
        acc[1] += px[1] as f64 * a * weight;
        acc[2] += px[2] as f64 * a * weight;
        acc[3] += a * weight;
    }

    if acc[3] <= f64::EPSILON {
        return [0, 0, 0, 0];
    }
    [
        (acc[0] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[1] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[2] / acc[3]).round().clamp(0.0, 255.0) as u8,
        (acc[3] * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

/// Source-over blend of a straight-alpha color onto `dst`.
pub(crate) fn blend_over(dst: &mut Rgba<u8>, src: [u8; 4]) {
    let sa = src[3] as f32 / 255.0;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let blended = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}
