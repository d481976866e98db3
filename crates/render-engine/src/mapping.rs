//! Preview-space to encode-space coordinate reconciliation.
//!
//! Layer transforms are authored against the preview container, which
//! is usually smaller than the encoded output and may be letterboxed.
//! Both export backends place layers through [`Placement`] so that the
//! streaming compositor and the filter-graph path agree pixel for pixel
//! on where a layer lands.
//!
//! Placement rules:
//! - the unscaled box has its top-left at `(x·scaleX, y·scaleY)`
//! - scale is applied about the box center
//! - rotation (clockwise degrees) is applied about the same center,
//!   after scale

use overlaycut_project_model::job::Dimensions;
use overlaycut_project_model::layer::Transform;

/// Per-axis factors from preview pixels to encode pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceMapping {
    scale_x: f64,
    scale_y: f64,
    encode: Dimensions,
}

impl SpaceMapping {
    /// Compute the mapping once per export.
    pub fn new(display: Dimensions, encode: Dimensions) -> Self {
        debug_assert!(!display.is_empty(), "display dimensions must be non-zero");
        Self {
            scale_x: encode.width as f64 / display.width.max(1) as f64,
            scale_y: encode.height as f64 / display.height.max(1) as f64,
            encode,
        }
    }

    /// Mapping for layers authored directly in encode space.
    pub fn identity(encode: Dimensions) -> Self {
        Self::new(encode, encode)
    }

    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    pub fn encode(&self) -> Dimensions {
        self.encode
    }

    /// Single factor for font sizes. Glyphs cannot be stretched
    /// non-uniformly, so text uses the mean of both axes.
    pub fn font_scale(&self) -> f64 {
        (self.scale_x + self.scale_y) / 2.0
    }

    pub fn map_point(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale_x, y * self.scale_y)
    }
}

/// The space a sprite's pixel dimensions are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpriteSpace {
    /// Pixels at preview scale (drawings). Mapped by `scaleX/scaleY`.
    Display,
    /// Pixels already at encode scale (rasterized text). Not mapped again.
    Encode,
}

/// Axis-aligned rectangle in encode pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Where and how a sprite lands in encode space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Center of the element in encode pixels.
    pub center_x: f64,
    pub center_y: f64,
    /// Scaled size before rotation, in encode pixels.
    pub width: f64,
    pub height: f64,
    /// Clockwise degrees about the center.
    pub rotation_deg: f64,
}

impl Placement {
    /// Place a `sprite_w × sprite_h` sprite according to `transform`.
    pub fn compute(
        transform: &Transform,
        sprite_w: f64,
        sprite_h: f64,
        space: SpriteSpace,
        mapping: &SpaceMapping,
    ) -> Self {
        let (left, top) = mapping.map_point(transform.x, transform.y);
        let (base_w, base_h) = match space {
            SpriteSpace::Display => (sprite_w * mapping.scale_x, sprite_h * mapping.scale_y),
            SpriteSpace::Encode => (sprite_w, sprite_h),
        };
        Self {
            center_x: left + base_w / 2.0,
            center_y: top + base_h / 2.0,
            width: base_w * transform.scale.sx,
            height: base_h * transform.scale.sy,
            rotation_deg: transform.rotation,
        }
    }

    /// Top-left of the scaled, unrotated box.
    pub fn top_left(&self) -> (f64, f64) {
        (
            self.center_x - self.width / 2.0,
            self.center_y - self.height / 2.0,
        )
    }

    pub fn is_rotated(&self) -> bool {
        self.rotation_deg.rem_euclid(360.0).abs() > 1e-9
    }

    /// Axis-aligned bounds of the rotated box.
    pub fn bounds(&self) -> Bounds {
        let (sin, cos) = self.rotation_deg.to_radians().sin_cos();
        let half_w = self.width.abs() / 2.0;
        let half_h = self.height.abs() / 2.0;
        let extent_x = half_w * cos.abs() + half_h * sin.abs();
        let extent_y = half_w * sin.abs() + half_h * cos.abs();
        Bounds {
            x: self.center_x - extent_x,
            y: self.center_y - extent_y,
            width: extent_x * 2.0,
            height: extent_y * 2.0,
        }
    }

    /// Map an encode-space point back into the sprite.
    ///
    /// Returns normalized `(u, v)` in `[0, 1)` when the point falls on
    /// the sprite. Undoes rotation first, then scale, mirroring the
    /// forward order.
    pub fn to_sprite(&self, px: f64, py: f64) -> Option<(f64, f64)> {
        if self.width.abs() < f64::EPSILON || self.height.abs() < f64::EPSILON {
            return None;
        }
        let (sin, cos) = self.rotation_deg.to_radians().sin_cos();
        let dx = px - self.center_x;
        let dy = py - self.center_y;
        let local_x = dx * cos + dy * sin;
        let local_y = -dx * sin + dy * cos;
        let u = local_x / self.width + 0.5;
        let v = local_y / self.height + 0.5;
        if (0.0..1.0).contains(&u) && (0.0..1.0).contains(&v) {
            Some((u, v))
        } else {
            None
        }
    }
}

/// Round to the nearest even integer, at least 2. Block-based encoders
/// with chroma subsampling reject odd frame dimensions.
pub fn round_even(value: f64) -> u32 {
    let even = (value.max(0.0) / 2.0).round() * 2.0;
    (even as u32).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlaycut_project_model::layer::Scale;

    fn mapping_400_to_1080p() -> SpaceMapping {
        SpaceMapping::new(Dimensions::new(400, 225), Dimensions::new(1920, 1080))
    }

    #[test]
    fn test_scale_factors() {
        let mapping = mapping_400_to_1080p();
        assert!((mapping.scale_x() - 4.8).abs() < 1e-9);
        assert!((mapping.scale_y() - 4.8).abs() < 1e-9);
        assert!((mapping.font_scale() - 4.8).abs() < 1e-9);
    }

    #[test]
    fn test_font_scale_averages_non_uniform_axes() {
        let mapping = SpaceMapping::new(Dimensions::new(100, 100), Dimensions::new(200, 400));
        assert!((mapping.font_scale() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_raster_top_left_maps_to_encode_space() {
        let mapping = mapping_400_to_1080p();
        let transform = Transform::at(50.0, 50.0, 40.0, 20.0);
        let placement = Placement::compute(&transform, 40.0, 20.0, SpriteSpace::Display, &mapping);

        let (x, y) = placement.top_left();
        assert!((x - 240.0).abs() < 1e-9);
        assert!((y - 240.0).abs() < 1e-9);
        assert!((placement.width - 192.0).abs() < 1e-9);
        assert!((placement.height - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_encode_space_sprite_is_not_rescaled() {
        let mapping = mapping_400_to_1080p();
        let transform = Transform::at(50.0, 50.0, 40.0, 20.0);
        let placement = Placement::compute(&transform, 300.0, 80.0, SpriteSpace::Encode, &mapping);

        assert!((placement.width - 300.0).abs() < 1e-9);
        assert!((placement.height - 80.0).abs() < 1e-9);
        assert_eq!(placement.top_left(), (240.0, 240.0));
    }

    #[test]
    fn test_scale_is_about_center() {
        let mapping = SpaceMapping::identity(Dimensions::new(100, 100));
        let mut transform = Transform::at(10.0, 10.0, 20.0, 20.0);
        transform.scale = Scale::uniform(2.0);
        let placement = Placement::compute(&transform, 20.0, 20.0, SpriteSpace::Display, &mapping);

        assert_eq!((placement.center_x, placement.center_y), (20.0, 20.0));
        assert_eq!(placement.top_left(), (0.0, 0.0));
    }

    #[test]
    fn test_scale_applies_before_rotation() {
        // 10x10 sprite stretched 2x horizontally, then turned 90 degrees:
        // the result stands 20 tall and 10 wide. Rotating first would
        // leave it 20 wide.
        let mapping = SpaceMapping::identity(Dimensions::new(100, 100));
        let mut transform = Transform::at(0.0, 0.0, 10.0, 10.0);
        transform.scale = Scale { sx: 2.0, sy: 1.0 };
        transform.rotation = 90.0;
        let placement = Placement::compute(&transform, 10.0, 10.0, SpriteSpace::Display, &mapping);

        let bounds = placement.bounds();
        assert!((bounds.width - 10.0).abs() < 1e-9);
        assert!((bounds.height - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_to_sprite_inverts_rotation() {
        let mapping = SpaceMapping::identity(Dimensions::new(100, 100));
        let mut transform = Transform::at(40.0, 45.0, 20.0, 10.0);
        transform.rotation = 90.0;
        let placement = Placement::compute(&transform, 20.0, 10.0, SpriteSpace::Display, &mapping);

        // Center is (50, 50). Clockwise 90deg sends the sprite's right
        // edge to the bottom.
        let (u, v) = placement.to_sprite(50.0, 58.0).unwrap();
        assert!(u > 0.85 && (v - 0.5).abs() < 1e-9);

        // Unrotated the sprite spans x in [40, 60]; rotated it does not
        // reach x = 58 on the center row.
        assert!(placement.to_sprite(58.0, 50.0).is_none());
    }

    #[test]
    fn test_round_even() {
        assert_eq!(round_even(191.0), 192);
        assert_eq!(round_even(192.9), 192);
        assert_eq!(round_even(193.1), 194);
        assert_eq!(round_even(0.4), 2);
    }
}
