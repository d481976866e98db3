//! The overlay store and the editing session that owns it.
//!
//! Layers are held as immutable `Arc<Layer>` values in an id-keyed map
//! that preserves insertion order. Insertion order is compositing
//! z-order: later layers draw on top. Updates build a new layer value
//! and replace the map entry, so snapshots handed to an export never
//! observe later edits.

use std::ops::Deref;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::layer::{
    Layer, LayerError, LayerId, LayerKind, PixelSource, Scale, TextAlign, Timing,
};

/// Partial update for a layer. `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerPatch {
    pub transform: Option<TransformPatch>,
    pub timing: Option<TimingPatch>,
    /// Text layers only.
    pub content: Option<String>,
    /// Text layers only.
    pub style: Option<TextStylePatch>,
    /// Raster layers only.
    pub source: Option<PixelSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub scale: Option<Scale>,
    pub rotation: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingPatch {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStylePatch {
    pub font_size: Option<f64>,
    pub color: Option<String>,
    pub font_family: Option<String>,
    pub font_weight: Option<u16>,
    pub text_align: Option<TextAlign>,
}

impl LayerPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Patch that only moves the visibility window.
    pub fn timing(start: f64, end: f64) -> Self {
        Self {
            timing: Some(TimingPatch {
                start: Some(start),
                end: Some(end),
            }),
            ..Self::default()
        }
    }

    /// Patch that only moves the anchor.
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            transform: Some(TransformPatch {
                x: Some(x),
                y: Some(y),
                ..TransformPatch::default()
            }),
            ..Self::default()
        }
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.transform.get_or_insert_with(TransformPatch::default).scale = Some(scale);
        self
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.transform
            .get_or_insert_with(TransformPatch::default)
            .rotation = Some(degrees);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Merge this patch onto `layer`, producing the replacement value.
    fn apply(&self, layer: &Layer, video_duration: f64) -> Result<Layer, StoreError> {
        let mut next = layer.clone();

        if let Some(t) = &self.transform {
            let tr = &mut next.transform;
            tr.x = t.x.unwrap_or(tr.x);
            tr.y = t.y.unwrap_or(tr.y);
            tr.width = t.width.unwrap_or(tr.width);
            tr.height = t.height.unwrap_or(tr.height);
            tr.scale = t.scale.unwrap_or(tr.scale);
            tr.rotation = t.rotation.unwrap_or(tr.rotation);
        }

        if let Some(t) = &self.timing {
            let start = t.start.unwrap_or(layer.timing.start);
            let end = t.end.unwrap_or(layer.timing.end);
            next.timing = Timing::clamped(start, end, video_duration)?;
        }

        match &mut next.kind {
            LayerKind::Text { content, style } => {
                if self.source.is_some() {
                    return Err(StoreError::KindMismatch {
                        id: layer.id,
                        field: "source",
                    });
                }
                if let Some(c) = &self.content {
                    *content = c.clone();
                }
                if let Some(s) = &self.style {
                    style.font_size = s.font_size.unwrap_or(style.font_size);
                    if let Some(color) = &s.color {
                        style.color = color.clone();
                    }
                    if let Some(family) = &s.font_family {
                        style.font_family = family.clone();
                    }
                    style.font_weight = s.font_weight.unwrap_or(style.font_weight);
                    style.text_align = s.text_align.unwrap_or(style.text_align);
                }
            }
            LayerKind::Raster { source } => {
                if self.content.is_some() {
                    return Err(StoreError::KindMismatch {
                        id: layer.id,
                        field: "content",
                    });
                }
                if self.style.is_some() {
                    return Err(StoreError::KindMismatch {
                        id: layer.id,
                        field: "style",
                    });
                }
                if let Some(s) = &self.source {
                    *source = s.clone();
                }
            }
        }

        Ok(next)
    }
}

/// Immutable, cheaply clonable view of the store at one moment.
#[derive(Debug, Clone, Default)]
pub struct LayerSnapshot(Arc<[Arc<Layer>]>);

impl LayerSnapshot {
    pub fn new(layers: Vec<Arc<Layer>>) -> Self {
        Self(layers.into())
    }

    pub fn from_layers(layers: impl IntoIterator<Item = Layer>) -> Self {
        Self(layers.into_iter().map(Arc::new).collect())
    }
}

impl Deref for LayerSnapshot {
    type Target = [Arc<Layer>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Ordered collection of layers for one video.
#[derive(Debug, Clone)]
pub struct OverlayStore {
    video_duration: f64,
    layers: IndexMap<LayerId, Arc<Layer>>,
}

impl OverlayStore {
    /// Empty store for a video of the given duration (seconds).
    pub fn new(video_duration: f64) -> Self {
        Self {
            video_duration,
            layers: IndexMap::new(),
        }
    }

    /// Build a store from layers in z-order.
    pub fn from_layers(
        video_duration: f64,
        layers: impl IntoIterator<Item = Layer>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new(video_duration);
        for layer in layers {
            store.add(layer)?;
        }
        Ok(store)
    }

    pub fn video_duration(&self) -> f64 {
        self.video_duration
    }

    /// Append a layer on top. Its timing is clamped to the video.
    pub fn add(&mut self, mut layer: Layer) -> Result<LayerId, StoreError> {
        if self.layers.contains_key(&layer.id) {
            return Err(StoreError::DuplicateId(layer.id));
        }
        layer.timing = layer.timing.clamp_to(self.video_duration)?;
        let id = layer.id;
        self.layers.insert(id, Arc::new(layer));
        Ok(id)
    }

    /// Shallow-merge `patch` into the layer and replace its entry.
    ///
    /// On error the stored layer is unchanged.
    pub fn update(&mut self, id: LayerId, patch: &LayerPatch) -> Result<Arc<Layer>, StoreError> {
        let current = self.layers.get(&id).ok_or(StoreError::NotFound(id))?;
        if patch.is_empty() {
            return Ok(Arc::clone(current));
        }
        let next = Arc::new(patch.apply(current, self.video_duration)?);
        self.layers.insert(id, Arc::clone(&next));
        Ok(next)
    }

    /// Remove a layer. Unknown ids are ignored.
    pub fn remove(&mut self, id: LayerId) -> Option<Arc<Layer>> {
        self.layers.shift_remove(&id)
    }

    pub fn get(&self, id: LayerId) -> Option<&Arc<Layer>> {
        self.layers.get(&id)
    }

    /// Layers in z-order, bottom first.
    pub fn all(&self) -> impl Iterator<Item = &Arc<Layer>> {
        self.layers.values()
    }

    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot::new(self.layers.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Move a layer one step up in z-order. Returns false if it was
    /// already on top or does not exist.
    pub fn raise(&mut self, id: LayerId) -> bool {
        match self.layers.get_index_of(&id) {
            Some(idx) if idx + 1 < self.layers.len() => {
                self.layers.swap_indices(idx, idx + 1);
                true
            }
            _ => false,
        }
    }

    /// Move a layer one step down in z-order.
    pub fn lower(&mut self, id: LayerId) -> bool {
        match self.layers.get_index_of(&id) {
            Some(idx) if idx > 0 => {
                self.layers.swap_indices(idx, idx - 1);
                true
            }
            _ => false,
        }
    }
}

/// An interactive editing session: the store plus the current selection.
#[derive(Debug, Clone)]
pub struct EditSession {
    store: OverlayStore,
    selected: Option<LayerId>,
}

impl EditSession {
    pub fn new(store: OverlayStore) -> Self {
        Self {
            store,
            selected: None,
        }
    }

    pub fn store(&self) -> &OverlayStore {
        &self.store
    }

    pub fn add(&mut self, layer: Layer) -> Result<LayerId, StoreError> {
        self.store.add(layer)
    }

    pub fn update(&mut self, id: LayerId, patch: &LayerPatch) -> Result<Arc<Layer>, StoreError> {
        self.store.update(id, patch)
    }

    /// Remove a layer, dropping the selection if it pointed at it.
    pub fn remove(&mut self, id: LayerId) -> Option<Arc<Layer>> {
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.store.remove(id)
    }

    /// Select a layer. Unknown ids leave the selection unchanged.
    pub fn select(&mut self, id: LayerId) -> bool {
        if self.store.get(id).is_some() {
            self.selected = Some(id);
            true
        } else {
            false
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<LayerId> {
        self.selected
    }

    pub fn selected_layer(&self) -> Option<&Arc<Layer>> {
        self.selected.and_then(|id| self.store.get(id))
    }

    pub fn into_store(self) -> OverlayStore {
        self.store
    }
}

/// Errors returned by store mutations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Layer {0} already exists")]
    DuplicateId(LayerId),

    #[error("Layer {0} not found")]
    NotFound(LayerId),

    #[error("Field `{field}` does not apply to layer {id}")]
    KindMismatch { id: LayerId, field: &'static str },

    #[error(transparent)]
    Layer(#[from] LayerError),
}
