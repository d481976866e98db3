//! Timeline row packing.
//!
//! Layers are stacked into rows so that no two layers in the same row
//! overlap in time. The assignment is a greedy first-fit over layers
//! sorted by start time, which yields the minimum number of rows for
//! interval sets and is stable across re-renders: the same input always
//! produces the same rows.

use std::collections::HashMap;

use serde::Serialize;

use overlaycut_project_model::layer::{Layer, LayerId, Timing};

/// Row assignment for a set of layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineLayout {
    row_of: HashMap<LayerId, usize>,
    rows: Vec<Vec<PlacedLayer>>,
}

/// A layer's clamped window within its row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacedLayer {
    pub id: LayerId,
    pub start: f64,
    pub end: f64,
}

impl TimelineLayout {
    /// Row index of a layer, if it was laid out.
    pub fn row_of(&self, id: LayerId) -> Option<usize> {
        self.row_of.get(&id).copied()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Layers per row, each row ordered by start time.
    pub fn rows(&self) -> &[Vec<PlacedLayer>] {
        &self.rows
    }

    /// The layer occupying `row` at time `t`, if any.
    ///
    /// Windows are inclusive; where two touching layers share a boundary
    /// the later one wins, so a drag handle at the seam grabs the layer
    /// that starts there.
    pub fn hit_test(&self, row: usize, t: f64) -> Option<LayerId> {
        self.rows
            .get(row)?
            .iter()
            .rev()
            .find(|placed| placed.start <= t && t <= placed.end)
            .map(|placed| placed.id)
    }
}

/// Pack `layers` into non-overlapping rows.
///
/// Timings are clamped to `[0, duration]` first. Layers are visited in
/// start order (ties keep the input order) and each goes into the first
/// row whose last layer ends at or before its start; otherwise a new
/// row is opened.
pub fn layout<L: AsRef<Layer>>(layers: &[L], duration: f64) -> TimelineLayout {
    let mut items: Vec<PlacedLayer> = layers
        .iter()
        .map(|layer| {
            let layer = layer.as_ref();
            debug_assert!(
                layer.timing.is_valid(),
                "layer {} reached layout with invalid timing",
                layer.id
            );
            let Timing { start, end } = layer.timing;
            let max = duration.max(0.0);
            PlacedLayer {
                id: layer.id,
                start: start.clamp(0.0, max),
                end: end.clamp(0.0, max),
            }
        })
        .collect();

    // `sort_by` is stable, so equal starts keep store order.
    items.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut rows: Vec<Vec<PlacedLayer>> = Vec::new();
    let mut row_of = HashMap::with_capacity(items.len());

    for item in items {
        let slot = rows.iter().position(|row| {
            row.last()
                .map(|last| last.end <= item.start)
                .unwrap_or(true)
        });
        let row = match slot {
            Some(idx) => {
                rows[idx].push(item);
                idx
            }
            None => {
                rows.push(vec![item]);
                rows.len() - 1
            }
        };
        row_of.insert(item.id, row);
    }

    tracing::trace!(layers = layers.len(), rows = rows.len(), "Timeline laid out");

    TimelineLayout { row_of, rows }
}
