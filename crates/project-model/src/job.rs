//! Export job types.
//!
//! An export job freezes everything an export needs at the moment it
//! starts: the source, the trim window, a snapshot of the layers, and
//! the preview dimensions the layers were authored against.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::layer::Layer;
use crate::store::LayerSnapshot;

/// Pixel dimensions of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Sub-interval of the source selected for export, in source seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

impl TrimRange {
    /// Validate `0 <= start < end <= source_duration`.
    pub fn new(start: f64, end: f64, source_duration: f64) -> Result<Self, JobError> {
        let valid = start.is_finite()
            && end.is_finite()
            && start >= 0.0
            && start < end
            && end <= source_duration;
        if !valid {
            return Err(JobError::InvalidTrim {
                start,
                end,
                source_duration,
            });
        }
        Ok(Self { start, end })
    }

    /// The whole source.
    pub fn full(source_duration: f64) -> Result<Self, JobError> {
        Self::new(0.0, source_duration, source_duration)
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Convert source time to export-relative time.
    pub fn to_export_time(&self, source_secs: f64) -> f64 {
        source_secs - self.start
    }

    /// Convert export-relative time back to source time.
    pub fn to_source_time(&self, export_secs: f64) -> f64 {
        export_secs + self.start
    }
}

/// Immutable input of one export run.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub video_source: PathBuf,
    pub source_duration: f64,
    pub trim: TrimRange,
    pub layers: LayerSnapshot,
    /// Preview container size the layer transforms were authored in.
    pub display: Dimensions,
}

impl ExportJob {
    pub fn new(
        video_source: impl Into<PathBuf>,
        source_duration: f64,
        trim: TrimRange,
        layers: LayerSnapshot,
        display: Dimensions,
    ) -> Result<Self, JobError> {
        if display.is_empty() {
            return Err(JobError::InvalidDisplay {
                width: display.width,
                height: display.height,
            });
        }
        // Re-validate in case the range was built for another source.
        let trim = TrimRange::new(trim.start, trim.end, source_duration)?;
        Ok(Self {
            video_source: video_source.into(),
            source_duration,
            trim,
            layers,
            display,
        })
    }

    pub fn export_duration(&self) -> f64 {
        self.trim.duration()
    }

    /// Layers with a non-empty overlap with the trim window, in z-order.
    pub fn layers_in_trim(&self) -> impl Iterator<Item = &Arc<Layer>> {
        let trim = self.trim;
        self.layers
            .iter()
            .filter(move |layer| layer.timing.overlaps_range(trim.start, trim.end))
    }

    /// Same job without overlays (trim-only fallback).
    pub fn without_layers(&self) -> Self {
        Self {
            layers: LayerSnapshot::default(),
            ..self.clone()
        }
    }
}

/// Errors raised while building an export job.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error(
        "Invalid trim range [{start}, {end}] for a {source_duration}s source: need 0 <= start < end <= duration"
    )]
    InvalidTrim {
        start: f64,
        end: f64,
        source_duration: f64,
    },

    #[error("Invalid display dimensions {width}x{height}")]
    InvalidDisplay { width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{TextStyle, Timing};

    fn layer(start: f64, end: f64) -> Layer {
        Layer::text(
            "t",
            TextStyle::default(),
            0.0,
            0.0,
            Timing::new(start, end).unwrap(),
        )
    }

    #[test]
    fn test_trim_validation() {
        assert!(TrimRange::new(2.0, 7.0, 10.0).is_ok());
        assert!(TrimRange::new(7.0, 7.0, 10.0).is_err());
        assert!(TrimRange::new(2.0, 11.0, 10.0).is_err());
        assert!(TrimRange::new(-0.5, 1.0, 10.0).is_err());
    }

    #[test]
    fn test_export_time_is_relative_to_trim_start() {
        let trim = TrimRange::new(2.0, 7.0, 10.0).unwrap();
        assert_eq!(trim.duration(), 5.0);
        assert_eq!(trim.to_export_time(3.5), 1.5);
        assert_eq!(trim.to_source_time(1.5), 3.5);
    }

    #[test]
    fn test_layers_outside_trim_are_filtered() {
        let layers = LayerSnapshot::from_layers(vec![
            layer(0.0, 2.0),  // ends exactly at trim start
            layer(0.0, 10.0), // covers trim
            layer(6.5, 9.0),  // partially inside
            layer(7.0, 9.0),  // starts exactly at trim end
        ]);
        let job = ExportJob::new(
            "in.mp4",
            10.0,
            TrimRange::new(2.0, 7.0, 10.0).unwrap(),
            layers.clone(),
            Dimensions::new(400, 225),
        )
        .unwrap();

        let kept: Vec<_> = job.layers_in_trim().map(|l| l.id).collect();
        assert_eq!(kept, vec![layers[1].id, layers[2].id]);
    }

    #[test]
    fn test_job_rejects_empty_display() {
        let err = ExportJob::new(
            "in.mp4",
            10.0,
            TrimRange::full(10.0).unwrap(),
            LayerSnapshot::default(),
            Dimensions::new(0, 225),
        )
        .unwrap_err();
        assert_eq!(
            err,
            JobError::InvalidDisplay {
                width: 0,
                height: 225
            }
        );
    }
}
