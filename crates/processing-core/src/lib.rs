//! Overlaycut Processing Core
//!
//! Turns the overlay collection into editing-surface structure:
//! - **Timeline Layout:** Pack timed layers into non-overlapping rows
//! - **Hit Testing:** Resolve which layer occupies a row at a time
//!
//! This crate is pure computation: no I/O, no platform dependencies.
//! All inputs are data; all outputs are data.

pub mod timeline_layout;

pub use timeline_layout::{layout, TimelineLayout};
