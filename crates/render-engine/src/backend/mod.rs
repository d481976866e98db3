//! Export backends.

pub mod graph;
pub mod streaming;

pub use graph::run_graph;
pub use streaming::{CaptureState, StopReason, StreamingExport};
