//! Overlaycut Project Model
//!
//! Defines the core data contracts for overlaycut:
//! - **Layer:** Timed, transformable text and raster overlays
//! - **Store:** The ordered overlay collection and the editing session
//! - **Job:** Immutable export snapshots with trim and display geometry
//! - **Document:** The on-disk edit document used by the CLI
//!
//! Layer coordinates are authored in preview-display pixels; times are
//! seconds in source-video time.

pub mod document;
pub mod job;
pub mod layer;
pub mod store;

pub use document::*;
pub use job::*;
pub use layer::*;
pub use store::*;
