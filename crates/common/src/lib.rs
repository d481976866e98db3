//! Overlaycut Common Utilities
//!
//! Shared infrastructure for all overlaycut crates:
//! - Error taxonomy and result aliases
//! - Export clock and watchdog deadlines
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
