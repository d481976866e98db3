//! Overlaycut Render Engine
//!
//! Turns an export job (source video, trim window, layer snapshot) into
//! an encoded video with the overlays burned in.
//!
//! # Pipeline Architecture
//!
//! ```text
//!                     ┌──────────────┐
//! ExportJob ─────────▶│    router    │
//!                     └──────┬───────┘
//!              no layers     │     layers + frame access
//!          ┌─────────────────┴──────────────────┐
//!          ▼                                    ▼
//!   graph backend                        streaming backend
//!   stills ─▶ filter_complex              playback ─▶ compositor
//!          │  (loop/scale/rotate/overlay)        │
//!          ▼                                     ▼
//!   one ffmpeg invocation                 encoder sink (ffmpeg)
//!          │                                     │
//!          └──────────────┬──────────────────────┘
//!                         ▼
//!                   output bytes
//! ```
//!
//! Both backends place layers through [`mapping`], so a layer lands on
//! the same encode pixels whichever path renders it.

pub mod backend;
pub mod compositor;
pub mod export;
pub mod ffmpeg;
pub mod filter_graph;
pub mod mapping;
pub mod media;
pub mod router;
pub mod text;

pub use export::*;
pub use router::{route, ExportRoute, ExportStrategy, RuntimeCapabilities};
