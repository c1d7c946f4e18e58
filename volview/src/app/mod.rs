//! Viewer bootstrap and lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                          Viewer                             │
//! │                                                             │
//! │  1. VolatileCache ──► LoadScheduler workers                 │
//! │  2. MultiResolutionRenderer (rayon paint pool)              │
//! │  3. PainterThread ◄── RepaintSignal ◄── tile loaded,        │
//! │                                         budget stop,        │
//! │                                         set_view            │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod error;
mod viewer;

pub use error::AppError;
pub use viewer::Viewer;
