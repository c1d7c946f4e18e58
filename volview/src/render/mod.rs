//! Progressive multi-resolution rendering.
//!
//! # Architecture
//!
//! ```text
//!  host ──► FrameRequest ──► MultiResolutionRenderer::render
//!                                  │
//!          ┌───────────────────────┼─────────────────────────┐
//!          ▼                       ▼                         ▼
//!   level selection         VolatileCache::get_tile    Projector::paint_row
//!   (zoom, cache size)      (Blocking / Budgeted)      (rayon, per row)
//!                                  │                         │
//!                                  ▼                         ▼
//!                           IoBackoff (slow I/O)     ScreenBuffers ──► RenderTarget
//!
//!  loaded tile ──► RepaintCallback ──► RepaintSignal ──► PainterThread ──► render
//! ```

mod budget;
mod painter;
mod projector;
mod renderer;
mod request;
mod screen;
mod settings;

pub use budget::IoBackoff;
pub use painter::{Paintable, PainterThread, RepaintSignal};
pub use projector::{
    GreyRange, PassView, Projector, SliceProjector, TileSet, U16Block, VoxelBlock,
    DEFAULT_BACKGROUND,
};
pub use renderer::{
    FrameOutcome, FrameReport, FrameTermination, MultiResolutionRenderer, RenderError,
};
pub use request::{FrameRequest, ViewTransform};
pub use screen::{FrameSlot, RenderTarget, ScreenImage};
pub use settings::RenderSettings;
