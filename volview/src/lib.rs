//! volview - progressive multi-resolution viewing of large volumetric datasets.
//!
//! The crate provides the data path of an interactive volume viewer:
//!
//! - [`coord`]: tile coordinates and the geometry of multi-resolution pyramids
//! - [`cache`]: a bounded, volatile tile cache with blocking and budgeted loads
//! - [`executor`]: the prioritised load queue and background loader pool
//! - [`render`]: the time-budgeted coarse-to-fine renderer and its paint thread
//! - [`app`]: a [`Viewer`](app::Viewer) wiring all of the above together
//!
//! Storage formats stay outside the crate; hosts supply a
//! [`TileLoader`](cache::TileLoader) for their format and a
//! [`RenderTarget`](render::RenderTarget) for their display.

pub mod app;
pub mod cache;
pub mod config;
pub mod coord;
pub mod executor;
pub mod logging;
pub mod render;
pub mod telemetry;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
