//! Tile coordinates and dataset geometry.
//!
//! A dataset is a set of image pyramids, one per (timepoint, view) pair. Every
//! level of a pyramid is partitioned into a regular grid of cells; one cell is the
//! unit of caching and loading and is addressed by a [`TileCoord`].

mod layout;
mod types;

pub use layout::{CellRange, DatasetLayout, LevelGrid};
pub use types::{CellInterval, CoordError, TileCoord};
