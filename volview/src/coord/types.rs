//! Core coordinate types.

use std::fmt;
use thiserror::Error;

/// Errors raised while building or addressing a dataset layout.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoordError {
    /// A layout must have at least one resolution level.
    #[error("dataset layout has no resolution levels")]
    EmptyPyramid,

    /// A layout must have at least one timepoint and one view.
    #[error("dataset layout needs at least one timepoint and one view (got {timepoints}x{views})")]
    EmptyAxis { timepoints: u32, views: u32 },

    /// Level dimensions must be non-zero on every axis.
    #[error("level {level} has a zero-sized dimension: {dimensions:?}")]
    ZeroDimension { level: usize, dimensions: [u64; 3] },

    /// Cell (block) dimensions must be non-zero on every axis.
    #[error("level {level} has a zero-sized cell: {cell:?}")]
    ZeroCellDimension { level: usize, cell: [u32; 3] },

    /// Downsampling factors must be >= 1 and must not shrink from one level to the next.
    #[error("level {level} has invalid downsampling factors {factors:?}")]
    InvalidFactors { level: usize, factors: [f64; 3] },

    /// A tile coordinate that does not address any cell of the layout.
    #[error("tile {coord} is out of bounds: {reason}")]
    OutOfBounds { coord: TileCoord, reason: String },
}

/// Identifies one cell of one resolution level of one view at one timepoint.
///
/// This is the cache key. Level 0 is the full-resolution level; higher levels are
/// progressively coarser. `cell` is a linear index into the level's cell grid
/// (x varies fastest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileCoord {
    /// Timepoint index.
    pub timepoint: u32,
    /// View (setup) index.
    pub view: u32,
    /// Resolution level, 0 = finest.
    pub level: u8,
    /// Linear cell index within the level grid.
    pub cell: u64,
}

impl TileCoord {
    /// Create a new tile coordinate.
    pub fn new(timepoint: u32, view: u32, level: u8, cell: u64) -> Self {
        Self {
            timepoint,
            view,
            level,
            cell,
        }
    }

    /// Returns the coordinate of the same cell index at another level.
    ///
    /// Only meaningful for grouping; cell indices are not preserved geometrically
    /// across levels.
    pub fn with_level(self, level: u8) -> Self {
        Self { level, ..self }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t{}/v{}/l{}/c{}",
            self.timepoint, self.view, self.level, self.cell
        )
    }
}

/// Voxel-space extent of a single cell at its own level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellInterval {
    /// First voxel covered by the cell (level coordinates).
    pub min: [u64; 3],
    /// Number of voxels covered on each axis. Border cells may be smaller than
    /// the nominal cell size.
    pub size: [u32; 3],
}

impl CellInterval {
    /// Number of voxels in the cell.
    pub fn voxel_count(&self) -> u64 {
        self.size.iter().map(|&s| s as u64).product()
    }

    /// Whether a level-space voxel position lies inside this cell.
    pub fn contains(&self, pos: [u64; 3]) -> bool {
        (0..3).all(|d| pos[d] >= self.min[d] && pos[d] < self.min[d] + self.size[d] as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tile_coord_equality_and_hash() {
        let mut set = HashSet::new();
        set.insert(TileCoord::new(0, 1, 2, 3));
        set.insert(TileCoord::new(0, 1, 2, 3));
        set.insert(TileCoord::new(0, 1, 2, 4));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_tile_coord_display() {
        let coord = TileCoord::new(4, 1, 2, 17);
        assert_eq!(coord.to_string(), "t4/v1/l2/c17");
    }

    #[test]
    fn test_with_level() {
        let coord = TileCoord::new(1, 0, 0, 9).with_level(3);
        assert_eq!(coord.level, 3);
        assert_eq!(coord.cell, 9);
    }

    #[test]
    fn test_cell_interval_contains() {
        let interval = CellInterval {
            min: [32, 0, 0],
            size: [32, 32, 1],
        };
        assert_eq!(interval.voxel_count(), 1024);
        assert!(interval.contains([32, 31, 0]));
        assert!(!interval.contains([64, 0, 0]));
        assert!(!interval.contains([31, 0, 0]));
    }
}
