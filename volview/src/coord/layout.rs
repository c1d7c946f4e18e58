//! Resolution pyramid and cell grid geometry.

use super::types::{CellInterval, CoordError, TileCoord};

/// Geometry of one resolution level: its voxel dimensions, the block size used to
/// partition it into cells, and its downsampling factors relative to level 0.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelGrid {
    dimensions: [u64; 3],
    cell_dimensions: [u32; 3],
    factors: [f64; 3],
}

impl LevelGrid {
    /// Create a level grid.
    ///
    /// `level` is only used to label errors.
    pub fn new(
        level: usize,
        dimensions: [u64; 3],
        cell_dimensions: [u32; 3],
        factors: [f64; 3],
    ) -> Result<Self, CoordError> {
        if dimensions.iter().any(|&d| d == 0) {
            return Err(CoordError::ZeroDimension { level, dimensions });
        }
        if cell_dimensions.iter().any(|&c| c == 0) {
            return Err(CoordError::ZeroCellDimension {
                level,
                cell: cell_dimensions,
            });
        }
        if factors.iter().any(|&f| !f.is_finite() || f < 1.0) {
            return Err(CoordError::InvalidFactors { level, factors });
        }
        Ok(Self {
            dimensions,
            cell_dimensions,
            factors,
        })
    }

    /// Voxel dimensions of this level.
    pub fn dimensions(&self) -> [u64; 3] {
        self.dimensions
    }

    /// Nominal cell dimensions.
    pub fn cell_dimensions(&self) -> [u32; 3] {
        self.cell_dimensions
    }

    /// Downsampling factors relative to level 0.
    pub fn factors(&self) -> [f64; 3] {
        self.factors
    }

    /// Number of cells along each axis.
    pub fn grid_dimensions(&self) -> [u64; 3] {
        let mut grid = [0u64; 3];
        for (d, g) in grid.iter_mut().enumerate() {
            *g = self.dimensions[d].div_ceil(self.cell_dimensions[d] as u64);
        }
        grid
    }

    /// Total number of cells in the level.
    pub fn num_cells(&self) -> u64 {
        self.grid_dimensions().iter().product()
    }

    /// Voxels in a full (non-border) cell.
    pub fn cell_voxel_count(&self) -> u64 {
        self.cell_dimensions.iter().map(|&c| c as u64).product()
    }

    /// Linear cell index of a grid position. x varies fastest.
    pub fn cell_index(&self, grid_pos: [u64; 3]) -> u64 {
        let grid = self.grid_dimensions();
        grid_pos[0] + grid[0] * (grid_pos[1] + grid[1] * grid_pos[2])
    }

    /// Grid position of a linear cell index.
    pub fn cell_position(&self, index: u64) -> [u64; 3] {
        let grid = self.grid_dimensions();
        let x = index % grid[0];
        let rest = index / grid[0];
        [x, rest % grid[1], rest / grid[1]]
    }

    /// Voxel interval covered by a cell, clipped at the level border.
    pub fn cell_interval(&self, index: u64) -> CellInterval {
        let pos = self.cell_position(index);
        let mut min = [0u64; 3];
        let mut size = [0u32; 3];
        for d in 0..3 {
            let cell = self.cell_dimensions[d] as u64;
            min[d] = pos[d] * cell;
            size[d] = cell.min(self.dimensions[d].saturating_sub(min[d])) as u32;
        }
        CellInterval { min, size }
    }

    /// Cell containing a level-space voxel position, if inside the level.
    pub fn cell_at(&self, voxel: [u64; 3]) -> Option<u64> {
        if (0..3).any(|d| voxel[d] >= self.dimensions[d]) {
            return None;
        }
        let mut grid_pos = [0u64; 3];
        for d in 0..3 {
            grid_pos[d] = voxel[d] / self.cell_dimensions[d] as u64;
        }
        Some(self.cell_index(grid_pos))
    }

    /// Cells intersecting the level-space box `[min, max]` (inclusive, in voxels).
    ///
    /// The box is clipped to the level; an empty range is returned when it lies
    /// entirely outside.
    pub fn cells_in_box(&self, min: [f64; 3], max: [f64; 3]) -> CellRange {
        let grid = self.grid_dimensions();
        let mut lo = [0u64; 3];
        let mut hi = [0u64; 3];
        for d in 0..3 {
            let extent = self.dimensions[d] as f64;
            if max[d] < 0.0 || min[d] >= extent || max[d] < min[d] {
                return CellRange::empty(grid);
            }
            let cell = self.cell_dimensions[d] as f64;
            lo[d] = (min[d].max(0.0) / cell).floor() as u64;
            hi[d] = ((max[d].min(extent - 1.0)) / cell).floor() as u64;
            hi[d] = hi[d].min(grid[d] - 1);
        }
        CellRange::new(grid, lo, hi)
    }
}

/// Iterator over the linear indices of a rectangular block of cells.
#[derive(Debug, Clone)]
pub struct CellRange {
    grid: [u64; 3],
    lo: [u64; 3],
    hi: [u64; 3],
    next: Option<[u64; 3]>,
}

impl CellRange {
    fn new(grid: [u64; 3], lo: [u64; 3], hi: [u64; 3]) -> Self {
        Self {
            grid,
            lo,
            hi,
            next: Some(lo),
        }
    }

    fn empty(grid: [u64; 3]) -> Self {
        Self {
            grid,
            lo: [0; 3],
            hi: [0; 3],
            next: None,
        }
    }

    /// Number of cells in the range, without consuming it.
    pub fn cell_count(&self) -> u64 {
        if self.next.is_none() {
            return 0;
        }
        (0..3).map(|d| self.hi[d] - self.lo[d] + 1).product()
    }
}

impl Iterator for CellRange {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let pos = self.next?;
        let index = pos[0] + self.grid[0] * (pos[1] + self.grid[1] * pos[2]);

        let mut advanced = pos;
        self.next = None;
        for d in 0..3 {
            if advanced[d] < self.hi[d] {
                advanced[d] += 1;
                self.next = Some(advanced);
                break;
            }
            advanced[d] = self.lo[d];
        }
        Some(index)
    }
}

/// Shape of a multi-timepoint, multi-view image pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetLayout {
    num_timepoints: u32,
    num_views: u32,
    levels: Vec<LevelGrid>,
    bytes_per_voxel: usize,
}

impl DatasetLayout {
    /// Create a layout from explicit level grids (finest first).
    pub fn new(
        num_timepoints: u32,
        num_views: u32,
        levels: Vec<LevelGrid>,
        bytes_per_voxel: usize,
    ) -> Result<Self, CoordError> {
        if num_timepoints == 0 || num_views == 0 {
            return Err(CoordError::EmptyAxis {
                timepoints: num_timepoints,
                views: num_views,
            });
        }
        if levels.is_empty() || levels.len() > u8::MAX as usize + 1 {
            return Err(CoordError::EmptyPyramid);
        }
        for (level, pair) in levels.windows(2).enumerate() {
            let (finer, coarser) = (&pair[0], &pair[1]);
            if (0..3).any(|d| coarser.factors[d] < finer.factors[d]) {
                return Err(CoordError::InvalidFactors {
                    level: level + 1,
                    factors: coarser.factors,
                });
            }
        }
        Ok(Self {
            num_timepoints,
            num_views,
            levels,
            bytes_per_voxel,
        })
    }

    /// Build a power-of-two pyramid: each level halves every axis of the previous
    /// one (never below one voxel), all levels share the same cell size.
    pub fn pyramid(
        num_timepoints: u32,
        num_views: u32,
        dimensions: [u64; 3],
        cell_dimensions: [u32; 3],
        num_levels: usize,
        bytes_per_voxel: usize,
    ) -> Result<Self, CoordError> {
        let mut levels = Vec::with_capacity(num_levels);
        for level in 0..num_levels {
            let factor = (1u64 << level.min(62)) as f64;
            let mut dims = [0u64; 3];
            for d in 0..3 {
                dims[d] = (dimensions[d] >> level.min(63)).max(1);
            }
            levels.push(LevelGrid::new(
                level,
                dims,
                cell_dimensions,
                [factor, factor, factor],
            )?);
        }
        Self::new(num_timepoints, num_views, levels, bytes_per_voxel)
    }

    /// Number of timepoints.
    pub fn num_timepoints(&self) -> u32 {
        self.num_timepoints
    }

    /// Number of views (setups).
    pub fn num_views(&self) -> u32 {
        self.num_views
    }

    /// Number of resolution levels.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Index of the coarsest level.
    pub fn max_level(&self) -> u8 {
        (self.levels.len() - 1) as u8
    }

    /// All level grids, finest first.
    pub fn levels(&self) -> &[LevelGrid] {
        &self.levels
    }

    /// Grid of one level.
    pub fn level(&self, level: u8) -> Option<&LevelGrid> {
        self.levels.get(level as usize)
    }

    /// Bytes per voxel of the stored pixel type.
    pub fn bytes_per_voxel(&self) -> usize {
        self.bytes_per_voxel
    }

    /// Upper bound on the byte size of one tile of `level`.
    pub fn tile_bytes(&self, level: u8) -> u64 {
        self.level(level)
            .map(|grid| grid.cell_voxel_count() * self.bytes_per_voxel as u64)
            .unwrap_or(0)
    }

    /// Check that a coordinate addresses an existing cell.
    pub fn check(&self, coord: &TileCoord) -> Result<(), CoordError> {
        let out_of_bounds = |reason: String| CoordError::OutOfBounds {
            coord: *coord,
            reason,
        };
        if coord.timepoint >= self.num_timepoints {
            return Err(out_of_bounds(format!(
                "timepoint must be < {}",
                self.num_timepoints
            )));
        }
        if coord.view >= self.num_views {
            return Err(out_of_bounds(format!("view must be < {}", self.num_views)));
        }
        let grid = self
            .level(coord.level)
            .ok_or_else(|| out_of_bounds(format!("level must be <= {}", self.max_level())))?;
        if coord.cell >= grid.num_cells() {
            return Err(out_of_bounds(format!(
                "cell must be < {}",
                grid.num_cells()
            )));
        }
        Ok(())
    }
}
