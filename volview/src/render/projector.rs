//! Projection of cached tiles onto the screen.
//!
//! A [`Projector`] decides which tiles a render pass needs and paints screen rows
//! from whatever valid tiles the pass could get. Pixels whose tile at the selected
//! level is still pending are filled from the next coarser level that has data,
//! so a refining frame never shows holes where a coarser frame showed data.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{LoadError, TileData};
use crate::coord::{DatasetLayout, TileCoord};

use super::request::FrameRequest;

/// Opaque black.
pub const DEFAULT_BACKGROUND: u32 = 0xFF00_0000;

/// Geometry of one render pass.
#[derive(Debug, Clone, Copy)]
pub struct PassView<'a> {
    pub request: &'a FrameRequest,
    /// Fraction of the full screen resolution rendered by this pass.
    pub screen_scale: f64,
    /// Pyramid level selected for the pass.
    pub level: u8,
    /// Pass image width in pixels.
    pub width: usize,
    /// Pass image height in pixels.
    pub height: usize,
}

/// Valid tile data gathered for a pass.
#[derive(Debug)]
pub struct TileSet<P> {
    tiles: HashMap<TileCoord, Arc<P>>,
}

impl<P> Default for TileSet<P> {
    fn default() -> Self {
        Self {
            tiles: HashMap::new(),
        }
    }
}

impl<P> TileSet<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coord: TileCoord, data: Arc<P>) {
        self.tiles.insert(coord, data);
    }

    pub fn get(&self, coord: &TileCoord) -> Option<&P> {
        self.tiles.get(coord).map(Arc::as_ref)
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.tiles.contains_key(coord)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Maps tiles onto screen pixels.
pub trait Projector<P>: Send + Sync {
    /// Tiles of `level` covering the screen area of `pass`.
    fn required_tiles(&self, layout: &DatasetLayout, pass: &PassView<'_>, level: u8) -> Vec<TileCoord>;

    /// Paint row `y` of the pass image. Called concurrently for different rows.
    fn paint_row(
        &self,
        layout: &DatasetLayout,
        pass: &PassView<'_>,
        tiles: &TileSet<P>,
        y: usize,
        row: &mut [u32],
    );
}

// =============================================================================
// Voxel blocks
// =============================================================================

/// Tile data addressable voxel by voxel.
pub trait VoxelBlock: TileData {
    /// Value at `local` (cell-relative) position, `None` outside the block.
    fn voxel(&self, local: [u32; 3]) -> Option<f64>;
}

/// Block of unsigned 16-bit voxels, x varying fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct U16Block {
    dimensions: [u32; 3],
    data: Vec<u16>,
}

impl U16Block {
    /// Wrap `data`, which must hold exactly `dimensions` voxels.
    pub fn new(dimensions: [u32; 3], data: Vec<u16>) -> Result<Self, LoadError> {
        let expected: usize = dimensions.iter().map(|&d| d as usize).product();
        if data.len() != expected {
            return Err(LoadError::Format(format!(
                "block of {:?} needs {} voxels, got {}",
                dimensions,
                expected,
                data.len()
            )));
        }
        Ok(Self { dimensions, data })
    }

    pub fn dimensions(&self) -> [u32; 3] {
        self.dimensions
    }

    pub fn data(&self) -> &[u16] {
        &self.data
    }
}

impl TileData for U16Block {
    fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<u16>()
    }
}

impl VoxelBlock for U16Block {
    fn voxel(&self, local: [u32; 3]) -> Option<f64> {
        let [sx, sy, sz] = self.dimensions;
        if local[0] >= sx || local[1] >= sy || local[2] >= sz {
            return None;
        }
        let index = local[0] as usize + sx as usize * (local[1] as usize + sy as usize * local[2] as usize);
        self.data.get(index).map(|&v| v as f64)
    }
}

// =============================================================================
// Slice projector
// =============================================================================

/// Linear intensity window mapped to opaque grey.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreyRange {
    pub min: f64,
    pub max: f64,
}

impl Default for GreyRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: u16::MAX as f64,
        }
    }
}

impl GreyRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// ARGB grey for `value`.
    pub fn to_argb(&self, value: f64) -> u32 {
        let span = self.max - self.min;
        let t = if span > 0.0 {
            ((value - self.min) / span).clamp(0.0, 1.0)
        } else if value >= self.max {
            1.0
        } else {
            0.0
        };
        let g = (t * 255.0).round() as u32;
        0xFF00_0000 | (g << 16) | (g << 8) | g
    }
}

/// Nearest-neighbour projector for axis-aligned z slices.
#[derive(Debug, Clone, Copy)]
pub struct SliceProjector {
    range: GreyRange,
    background: u32,
}

impl Default for SliceProjector {
    fn default() -> Self {
        Self::new(GreyRange::default())
    }
}

impl SliceProjector {
    pub fn new(range: GreyRange) -> Self {
        Self {
            range,
            background: DEFAULT_BACKGROUND,
        }
    }

    /// Colour painted where no level has data.
    pub fn with_background(mut self, background: u32) -> Self {
        self.background = background;
        self
    }

    pub fn background(&self) -> u32 {
        self.background
    }
}

impl<P: VoxelBlock> Projector<P> for SliceProjector {
    fn required_tiles(&self, layout: &DatasetLayout, pass: &PassView<'_>, level: u8) -> Vec<TileCoord> {
        let Some(grid) = layout.level(level) else {
            return Vec::new();
        };
        let request = pass.request;
        let transform = &request.transform;
        let a = transform.screen_to_voxel(0.0, 0.0);
        let b = transform.screen_to_voxel(request.width as f64, request.height as f64);
        let f = grid.factors();
        let z = transform.slice / f[2];
        let min = [a[0].min(b[0]) / f[0], a[1].min(b[1]) / f[1], z];
        let max = [a[0].max(b[0]) / f[0], a[1].max(b[1]) / f[1], z];

        grid.cells_in_box(min, max)
            .map(|cell| TileCoord::new(request.timepoint, request.view, level, cell))
            .collect()
    }

    fn paint_row(
        &self,
        layout: &DatasetLayout,
        pass: &PassView<'_>,
        tiles: &TileSet<P>,
        y: usize,
        row: &mut [u32],
    ) {
        let request = pass.request;
        let transform = &request.transform;
        let sy = (y as f64 + 0.5) / pass.screen_scale;

        for (x, pixel) in row.iter_mut().enumerate() {
            *pixel = self.background;
            let sx = (x as f64 + 0.5) / pass.screen_scale;
            let [vx, vy] = transform.screen_to_voxel(sx, sy);

            // Selected level first, then coarser levels for pending tiles
            for level in pass.level..=layout.max_level() {
                let Some(grid) = layout.level(level) else {
                    break;
                };
                let f = grid.factors();
                let pos = [vx / f[0], vy / f[1], transform.slice / f[2]];
                if pos.iter().any(|&p| p < 0.0 || !p.is_finite()) {
                    break;
                }
                let voxel = [pos[0] as u64, pos[1] as u64, pos[2] as u64];
                let Some(cell) = grid.cell_at(voxel) else {
                    break;
                };
                let coord = TileCoord::new(request.timepoint, request.view, level, cell);
                if let Some(block) = tiles.get(&coord) {
                    let origin = grid.cell_interval(cell).min;
                    let local = [
                        (voxel[0] - origin[0]) as u32,
                        (voxel[1] - origin[1]) as u32,
                        (voxel[2] - origin[2]) as u32,
                    ];
                    if let Some(value) = block.voxel(local) {
                        *pixel = self.range.to_argb(value);
                    }
                    break;
                }
            }
        }
    }
}
