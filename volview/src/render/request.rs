//! What to draw: the viewer transform and the frame size.

use std::fmt;

/// Maps level-0 voxel space onto the screen.
///
/// Screen position `p` of voxel `v` (both x/y) is `v * zoom + translation`. The
/// displayed plane is the z-slice `slice` in level-0 voxels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// Screen pixels per level-0 voxel at full screen resolution.
    pub zoom: f64,
    /// Screen position of voxel origin, in full-resolution pixels.
    pub translation: [f64; 2],
    /// z position of the displayed slice, in level-0 voxels.
    pub slice: f64,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            translation: [0.0, 0.0],
            slice: 0.0,
        }
    }
}

impl ViewTransform {
    /// Transform showing voxel (0, 0) at the screen origin.
    pub fn new(zoom: f64) -> Self {
        Self {
            zoom,
            ..Default::default()
        }
    }

    pub fn with_translation(mut self, x: f64, y: f64) -> Self {
        self.translation = [x, y];
        self
    }

    pub fn with_slice(mut self, slice: f64) -> Self {
        self.slice = slice;
        self
    }

    /// Level-0 voxel (x, y) under full-resolution screen position (sx, sy).
    pub fn screen_to_voxel(&self, sx: f64, sy: f64) -> [f64; 2] {
        [
            (sx - self.translation[0]) / self.zoom,
            (sy - self.translation[1]) / self.zoom,
        ]
    }
}

/// One request to render a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRequest {
    pub timepoint: u32,
    pub view: u32,
    pub transform: ViewTransform,
    /// Full-resolution screen width in pixels.
    pub width: u32,
    /// Full-resolution screen height in pixels.
    pub height: u32,
}

impl FrameRequest {
    pub fn new(timepoint: u32, view: u32, transform: ViewTransform, width: u32, height: u32) -> Self {
        Self {
            timepoint,
            view,
            transform,
            width,
            height,
        }
    }

    /// Size of the image rendered at `screen_scale` (never zero).
    pub fn scaled_size(&self, screen_scale: f64) -> (usize, usize) {
        let w = (self.width as f64 * screen_scale).ceil().max(1.0) as usize;
        let h = (self.height as f64 * screen_scale).ceil().max(1.0) as usize;
        (w, h)
    }
}

impl fmt::Display for FrameRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t{}/v{} {}x{} zoom {:.3} slice {:.1}",
            self.timepoint, self.view, self.width, self.height, self.transform.zoom, self.transform.slice
        )
    }
}
