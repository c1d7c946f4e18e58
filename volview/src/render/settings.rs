//! Renderer tuning knobs.

use std::time::Duration;

use crate::config::{
    ConfigError, DEFAULT_BAD_IO_FRAME_BLOCK_FRAMES, DEFAULT_DOUBLE_BUFFERED, DEFAULT_IO_BUDGET_MS,
    DEFAULT_QUALITY_BUDGET_MS, DEFAULT_RENDERING_THREADS, DEFAULT_SCREEN_SCALES,
};

use super::projector::DEFAULT_BACKGROUND;

/// Settings for a [`MultiResolutionRenderer`](super::MultiResolutionRenderer).
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// Screen scales, finest first, strictly descending, each in (0, 1].
    pub screen_scales: Vec<f64>,

    /// Wall-clock budget per frame; refinement stops once it is spent.
    pub quality_budget: Duration,

    /// Blocking-load time per frame above which the frame counts as slow.
    pub io_budget: Duration,

    /// Consecutive slow frames before refinement is capped.
    pub bad_io_frame_block_frames: u32,

    /// Render into a back buffer per scale while the front buffer is displayed.
    pub double_buffered: bool,

    /// Threads painting each pass.
    pub rendering_threads: usize,

    /// Background colour (ARGB) for areas without data.
    pub background: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            screen_scales: DEFAULT_SCREEN_SCALES.to_vec(),
            quality_budget: Duration::from_millis(DEFAULT_QUALITY_BUDGET_MS),
            io_budget: Duration::from_millis(DEFAULT_IO_BUDGET_MS),
            bad_io_frame_block_frames: DEFAULT_BAD_IO_FRAME_BLOCK_FRAMES,
            double_buffered: DEFAULT_DOUBLE_BUFFERED,
            rendering_threads: DEFAULT_RENDERING_THREADS,
            background: DEFAULT_BACKGROUND,
        }
    }
}

impl RenderSettings {
    pub fn with_screen_scales(mut self, scales: Vec<f64>) -> Self {
        self.screen_scales = scales;
        self
    }

    pub fn with_quality_budget(mut self, budget: Duration) -> Self {
        self.quality_budget = budget;
        self
    }

    pub fn with_io_budget(mut self, budget: Duration, block_frames: u32) -> Self {
        self.io_budget = budget;
        self.bad_io_frame_block_frames = block_frames;
        self
    }

    pub fn with_rendering_threads(mut self, threads: usize) -> Self {
        self.rendering_threads = threads;
        self
    }

    pub fn with_double_buffering(mut self, enabled: bool) -> Self {
        self.double_buffered = enabled;
        self
    }

    /// Index of the coarsest screen scale.
    pub fn coarsest_scale_index(&self) -> usize {
        self.screen_scales.len().saturating_sub(1)
    }

    /// Check the settings; invalid settings are fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.screen_scales.is_empty() {
            return Err(ConfigError::InvalidScreenScales(
                "at least one screen scale is required".to_string(),
            ));
        }
        if let Some(bad) = self
            .screen_scales
            .iter()
            .find(|&&s| !(s > 0.0 && s <= 1.0))
        {
            return Err(ConfigError::InvalidScreenScales(format!(
                "{} is outside (0, 1]",
                bad
            )));
        }
        if self.screen_scales.windows(2).any(|w| w[1] >= w[0]) {
            return Err(ConfigError::InvalidScreenScales(
                "scales must be strictly descending".to_string(),
            ));
        }
        if self.rendering_threads == 0 {
            return Err(ConfigError::ZeroThreads("rendering_threads"));
        }
        if self.bad_io_frame_block_frames == 0 {
            return Err(ConfigError::InvalidValue {
                key: "bad_io_frame_block_frames".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
