//! Render target images and per-scale double buffers.

use std::sync::Arc;

use parking_lot::Mutex;

/// ARGB image produced by one render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenImage {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl ScreenImage {
    /// Image filled with `fill`.
    pub fn new(width: usize, height: usize, fill: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major ARGB pixels.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    /// Pixel at (x, y), if inside the image.
    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }
}

/// Receives finished frames.
pub trait RenderTarget: Send + Sync {
    /// Display `image`. Called on the render thread with the publish lock held.
    fn publish(&self, image: Arc<ScreenImage>);
}

impl<F> RenderTarget for F
where
    F: Fn(Arc<ScreenImage>) + Send + Sync,
{
    fn publish(&self, image: Arc<ScreenImage>) {
        self(image)
    }
}

/// Target that keeps the most recently published frame.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Arc<ScreenImage>>>,
    published: std::sync::atomic::AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last published frame.
    pub fn latest(&self) -> Option<Arc<ScreenImage>> {
        self.latest.lock().clone()
    }

    /// Number of frames published so far.
    pub fn published(&self) -> u64 {
        self.published.load(std::sync::atomic::Ordering::Acquire)
    }
}

impl RenderTarget for FrameSlot {
    fn publish(&self, image: Arc<ScreenImage>) {
        *self.latest.lock() = Some(image);
        self.published
            .fetch_add(1, std::sync::atomic::Ordering::AcqRel);
    }
}

/// One or two reusable images per screen scale.
///
/// A buffer still referenced by the display is never drawn into: if the slot's
/// image is shared, a fresh one is allocated instead.
#[derive(Debug)]
pub(crate) struct ScreenBuffers {
    slots: Vec<[Option<Arc<ScreenImage>>; 2]>,
    next: Vec<usize>,
    double_buffered: bool,
}

impl ScreenBuffers {
    pub(crate) fn new(num_scales: usize, double_buffered: bool) -> Self {
        Self {
            slots: (0..num_scales).map(|_| [None, None]).collect(),
            next: vec![0; num_scales],
            double_buffered,
        }
    }

    /// Take the back buffer of `scale_index`, sized `width` x `height` and filled
    /// with `fill`.
    pub(crate) fn acquire(
        &mut self,
        scale_index: usize,
        width: usize,
        height: usize,
        fill: u32,
    ) -> ScreenImage {
        let slot = self.next[scale_index];
        let reusable = self.slots[scale_index][slot]
            .take()
            .and_then(|image| Arc::try_unwrap(image).ok())
            .filter(|image| image.width == width && image.height == height);
        match reusable {
            Some(mut image) => {
                image.pixels.fill(fill);
                image
            }
            None => ScreenImage::new(width, height, fill),
        }
    }

    /// Return a finished image to its slot and swap front and back.
    pub(crate) fn swap(&mut self, scale_index: usize, image: Arc<ScreenImage>) {
        let slot = self.next[scale_index];
        self.slots[scale_index][slot] = Some(image);
        if self.double_buffered {
            self.next[scale_index] = 1 - slot;
        }
    }

    /// Return an image that was never displayed; its slot stays the back buffer.
    pub(crate) fn recycle(&mut self, scale_index: usize, image: Arc<ScreenImage>) {
        let slot = self.next[scale_index];
        self.slots[scale_index][slot] = Some(image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_access() {
        let mut image = ScreenImage::new(3, 2, 7);
        image.pixels_mut()[4] = 9;
        assert_eq!(image.pixel(1, 1), Some(9));
        assert_eq!(image.pixel(3, 0), None);
    }

    #[test]
    fn test_buffers_alternate_and_reuse() {
        let mut buffers = ScreenBuffers::new(1, true);

        let first = Arc::new(buffers.acquire(0, 4, 4, 1));
        buffers.swap(0, Arc::clone(&first));
        let second = Arc::new(buffers.acquire(0, 4, 4, 2));
        buffers.swap(0, Arc::clone(&second));

        // Display still shows `second`; the back buffer is `first`'s slot
        drop(first);
        let third = buffers.acquire(0, 4, 4, 3);
        assert!(third.pixels().iter().all(|&p| p == 3));
        assert_eq!(second.pixel(0, 0), Some(2));
    }

    #[test]
    fn test_shared_buffer_is_not_overwritten() {
        let mut buffers = ScreenBuffers::new(1, false);
        let shown = Arc::new(buffers.acquire(0, 2, 2, 5));
        buffers.swap(0, Arc::clone(&shown));

        let next = buffers.acquire(0, 2, 2, 6);
        assert_eq!(next.pixel(0, 0), Some(6));
        assert_eq!(shown.pixel(0, 0), Some(5));
    }

    #[test]
    fn test_frame_slot() {
        let slot = FrameSlot::new();
        slot.publish(Arc::new(ScreenImage::new(1, 1, 0)));
        assert_eq!(slot.published(), 1);
        assert!(slot.latest().is_some());
    }
}
