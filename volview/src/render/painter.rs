//! Dedicated paint thread driven by a coalescing repaint signal.
//!
//! Repaint requests only set a single dirty flag; any number of requests arriving
//! while a frame is being painted collapse into one follow-up frame.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::RepaintCallback;

/// Something the paint thread can draw.
pub trait Paintable: Send + Sync {
    /// Paint one frame of the current view.
    fn paint(&self);
}

impl<F> Paintable for F
where
    F: Fn() + Send + Sync,
{
    fn paint(&self) {
        self()
    }
}

struct SignalState {
    dirty: Mutex<bool>,
    wake: Condvar,
    shutdown: CancellationToken,
}

/// Handle for requesting repaints. Cheap to clone.
#[derive(Clone)]
pub struct RepaintSignal {
    state: Arc<SignalState>,
}

impl std::fmt::Debug for RepaintSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepaintSignal")
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl RepaintSignal {
    fn new() -> Self {
        Self {
            state: Arc::new(SignalState {
                dirty: Mutex::new(false),
                wake: Condvar::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Mark the view dirty. Never blocks on painting.
    pub fn request_repaint(&self) {
        let mut dirty = self.state.dirty.lock();
        if !*dirty {
            *dirty = true;
            self.state.wake.notify_one();
        }
    }

    /// Whether a repaint is waiting to be served.
    pub fn is_pending(&self) -> bool {
        *self.state.dirty.lock()
    }

    /// The signal as a plain callback, for the cache and renderer.
    pub fn as_callback(&self) -> RepaintCallback {
        let signal = self.clone();
        Arc::new(move || signal.request_repaint())
    }

    /// Wait for the next request; `false` once shut down.
    fn wait(&self) -> bool {
        let mut dirty = self.state.dirty.lock();
        loop {
            if self.state.shutdown.is_cancelled() {
                return false;
            }
            if *dirty {
                *dirty = false;
                return true;
            }
            self.state.wake.wait(&mut dirty);
        }
    }

    fn close(&self) {
        self.state.shutdown.cancel();
        let _dirty = self.state.dirty.lock();
        self.state.wake.notify_all();
    }
}

/// Thread that paints whenever its [`RepaintSignal`] fires.
///
/// Dropping the painter stops the thread after the frame in progress.
pub struct PainterThread {
    signal: RepaintSignal,
    handle: Option<JoinHandle<()>>,
}

impl PainterThread {
    /// Spawn the paint thread.
    pub fn start(target: Arc<dyn Paintable>) -> std::io::Result<Self> {
        let signal = RepaintSignal::new();
        let thread_signal = signal.clone();

        let handle = thread::Builder::new()
            .name("volview-painter".to_string())
            .spawn(move || {
                debug!("Painter thread started");
                while thread_signal.wait() {
                    target.paint();
                }
                debug!("Painter thread exiting");
            })?;

        info!("Painter thread started");
        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Signal used to schedule frames on this painter.
    pub fn signal(&self) -> &RepaintSignal {
        &self.signal
    }

    pub fn request_repaint(&self) {
        self.signal.request_repaint();
    }

    /// Stop the thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.signal.close();
        if handle.join().is_err() {
            warn!("Painter thread panicked");
        }
    }
}

impl Drop for PainterThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_paints_on_request() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let painter = PainterThread::start(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        painter.request_repaint();
        assert!(wait_for(|| count.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_requests_coalesce_while_painting() {
        let count = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Mutex::new(()));
        let counter = Arc::clone(&count);
        let paint_gate = Arc::clone(&gate);

        let painter = PainterThread::start(Arc::new(move || {
            let _gate = paint_gate.lock();
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        let held = gate.lock();
        painter.request_repaint();
        // First frame is now blocked on the gate or about to be
        assert!(wait_for(|| !painter.signal().is_pending()));
        for _ in 0..10 {
            painter.request_repaint();
        }
        drop(held);

        assert!(wait_for(|| count.load(Ordering::SeqCst) == 2));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shutdown_joins() {
        let mut painter = PainterThread::start(Arc::new(|| {})).unwrap();
        painter.shutdown();
        // Requests after shutdown are harmless
        painter.request_repaint();
    }
}
