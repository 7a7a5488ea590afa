//! Progress reporting and cooperative cancellation.
//!
//! A run advances one streamed region at a time. Progress is counted in
//! pixels and reported after each region; cancellation is checked between
//! regions, never in the middle of one.

use crate::core::region::Region;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Events sent to a progress callback.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    /// Evaluation is about to start.
    Started { total_pixels: u64, regions: usize },
    /// Every pixel of a streamed region was written.
    RegionCompleted {
        region: Region,
        index: usize,
        total: usize,
        duration_ms: u64,
    },
    /// Share of output pixels written so far.
    Progress {
        percent: f32,
        elapsed_ms: u64,
        remaining_ms: Option<u64>,
    },
    /// All regions were written.
    Completed { duration_ms: u64, pixels: u64 },
    /// Cancellation was requested.
    Cancelled { completed_pixels: u64 },
    /// The run failed.
    Failed { message: String },
}

/// Receiver of [`ProgressUpdate`]s.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Pixel counters and the cancellation flag of one run.
///
/// Share it with an `Arc` to cancel from another thread while a run is in
/// progress.
pub struct ProgressTracker {
    total: AtomicU64,
    done: AtomicU64,
    stop: AtomicBool,
    started_at: Mutex<Option<Instant>>,
    listener: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            done: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            started_at: Mutex::new(None),
            listener: None,
        }
    }

    /// A tracker ready to be shared with the thread that may cancel.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Forward every update to `callback`.
    pub fn with_callback(self, callback: ProgressCallback) -> Self {
        Self {
            listener: Some(callback),
            ..self
        }
    }

    /// Reset the counters for a run over `total_pixels` in `regions` strips.
    pub fn start(&self, total_pixels: u64, regions: usize) {
        self.total.store(total_pixels, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
        *self.started_at.lock() = Some(Instant::now());
        self.notify(ProgressUpdate::Started { total_pixels, regions });
    }

    /// Count `region`'s pixels as written.
    pub fn region_completed(&self, region: Region, index: usize, total: usize, duration_ms: u64) {
        self.done.fetch_add(region.area(), Ordering::Relaxed);
        self.notify(ProgressUpdate::RegionCompleted {
            region,
            index,
            total,
            duration_ms,
        });
        if self.listener.is_some() {
            self.notify(ProgressUpdate::Progress {
                percent: self.progress_percent(),
                elapsed_ms: self.elapsed_ms(),
                remaining_ms: self.estimated_remaining_ms(),
            });
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Ask the run to stop at the next region boundary.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.notify(ProgressUpdate::Cancelled {
            completed_pixels: self.completed_pixels(),
        });
    }

    pub fn report_error(&self, message: String) {
        self.notify(ProgressUpdate::Failed { message });
    }

    pub fn complete(&self) {
        self.notify(ProgressUpdate::Completed {
            duration_ms: self.elapsed_ms(),
            pixels: self.completed_pixels(),
        });
    }

    /// Output pixels written so far.
    pub fn completed_pixels(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Output pixels of the current run.
    pub fn total_pixels(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Written share of the output, in percent. An empty run is complete.
    pub fn progress_percent(&self) -> f32 {
        match self.total_pixels() {
            0 => 100.0,
            total => self.completed_pixels() as f32 * 100.0 / total as f32,
        }
    }

    /// Remaining time extrapolated from the pixel rate so far.
    pub fn estimated_remaining_ms(&self) -> Option<u64> {
        let done = self.completed_pixels();
        (done > 0).then(|| {
            let left = self.total_pixels().saturating_sub(done);
            self.elapsed_ms() * left / done
        })
    }

    fn elapsed_ms(&self) -> u64 {
        let started = *self.started_at.lock();
        started.map_or(0, |t| t.elapsed().as_millis() as u64)
    }

    fn notify(&self, update: ProgressUpdate) {
        if let Some(listener) = &self.listener {
            listener(update);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("total_pixels", &self.total_pixels())
            .field("completed_pixels", &self.completed_pixels())
            .field("cancelled", &self.is_cancelled())
            .field("callback", &self.listener.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_percent_follows_regions() {
        let tracker = ProgressTracker::new();
        tracker.start(100, 2);
        assert_eq!(tracker.progress_percent(), 0.0);
        assert_eq!(tracker.estimated_remaining_ms(), None);

        tracker.region_completed(Region::from_size(10, 5), 0, 2, 1);
        assert_eq!(tracker.progress_percent(), 50.0);
        assert!(tracker.estimated_remaining_ms().is_some());

        tracker.region_completed(Region::new(0, 5, 10, 5), 1, 2, 1);
        assert_eq!(tracker.progress_percent(), 100.0);
        assert_eq!(tracker.completed_pixels(), 100);
    }

    #[test]
    fn test_empty_run_is_complete() {
        let tracker = ProgressTracker::new();
        tracker.start(0, 0);
        assert_eq!(tracker.progress_percent(), 100.0);
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let tracker = ProgressTracker::new_shared();
        let remote = tracker.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(tracker.is_cancelled());
    }

    #[test]
    fn test_updates_reach_callback() {
        let events = Arc::new(AtomicUsize::new(0));
        let counter = events.clone();
        let tracker = ProgressTracker::new().with_callback(Box::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        tracker.start(16, 1);
        tracker.region_completed(Region::from_size(4, 4), 0, 1, 0);
        tracker.complete();

        // Started, RegionCompleted, Progress, Completed
        assert_eq!(events.load(Ordering::Relaxed), 4);
    }
}
