//! Process-lifetime statistics for the live overlay.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default number of per-frame FPS samples kept for smoothing.
pub const DEFAULT_FPS_WINDOW: usize = 30;

/// Samples preallocated up front; larger windows grow on demand.
const FPS_WINDOW_PREALLOC: usize = 64;

/// Handle shared between the stream loop, the signal controller and the
/// renderer.
pub type SharedStatistics = Arc<Mutex<Statistics>>;

/// Bounded FIFO of instantaneous FPS samples.
#[derive(Clone, Debug)]
pub struct FpsWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl FpsWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(FPS_WINDOW_PREALLOC)),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest beyond capacity.
    pub fn push(&mut self, fps: f64) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(fps);
    }

    /// Arithmetic mean of the window, 0 when empty.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Running counters. Both counters only ever grow during a run.
#[derive(Clone, Debug)]
pub struct Statistics {
    total_detections: u64,
    signal_changes: u64,
    frames_processed: u64,
    fps: FpsWindow,
}

/// Point-in-time copy of `Statistics` for rendering and reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatsSnapshot {
    pub total_detections: u64,
    pub signal_changes: u64,
    pub frames_processed: u64,
    pub average_fps: f64,
}

impl Statistics {
    pub fn new(fps_window: usize) -> Self {
        Self {
            total_detections: 0,
            signal_changes: 0,
            frames_processed: 0,
            fps: FpsWindow::new(fps_window),
        }
    }

    pub fn shared(fps_window: usize) -> SharedStatistics {
        Arc::new(Mutex::new(Self::new(fps_window)))
    }

    pub fn record_detections(&mut self, n: usize) {
        self.total_detections = self.total_detections.saturating_add(n as u64);
    }

    pub fn record_signal_change(&mut self) {
        self.signal_changes = self.signal_changes.saturating_add(1);
    }

    /// Record one frame's processing time.
    ///
    /// A zero elapsed time has no meaningful FPS and is skipped.
    pub fn record_frame_time(&mut self, elapsed: Duration) {
        self.frames_processed = self.frames_processed.saturating_add(1);
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return;
        }
        self.fps.push(1.0 / secs);
    }

    pub fn average_fps(&self) -> f64 {
        self.fps.average()
    }

    pub fn total_detections(&self) -> u64 {
        self.total_detections
    }

    pub fn signal_changes(&self) -> u64 {
        self.signal_changes
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_detections: self.total_detections,
            signal_changes: self.signal_changes,
            frames_processed: self.frames_processed,
            average_fps: self.fps.average(),
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new(DEFAULT_FPS_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_is_zero_without_samples() {
        let stats = Statistics::default();
        assert_eq!(stats.average_fps(), 0.0);
    }

    #[test]
    fn zero_elapsed_is_skipped() {
        let mut stats = Statistics::default();
        stats.record_frame_time(Duration::ZERO);
        assert_eq!(stats.average_fps(), 0.0);
        stats.record_frame_time(Duration::from_millis(100));
        assert!((stats.average_fps() - 10.0).abs() < 1e-9);
        assert_eq!(stats.frames_processed(), 2);
    }

    #[test]
    fn huge_window_does_not_preallocate() {
        let mut stats = Statistics::new(usize::MAX);
        stats.record_frame_time(Duration::from_millis(50));
        assert!((stats.average_fps() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn window_keeps_only_most_recent_thirty_samples() {
        let mut stats = Statistics::new(30);
        // 10 slow frames (10 fps) then 30 fast frames (50 fps).
        for _ in 0..10 {
            stats.record_frame_time(Duration::from_millis(100));
        }
        for _ in 0..30 {
            stats.record_frame_time(Duration::from_millis(20));
        }
        assert!((stats.average_fps() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn window_mean_mixes_partial_history() {
        let mut window = FpsWindow::new(3);
        for fps in [10.0, 20.0, 30.0, 40.0] {
            window.push(fps);
        }
        assert_eq!(window.len(), 3);
        assert!((window.average() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn counters_never_decrease() {
        let mut stats = Statistics::default();
        let mut last = stats.snapshot();
        for i in 0..20 {
            if i % 3 == 0 {
                stats.record_signal_change();
            }
            stats.record_detections(i % 4);
            let now = stats.snapshot();
            assert!(now.total_detections >= last.total_detections);
            assert!(now.signal_changes >= last.signal_changes);
            last = now;
        }
        assert_eq!(last.signal_changes, 7);
    }
}
