//! The per-frame orchestration loop.
//!
//! `StreamLoop` owns every stage of the pipeline and drives frames through
//! them strictly one at a time: acquire, detect, filter, feed the signal
//! controller, draw, present. Only acquisition failure ends the stream;
//! any other per-frame failure is logged and the frame is skipped.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use crate::detect::{DetectionFilter, DetectorBackend};
use crate::display::DisplaySink;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::overlay::OverlayRenderer;
use crate::signal::SignalController;
use crate::stats::SharedStatistics;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Lifecycle of one stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamPhase {
    Open,
    Running,
    /// End of stream or a user quit.
    Closed,
    /// Acquisition failed.
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamReport {
    pub phase: StreamPhase,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub quit_requested: bool,
}

impl StreamReport {
    pub fn is_clean(&self) -> bool {
        self.phase == StreamPhase::Closed
    }
}

pub struct StreamLoop {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    filter: DetectionFilter,
    controller: SignalController,
    stats: SharedStatistics,
    renderer: OverlayRenderer,
    display: Box<dyn DisplaySink>,
    phase: StreamPhase,
}

impl StreamLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        filter: DetectionFilter,
        controller: SignalController,
        renderer: OverlayRenderer,
        display: Box<dyn DisplaySink>,
    ) -> Self {
        let stats = controller.statistics().clone();
        Self {
            source,
            detector,
            filter,
            controller,
            stats,
            renderer,
            display,
            phase: StreamPhase::Open,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn controller(&self) -> &SignalController {
        &self.controller
    }

    pub fn statistics(&self) -> &SharedStatistics {
        &self.stats
    }

    /// Run until end of stream, a quit request or an acquisition failure.
    ///
    /// The source and display are closed and the reset timer retired
    /// before this returns.
    pub fn run(&mut self) -> StreamReport {
        self.phase = StreamPhase::Running;
        log::info!(
            "stream running: source={} detector={} display={} class='{}' threshold={:.2} dwell={:.1}s",
            self.source.describe(),
            self.detector.name(),
            self.display.name(),
            self.filter.class_filter(),
            self.filter.min_confidence(),
            self.controller.dwell().as_secs_f64()
        );

        let mut report = StreamReport {
            phase: StreamPhase::Running,
            frames_processed: 0,
            frames_skipped: 0,
            quit_requested: false,
        };
        let mut last_health_log = Instant::now();

        loop {
            if self.display.poll_quit_requested() {
                log::info!("quit requested; stopping stream");
                report.quit_requested = true;
                self.phase = StreamPhase::Closed;
                break;
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::warn!(
                        "end of stream from {} after {} frames",
                        self.source.describe(),
                        report.frames_processed + report.frames_skipped
                    );
                    self.phase = StreamPhase::Closed;
                    break;
                }
                // An interrupted read after a quit request is a shutdown.
                Err(e) if self.display.poll_quit_requested() => {
                    log::info!("quit requested during acquisition ({:#}); stopping stream", e);
                    report.quit_requested = true;
                    self.phase = StreamPhase::Closed;
                    break;
                }
                Err(e) => {
                    log::error!("frame acquisition from {} failed: {:#}", self.source.describe(), e);
                    self.phase = StreamPhase::Error;
                    break;
                }
            };

            match self.process_frame(frame) {
                Ok(()) => report.frames_processed += 1,
                Err(e) => {
                    report.frames_skipped += 1;
                    log::warn!("frame skipped: {:#}", e);
                }
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                self.log_health();
                last_health_log = Instant::now();
            }

            if self.display.poll_quit_requested() {
                log::info!("quit requested; stopping stream");
                report.quit_requested = true;
                self.phase = StreamPhase::Closed;
                break;
            }
        }

        self.close();
        report.phase = self.phase;
        report
    }

    fn process_frame(&mut self, mut frame: Frame) -> Result<()> {
        let start = Instant::now();

        let raw = self.detector.detect(&frame)?;
        let sightings = self.filter.apply(&raw);
        if !sightings.is_empty() {
            self.controller.on_sightings(&sightings)?;
            self.lock_stats()?.record_detections(sightings.len());
        }

        let signal = self.controller.snapshot()?;
        let stats = self.lock_stats()?.snapshot();
        self.renderer
            .draw_overlay(&mut frame, &sightings, &signal, &stats);

        let average_fps = {
            let mut stats = self.lock_stats()?;
            stats.record_frame_time(start.elapsed());
            stats.average_fps()
        };
        self.renderer.draw_fps(&mut frame, average_fps);

        self.display.present(&frame)
    }

    fn lock_stats(&self) -> Result<std::sync::MutexGuard<'_, crate::stats::Statistics>> {
        self.stats
            .lock()
            .map_err(|_| anyhow!("statistics lock poisoned"))
    }

    fn log_health(&self) {
        let snapshot = match self.lock_stats() {
            Ok(stats) => stats.snapshot(),
            Err(e) => {
                log::warn!("health check skipped: {}", e);
                return;
            }
        };
        let state = self
            .controller
            .current_state()
            .map(|s| format!("{:?}", s))
            .unwrap_or_else(|_| "unknown".to_string());
        log::info!(
            "stream health frames={} fps={:.1} detections={} signal_changes={} state={} captured={}",
            snapshot.frames_processed,
            snapshot.average_fps,
            snapshot.total_detections,
            snapshot.signal_changes,
            state,
            self.source.stats().frames_captured
        );
    }

    fn close(&mut self) {
        self.source.close();
        if let Err(e) = self.display.close() {
            log::warn!("display close failed: {:#}", e);
        }
        if let Err(e) = self.controller.shutdown() {
            log::warn!("signal controller shutdown failed: {:#}", e);
        }
        log::info!("stream closed in phase {:?}", self.phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyntheticSettings;
    use crate::detect::{BoundingBox, RawDetection, ScriptedBackend};
    use crate::display::{HeadlessDisplay, QuitFlag};
    use crate::ingest::SyntheticSource;
    use crate::signal::SignalState;
    use crate::stats::Statistics;

    fn synthetic(frames: u64) -> Box<dyn FrameSource> {
        let mut source = SyntheticSource::new(
            "unit",
            SyntheticSettings {
                frames,
                width: 64,
                height: 48,
            },
        );
        source.connect().unwrap();
        Box::new(source)
    }

    fn stream(frames: u64, script: Vec<Vec<RawDetection>>, quit: QuitFlag) -> StreamLoop {
        let controller = SignalController::new(Duration::from_secs(30), Statistics::shared(30));
        StreamLoop::new(
            synthetic(frames),
            Box::new(ScriptedBackend::new(script)),
            DetectionFilter::new("ambulance", 0.7),
            controller,
            OverlayRenderer::without_font(),
            Box::new(HeadlessDisplay::new(quit)),
        )
    }

    #[test]
    fn end_of_stream_closes_cleanly() {
        let mut stream = stream(3, Vec::new(), QuitFlag::new());
        assert_eq!(stream.phase(), StreamPhase::Open);
        let report = stream.run();
        assert_eq!(report.phase, StreamPhase::Closed);
        assert_eq!(report.frames_processed, 3);
        assert!(!report.quit_requested);
        let stats = stream.statistics().lock().unwrap().snapshot();
        assert_eq!(stats.frames_processed, 3);
        assert_eq!(stats.total_detections, 0);
    }

    #[test]
    fn sighting_activates_emergency_once() {
        let hit = RawDetection::new("ambulance", 0.9, BoundingBox::new(4, 4, 20, 20));
        let script = vec![vec![hit.clone()], vec![hit.clone()], vec![]];
        let mut stream = stream(3, script, QuitFlag::new());
        stream.run();
        let stats = stream.statistics().lock().unwrap().snapshot();
        assert_eq!(stats.total_detections, 2);
        assert_eq!(stats.signal_changes, 1);
    }

    #[test]
    fn quit_before_first_frame_processes_nothing() {
        let quit = QuitFlag::new();
        quit.request();
        let mut stream = stream(10, Vec::new(), quit);
        let report = stream.run();
        assert!(report.quit_requested);
        assert_eq!(report.phase, StreamPhase::Closed);
        assert_eq!(report.frames_processed, 0);
        assert_eq!(
            stream.controller().current_state().unwrap(),
            SignalState::Normal
        );
    }
}
