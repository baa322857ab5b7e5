//! Emergency signal state machine.
//!
//! `SignalController` owns the one `SignalState` of the process. A non-empty
//! batch of sightings moves it from `Normal` to `Emergency` and arms a single
//! reset timer; the timer moves it back to `Normal` after the dwell time.
//! Sightings that arrive while the controller is already in `Emergency`
//! neither extend nor restart the dwell.
//!
//! # Threads
//!
//! - `on_sightings` is called from the stream loop thread.
//! - The reset timer runs on its own thread and calls the same reset path as
//!   `on_timer_fire`.
//! - `snapshot` / `current_state` may be called from anywhere.
//!
//! All state lives behind one mutex. When both are needed, the controller lock
//! is taken before the statistics lock, never the other way round.

use anyhow::{anyhow, Context, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::detect::AmbulanceSighting;
use crate::stats::SharedStatistics;

pub const DEFAULT_EMERGENCY_DWELL: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalState {
    Normal,
    Emergency,
}

impl SignalState {
    pub fn is_emergency(self) -> bool {
        matches!(self, SignalState::Emergency)
    }

    /// Colour shown for this state.
    pub fn light(self) -> SignalLight {
        match self {
            SignalState::Normal => SignalLight::Red,
            SignalState::Emergency => SignalLight::Green,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalLight {
    Red,
    Green,
}

impl std::fmt::Display for SignalLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalLight::Red => f.write_str("RED"),
            SignalLight::Green => f.write_str("GREEN"),
        }
    }
}

/// Outcome of `on_sightings`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// `Normal` -> `Emergency`; a reset timer was armed.
    Activated,
    /// No state change and no timer armed.
    Unchanged,
}

/// Read-only view of the controller for rendering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignalSnapshot {
    pub state: SignalState,
    pub activated_at: Option<Instant>,
    /// Time left before the pending reset fires.
    pub remaining: Option<Duration>,
}

impl SignalSnapshot {
    pub fn light(&self) -> SignalLight {
        self.state.light()
    }
}

struct PendingReset {
    generation: u64,
    deadline: Instant,
}

struct ControllerState {
    state: SignalState,
    activated_at: Option<Instant>,
    pending: Option<PendingReset>,
    next_generation: u64,
    timers_armed: u64,
    torn_down: bool,
}

impl ControllerState {
    /// Back to `Normal`. Clearing `pending` retires any sleeping timer.
    fn reset(&mut self) -> SignalState {
        let previous = self.state;
        self.state = SignalState::Normal;
        self.activated_at = None;
        self.pending = None;
        previous
    }
}

struct Shared {
    inner: Mutex<ControllerState>,
    wake: Condvar,
}

pub struct SignalController {
    shared: Arc<Shared>,
    stats: SharedStatistics,
    dwell: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SignalController {
    pub fn new(dwell: Duration, stats: SharedStatistics) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(ControllerState {
                    state: SignalState::Normal,
                    activated_at: None,
                    pending: None,
                    next_generation: 0,
                    timers_armed: 0,
                    torn_down: false,
                }),
                wake: Condvar::new(),
            }),
            stats,
            dwell,
            timer: Mutex::new(None),
        }
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    pub fn statistics(&self) -> &SharedStatistics {
        &self.stats
    }

    fn lock(&self) -> Result<MutexGuard<'_, ControllerState>> {
        self.shared
            .inner
            .lock()
            .map_err(|_| anyhow!("signal controller lock poisoned"))
    }

    /// Feed one frame's sightings into the state machine.
    ///
    /// Only a non-empty batch seen in `Normal` changes anything: the state
    /// becomes `Emergency`, the signal-change counter is bumped and exactly one
    /// reset timer is armed.
    pub fn on_sightings(&self, sightings: &[AmbulanceSighting]) -> Result<Transition> {
        if sightings.is_empty() {
            return Ok(Transition::Unchanged);
        }

        let handle = {
            let mut inner = self.lock()?;
            if inner.torn_down {
                return Err(anyhow!("signal controller is shut down"));
            }
            if inner.state == SignalState::Emergency {
                return Ok(Transition::Unchanged);
            }

            let mut stats = self
                .stats
                .lock()
                .map_err(|_| anyhow!("statistics lock poisoned"))?;

            let generation = inner.next_generation;
            // The timer thread blocks on the controller lock until this
            // transition is fully applied.
            let shared = Arc::clone(&self.shared);
            let handle = std::thread::Builder::new()
                .name("emergency-reset".to_string())
                .spawn(move || run_reset_timer(shared, generation))
                .context("failed to spawn emergency reset timer")?;

            let now = Instant::now();
            inner.next_generation += 1;
            inner.state = SignalState::Emergency;
            inner.activated_at = Some(now);
            inner.pending = Some(PendingReset {
                generation,
                deadline: now + self.dwell,
            });
            inner.timers_armed += 1;
            stats.record_signal_change();

            log::warn!(
                "EMERGENCY ACTIVATED - signal changed to {} for {:.1}s ({} sighting(s), best conf {:.2})",
                SignalLight::Green,
                self.dwell.as_secs_f64(),
                sightings.len(),
                sightings
                    .iter()
                    .map(|s| s.confidence)
                    .fold(0.0f32, f32::max)
            );
            handle
        };

        // The previous timer has already fired or been retired; it only needs
        // the controller lock (released above) to finish.
        let previous = self
            .timer
            .lock()
            .map_err(|_| anyhow!("timer handle lock poisoned"))?
            .replace(handle);
        if let Some(previous) = previous {
            if previous.join().is_err() {
                log::error!("previous emergency reset timer panicked");
            }
        }

        Ok(Transition::Activated)
    }

    /// Reset to `Normal`, whatever the current state.
    ///
    /// This is the timer's action; calling it directly retires any pending
    /// timer. It never counts as a signal change. Returns the state before the
    /// reset.
    pub fn on_timer_fire(&self) -> Result<SignalState> {
        let previous = {
            let mut inner = self.lock()?;
            let previous = inner.reset();
            self.shared.wake.notify_all();
            previous
        };
        if previous.is_emergency() {
            log::info!(
                "emergency reset - signal returned to {}",
                SignalLight::Red
            );
        }
        Ok(previous)
    }

    pub fn current_state(&self) -> Result<SignalState> {
        Ok(self.lock()?.state)
    }

    pub fn snapshot(&self) -> Result<SignalSnapshot> {
        let inner = self.lock()?;
        let now = Instant::now();
        Ok(SignalSnapshot {
            state: inner.state,
            activated_at: inner.activated_at,
            remaining: inner
                .pending
                .as_ref()
                .map(|pending| pending.deadline.saturating_duration_since(now)),
        })
    }

    /// Number of reset timers armed since creation.
    pub fn timers_armed(&self) -> Result<u64> {
        Ok(self.lock()?.timers_armed)
    }

    /// Whether a reset is currently scheduled.
    pub fn reset_pending(&self) -> Result<bool> {
        Ok(self.lock()?.pending.is_some())
    }

    /// Tear the controller down: retire the pending timer and wait for its
    /// thread to exit. Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut inner = self.lock()?;
            inner.torn_down = true;
            inner.pending = None;
            self.shared.wake.notify_all();
        }
        let handle = self
            .timer
            .lock()
            .map_err(|_| anyhow!("timer handle lock poisoned"))?
            .take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| anyhow!("emergency reset timer panicked"))?;
        }
        Ok(())
    }
}

impl Drop for SignalController {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("signal controller shutdown failed: {}", e);
        }
    }
}

/// Body of the reset timer thread.
///
/// Sleeps until the deadline of `generation`. Exits without touching state if
/// the controller is torn down or the pending reset is no longer its own.
fn run_reset_timer(shared: Arc<Shared>, generation: u64) {
    let mut inner = match shared.inner.lock() {
        Ok(guard) => guard,
        Err(_) => {
            log::error!("emergency reset timer: controller lock poisoned");
            return;
        }
    };
    loop {
        if inner.torn_down {
            return;
        }
        let deadline = match &inner.pending {
            Some(pending) if pending.generation == generation => pending.deadline,
            _ => return,
        };
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        inner = match shared.wake.wait_timeout(inner, deadline - now) {
            Ok((guard, _)) => guard,
            Err(_) => {
                log::error!("emergency reset timer: controller lock poisoned");
                return;
            }
        };
    }
    let held_for = inner.activated_at.map(|at| at.elapsed());
    inner.reset();
    drop(inner);
    log::info!(
        "emergency reset - signal returned to {} after {:.1}s",
        SignalLight::Red,
        held_for.unwrap_or_default().as_secs_f64()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::stats::Statistics;

    fn sighting() -> AmbulanceSighting {
        AmbulanceSighting {
            bbox: BoundingBox::new(0, 0, 10, 10),
            confidence: 0.9,
        }
    }

    fn controller(dwell: Duration) -> SignalController {
        SignalController::new(dwell, Statistics::shared(30))
    }

    fn signal_changes(ctrl: &SignalController) -> u64 {
        ctrl.statistics().lock().unwrap().signal_changes()
    }

    #[test]
    fn starts_normal_and_red() {
        let ctrl = controller(Duration::from_secs(30));
        let snap = ctrl.snapshot().unwrap();
        assert_eq!(snap.state, SignalState::Normal);
        assert_eq!(snap.light(), SignalLight::Red);
        assert_eq!(snap.remaining, None);
    }

    #[test]
    fn empty_batch_never_transitions() {
        let ctrl = controller(Duration::from_secs(30));
        for _ in 0..5 {
            assert_eq!(ctrl.on_sightings(&[]).unwrap(), Transition::Unchanged);
        }
        assert_eq!(ctrl.current_state().unwrap(), SignalState::Normal);
        assert_eq!(signal_changes(&ctrl), 0);
        assert_eq!(ctrl.timers_armed().unwrap(), 0);
    }

    #[test]
    fn first_sighting_activates_and_arms_one_timer() {
        let ctrl = controller(Duration::from_secs(30));
        assert_eq!(
            ctrl.on_sightings(&[sighting()]).unwrap(),
            Transition::Activated
        );
        let snap = ctrl.snapshot().unwrap();
        assert_eq!(snap.state, SignalState::Emergency);
        assert_eq!(snap.light(), SignalLight::Green);
        assert!(snap.remaining.unwrap() <= Duration::from_secs(30));
        assert_eq!(signal_changes(&ctrl), 1);
        assert_eq!(ctrl.timers_armed().unwrap(), 1);
        assert!(ctrl.reset_pending().unwrap());
    }

    #[test]
    fn retrigger_while_active_is_idempotent() {
        let ctrl = controller(Duration::from_secs(30));
        ctrl.on_sightings(&[sighting()]).unwrap();
        let activated_at = ctrl.snapshot().unwrap().activated_at;
        for _ in 0..10 {
            assert_eq!(
                ctrl.on_sightings(&[sighting(), sighting()]).unwrap(),
                Transition::Unchanged
            );
        }
        assert_eq!(signal_changes(&ctrl), 1);
        assert_eq!(ctrl.timers_armed().unwrap(), 1);
        assert_eq!(ctrl.snapshot().unwrap().activated_at, activated_at);
    }

    #[test]
    fn timer_fire_resets_without_counting_a_change() {
        let ctrl = controller(Duration::from_secs(30));
        ctrl.on_sightings(&[sighting()]).unwrap();
        assert_eq!(ctrl.on_timer_fire().unwrap(), SignalState::Emergency);
        assert_eq!(ctrl.current_state().unwrap(), SignalState::Normal);
        assert!(!ctrl.reset_pending().unwrap());
        assert_eq!(signal_changes(&ctrl), 1);
    }

    #[test]
    fn timer_fire_in_normal_is_harmless() {
        let ctrl = controller(Duration::from_secs(30));
        assert_eq!(ctrl.on_timer_fire().unwrap(), SignalState::Normal);
        assert_eq!(ctrl.current_state().unwrap(), SignalState::Normal);
        assert_eq!(signal_changes(&ctrl), 0);
    }

    #[test]
    fn reactivation_after_reset_counts_again() {
        let ctrl = controller(Duration::from_secs(30));
        ctrl.on_sightings(&[sighting()]).unwrap();
        ctrl.on_timer_fire().unwrap();
        assert_eq!(
            ctrl.on_sightings(&[sighting()]).unwrap(),
            Transition::Activated
        );
        assert_eq!(signal_changes(&ctrl), 2);
        assert_eq!(ctrl.timers_armed().unwrap(), 2);
    }

    #[test]
    fn armed_timer_resets_after_dwell() {
        let ctrl = controller(Duration::from_millis(40));
        ctrl.on_sightings(&[sighting()]).unwrap();
        let start = Instant::now();
        while ctrl.current_state().unwrap() == SignalState::Emergency {
            assert!(start.elapsed() < Duration::from_secs(5), "timer never fired");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(signal_changes(&ctrl), 1);
    }

    #[test]
    fn shutdown_retires_pending_timer() {
        let ctrl = controller(Duration::from_millis(30));
        ctrl.on_sightings(&[sighting()]).unwrap();
        ctrl.shutdown().unwrap();
        std::thread::sleep(Duration::from_millis(80));
        // Timer observed the teardown guard instead of resetting.
        assert_eq!(ctrl.current_state().unwrap(), SignalState::Emergency);
        assert!(ctrl.on_sightings(&[sighting()]).is_err());
        ctrl.shutdown().unwrap();
    }
}
