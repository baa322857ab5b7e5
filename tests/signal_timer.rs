use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ambulance_priority::{
    AmbulanceSighting, BoundingBox, SignalController, SignalState, Statistics, Transition,
};

fn sighting() -> AmbulanceSighting {
    AmbulanceSighting {
        bbox: BoundingBox::new(10, 10, 50, 40),
        confidence: 0.92,
    }
}

fn wait_for_state(ctrl: &SignalController, want: SignalState, limit: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if ctrl.current_state().unwrap() == want {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn timer_resets_after_dwell_and_not_before() {
    let ctrl = SignalController::new(Duration::from_millis(200), Statistics::shared(30));
    ctrl.on_sightings(&[sighting()]).unwrap();

    thread::sleep(Duration::from_millis(20));
    assert_eq!(ctrl.current_state().unwrap(), SignalState::Emergency);

    assert!(wait_for_state(
        &ctrl,
        SignalState::Normal,
        Duration::from_secs(5)
    ));
    assert_eq!(ctrl.statistics().lock().unwrap().signal_changes(), 1);
    assert!(!ctrl.reset_pending().unwrap());
}

#[test]
fn repeated_sightings_keep_the_original_deadline() {
    let ctrl = SignalController::new(Duration::from_millis(150), Statistics::shared(30));
    let start = Instant::now();
    ctrl.on_sightings(&[sighting()]).unwrap();

    // Keep "seeing" the ambulance well past the dwell; the reset must still
    // happen on the first deadline.
    let mut reset_seen_at = None;
    while start.elapsed() < Duration::from_secs(2) {
        ctrl.on_sightings(&[sighting()]).unwrap();
        if ctrl.timers_armed().unwrap() == 2 {
            reset_seen_at = Some(start.elapsed());
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    // The timer fired once, then the next sighting re-activated.
    let elapsed = reset_seen_at.expect("emergency never reset");
    assert!(elapsed >= Duration::from_millis(150));
    assert_eq!(ctrl.statistics().lock().unwrap().signal_changes(), 2);
}

#[test]
fn concurrent_readers_never_block_the_cycle() {
    let ctrl = Arc::new(SignalController::new(
        Duration::from_millis(30),
        Statistics::shared(30),
    ));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let ctrl = Arc::clone(&ctrl);
            thread::spawn(move || {
                let start = Instant::now();
                while start.elapsed() < Duration::from_millis(300) {
                    let snap = ctrl.snapshot().unwrap();
                    // A snapshot is never torn: emergency always carries its
                    // activation time.
                    assert_eq!(
                        snap.state == SignalState::Emergency,
                        snap.activated_at.is_some()
                    );
                }
            })
        })
        .collect();

    let mut activations = 0;
    for _ in 0..3 {
        if ctrl.on_sightings(&[sighting()]).unwrap() == Transition::Activated {
            activations += 1;
        }
        assert!(wait_for_state(
            &ctrl,
            SignalState::Normal,
            Duration::from_secs(5)
        ));
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(activations, 3);
    assert_eq!(ctrl.timers_armed().unwrap(), 3);
    assert_eq!(ctrl.statistics().lock().unwrap().signal_changes(), 3);
}

#[test]
fn manual_fire_retires_the_pending_timer() {
    let ctrl = SignalController::new(Duration::from_millis(100), Statistics::shared(30));
    ctrl.on_sightings(&[sighting()]).unwrap();
    assert_eq!(ctrl.on_timer_fire().unwrap(), SignalState::Emergency);

    // Re-activate right away; the retired timer must not cut this one short.
    ctrl.on_sightings(&[sighting()]).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(ctrl.current_state().unwrap(), SignalState::Emergency);
    assert!(wait_for_state(
        &ctrl,
        SignalState::Normal,
        Duration::from_secs(5)
    ));
}

#[test]
fn shutdown_with_pending_reset_returns_promptly() {
    let ctrl = SignalController::new(Duration::from_secs(3600), Statistics::shared(30));
    ctrl.on_sightings(&[sighting()]).unwrap();

    let start = Instant::now();
    ctrl.shutdown().unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!ctrl.reset_pending().unwrap());
    assert!(ctrl.on_sightings(&[sighting()]).is_err());
    // A second shutdown is a no-op.
    ctrl.shutdown().unwrap();
}
