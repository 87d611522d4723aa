//! End-to-end scheduler scenarios on a virtual clock.
//!
//! Each test wires an engine to a recording vibrator and a scripted wake
//! lock, moves the clock by hand and checks what reached the platform.

use std::rc::Rc;

use tracing_subscriber::EnvFilter;

use breathroom_haptics::prefs::{
    MemoryStore, BREATH_FOLLOW_KEY, ENABLED_KEY, INTENSITY_KEY, VOICE_SYNC_KEY,
};
use breathroom_haptics::{
    BreathPhase, Clock, EngineMode, Event, HapticsEngine, HapticsIntensity, ManualClock,
    PreferenceBridge, RecordingVibrator, ScriptedWakeLock, VibrationCall,
};

struct Harness {
    clock: ManualClock,
    vibrator: RecordingVibrator,
    lock: ScriptedWakeLock,
    bridge: PreferenceBridge,
    engine: HapticsEngine,
}

impl Harness {
    fn new(store: MemoryStore) -> Self {
        Self::with_seed(store, 42)
    }

    fn with_seed(store: MemoryStore, seed: u64) -> Self {
        init_test_logging();
        let clock = ManualClock::new();
        let vibrator = RecordingVibrator::new(Rc::new(clock.clone()));
        let lock = ScriptedWakeLock::new();
        let bridge = PreferenceBridge::new(Box::new(store));
        let engine = HapticsEngine::builder(bridge.clone())
            .vibration(Box::new(vibrator.clone()))
            .wake_lock(Box::new(lock.clone()))
            .clock(Rc::new(clock.clone()))
            .rng_seed(seed)
            .build();
        Self {
            clock,
            vibrator,
            lock,
            bridge,
            engine,
        }
    }

    /// Breath-follow saved, attached, premium on, all at t=0.
    fn active() -> Self {
        let mut h = Self::new(MemoryStore::new().with(BREATH_FOLLOW_KEY, "1"));
        h.engine.attach();
        h.engine.set_premium_enabled_for_breath(true);
        h
    }

    fn poll_at(&mut self, ms: u64) -> Vec<Event> {
        self.clock.set(ms);
        self.engine.poll()
    }

    /// Poll every `step` ms up to and including `until`.
    fn run_until(&mut self, until: u64, step: u64) -> Vec<Event> {
        let mut events = Vec::new();
        let mut now = self.clock.now_ms();
        while now < until {
            now = (now + step).min(until);
            events.extend(self.poll_at(now));
        }
        events
    }
}

/// `RUST_LOG=breathroom_haptics=trace` shows every phase firing.
fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn fired(events: &[Event]) -> Vec<(BreathPhase, u32, u64)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::PhaseFired {
                phase,
                duration_ms,
                at_ms,
                ..
            } => Some((*phase, *duration_ms, *at_ms)),
            _ => None,
        })
        .collect()
}

#[test]
fn ten_second_cycle_fires_on_phase_boundaries() {
    let mut h = Harness::active();
    let timing = h.engine.timing();
    assert_eq!(
        (
            timing.inhale_ms,
            timing.hold_top_ms,
            timing.exhale_ms,
            timing.hold_bottom_ms
        ),
        (2800, 1200, 3200, 2800)
    );

    let mut events = Vec::new();
    for at in [60, 2860, 4060, 7260, 10_060] {
        events.extend(h.poll_at(at));
    }

    assert_eq!(
        fired(&events),
        vec![
            (BreathPhase::Inhale, 2800, 60),
            (BreathPhase::HoldTop, 1200, 2860),
            (BreathPhase::Exhale, 3200, 4060),
            (BreathPhase::HoldBottom, 2800, 7260),
            (BreathPhase::Inhale, 2800, 10_060),
        ]
    );
    let times: Vec<u64> = h.vibrator.patterns().iter().map(|(at, _)| *at).collect();
    assert_eq!(times, vec![60, 2860, 4060, 7260, 10_060]);

    let cycles: Vec<u64> = events
        .iter()
        .filter_map(|event| match event {
            Event::CycleStarted { cycle_index, .. } => Some(*cycle_index),
            _ => None,
        })
        .collect();
    assert_eq!(cycles, vec![0, 1]);
}

#[test]
fn phases_wait_for_their_offsets() {
    let mut h = Harness::active();
    h.poll_at(60);
    assert!(h.poll_at(2859).is_empty());
    assert_eq!(h.vibrator.vibrate_count(), 1);
    h.poll_at(2860);
    assert_eq!(h.vibrator.vibrate_count(), 2);
}

#[test]
fn every_phase_pattern_fits_its_window() {
    let mut h = Harness::active();
    h.run_until(30_000, 10);
    let timing = h.engine.timing();
    for (at, pattern) in h.vibrator.patterns() {
        let offset = (at - 60) % timing.cycle_ms();
        let phase = BreathPhase::ALL
            .into_iter()
            .find(|phase| timing.offset_of(*phase) == offset)
            .expect("vibration off a phase boundary");
        assert!(
            pattern.total_ms() <= u64::from(timing.duration_of(phase)),
            "{phase:?} overran: {pattern:?}"
        );
    }
}

#[test]
fn late_poll_catches_up_without_replaying_cycles() {
    let mut h = Harness::active();
    h.poll_at(60);
    let late = 60 + 2 * 10_000 + 500;
    let events = h.poll_at(late);

    // Nothing from the stale cycle plays; the loop re-anchors on now.
    assert_eq!(fired(&events), vec![(BreathPhase::Inhale, 2800, late)]);
    let times: Vec<u64> = h.vibrator.patterns().iter().map(|(at, _)| *at).collect();
    assert_eq!(times, vec![60, late]);
    assert_eq!(h.engine.next_deadline(), Some(late + 2800));
}

#[test]
fn late_poll_skips_phases_whose_window_closed() {
    let mut h = Harness::active();
    h.poll_at(60);
    // Hold-top ran 2860..4060; exhale runs 4060..7260.
    let events = h.poll_at(5000);
    assert_eq!(fired(&events), vec![(BreathPhase::Exhale, 3200, 5000)]);
    assert_eq!(h.vibrator.vibrate_count(), 2);
    assert_eq!(h.engine.next_deadline(), Some(7260));
}

#[test]
fn vibration_failures_do_not_break_the_loop() {
    let mut h = Harness::active();
    let mut events = h.poll_at(60);

    h.vibrator.set_accepting(false);
    events.extend(h.poll_at(2860));
    h.vibrator.fail_next(2);
    events.extend(h.poll_at(4060));
    events.extend(h.poll_at(7260));
    h.vibrator.set_accepting(true);
    events.extend(h.poll_at(10_060));

    let outcomes: Vec<(BreathPhase, bool, u64)> = events
        .iter()
        .filter_map(|event| match event {
            Event::PhaseFired {
                phase,
                accepted,
                at_ms,
                ..
            } => Some((*phase, *accepted, *at_ms)),
            _ => None,
        })
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (BreathPhase::Inhale, true, 60),
            (BreathPhase::HoldTop, false, 2860),
            (BreathPhase::Exhale, false, 4060),
            (BreathPhase::HoldBottom, false, 7260),
            (BreathPhase::Inhale, true, 10_060),
        ]
    );
    // Failed calls never reach the device; declined ones do.
    let times: Vec<u64> = h.vibrator.patterns().iter().map(|(at, _)| *at).collect();
    assert_eq!(times, vec![60, 2860, 10_060]);
    assert_eq!(h.engine.mode(), EngineMode::Breath);
    assert_eq!(h.engine.next_deadline(), Some(10_060 + 2800));
}

#[test]
fn rapid_cycle_changes_never_stack_timers() {
    let mut h = Harness::active();
    assert_eq!(h.engine.pending_timers(), 1);

    h.clock.set(20);
    h.engine.set_cycle_seconds(12.0);
    h.clock.set(30);
    h.engine.set_cycle_seconds(14.0);
    assert_eq!(h.engine.pending_timers(), 1);
    assert_eq!(h.engine.next_deadline(), Some(90));

    h.poll_at(90);
    assert_eq!(h.vibrator.vibrate_count(), 1);
    // Three phases plus the next cycle start.
    assert_eq!(h.engine.pending_timers(), 4);

    // 14 s cycle: inhale is 3920 ms.
    h.poll_at(90 + 3919);
    assert_eq!(h.vibrator.vibrate_count(), 1);
    h.poll_at(90 + 3920);
    assert_eq!(h.vibrator.vibrate_count(), 2);
}

#[test]
fn same_cycle_length_does_not_restart() {
    let mut h = Harness::active();
    h.poll_at(60);
    h.clock.set(1000);
    assert_eq!(h.engine.set_cycle_seconds(10.0), None);
    assert_eq!(h.engine.pending_timers(), 4);
    assert_eq!(h.engine.next_deadline(), Some(2860));
}

#[test]
fn cycle_length_is_clamped() {
    let mut h = Harness::active();
    h.engine.set_cycle_seconds(1.0);
    assert_eq!(h.engine.cycle_seconds(), 4.0);
    h.engine.set_cycle_seconds(90.0);
    assert_eq!(h.engine.cycle_seconds(), 30.0);
    h.engine.set_cycle_seconds(f64::NAN);
    assert_eq!(h.engine.cycle_seconds(), 10.0);
}

#[test]
fn slider_ticks_are_throttled() {
    let mut h = Harness::new(MemoryStore::new());
    let at = |ms: u64, h: &mut Harness| {
        h.clock.set(ms);
        h.engine.slider_step_tick()
    };
    assert!(at(0, &mut h));
    assert!(!at(50, &mut h));
    assert!(at(85, &mut h));
    assert!(!at(100, &mut h));

    h.engine.set_slider_tick_throttle(30);
    assert!(at(130, &mut h));
    assert_eq!(h.vibrator.vibrate_count(), 3);
}

#[test]
fn disabled_haptics_never_vibrate() {
    let store = MemoryStore::new()
        .with(ENABLED_KEY, "0")
        .with(BREATH_FOLLOW_KEY, "1");
    let mut h = Harness::new(store);
    h.engine.attach();
    h.engine.set_premium_enabled_for_breath(true);
    assert_eq!(h.engine.mode(), EngineMode::Off);

    assert!(!h.engine.tick());
    assert!(!h.engine.slider_step_tick());
    assert!(!h.engine.wosh_hide());
    assert!(!h.engine.wosh_show());
    assert!(!h.engine.confirm_enabled());
    assert!(!h.engine.confirm_breath_enabled());
    assert!(!h.engine.preview_intensity(HapticsIntensity::High));
    h.run_until(25_000, 50);

    assert_eq!(h.vibrator.vibrate_count(), 0);
    assert_eq!(h.engine.pending_timers(), 0);
    assert_eq!(h.lock.acquire_calls(), 0);
}

#[test]
fn breath_follow_without_premium_is_off() {
    let mut h = Harness::new(MemoryStore::new().with(BREATH_FOLLOW_KEY, "1"));
    h.engine.attach();
    h.engine.set_premium_enabled_for_breath(false);
    assert_eq!(h.engine.mode(), EngineMode::Off);
    h.run_until(12_000, 100);
    assert_eq!(h.vibrator.vibrate_count(), 0);
    assert!(!h.lock.is_held());

    // One-shots only need the master switch.
    assert!(h.engine.tick());
}

#[test]
fn disabling_mid_cycle_stops_further_vibration() {
    let mut h = Harness::active();
    h.poll_at(60);
    h.poll_at(3000);
    assert_eq!(h.vibrator.vibrate_count(), 2);
    assert!(h.lock.is_held());

    let mut prefs = h.engine.preferences();
    prefs.enabled = false;
    h.bridge.write(&prefs).unwrap();

    assert_eq!(h.engine.mode(), EngineMode::Off);
    assert!(!h.lock.is_held());
    assert_eq!(
        h.vibrator.calls().last(),
        Some(&VibrationCall::Cancel { at_ms: 3000 })
    );

    h.run_until(40_000, 100);
    assert_eq!(h.vibrator.vibrate_count(), 2);
}

#[test]
fn turning_breath_follow_back_on_restarts_from_inhale() {
    let mut h = Harness::active();
    h.poll_at(60);
    h.bridge.set_raw(BREATH_FOLLOW_KEY, "0").unwrap();
    h.bridge.notify();
    assert_eq!(h.engine.mode(), EngineMode::Off);

    h.clock.set(5000);
    h.bridge.set_raw(BREATH_FOLLOW_KEY, "1").unwrap();
    h.bridge.notify();
    assert_eq!(h.engine.next_deadline(), Some(5060));

    let events = h.poll_at(5060);
    assert_eq!(fired(&events), vec![(BreathPhase::Inhale, 2800, 5060)]);
}

#[test]
fn voice_mode_follows_the_guide() {
    let store = MemoryStore::new()
        .with(BREATH_FOLLOW_KEY, "1")
        .with(VOICE_SYNC_KEY, "1");
    let mut h = Harness::new(store);
    h.engine.attach();
    h.engine.set_premium_enabled_for_breath(true);
    assert_eq!(h.engine.mode(), EngineMode::Breath);

    h.engine.set_voice_active(true);
    assert_eq!(h.engine.mode(), EngineMode::Voice);
    h.engine.set_voice_active(false);
    assert_eq!(h.engine.mode(), EngineMode::Breath);
}

#[test]
fn intensity_change_applies_to_the_next_phase() {
    let mut h = Harness::active();
    h.poll_at(60);
    let med_inhale = h.vibrator.patterns()[0].1.clone();

    h.bridge.set_raw(INTENSITY_KEY, "high").unwrap();
    h.bridge.notify();
    // Same mode, same timing: the running loop keeps its schedule.
    assert_eq!(h.engine.next_deadline(), Some(2860));

    h.poll_at(10_060);
    let patterns = h.vibrator.patterns();
    let high_inhale = &patterns.last().expect("inhale fired").1;
    let strongest = |p: &breathroom_haptics::VibrationPattern| p.pulses().max().unwrap_or(0);
    assert!(strongest(high_inhale) > strongest(&med_inhale));
}

#[test]
fn detach_is_idempotent_and_reattach_resumes() {
    let mut h = Harness::active();
    h.poll_at(60);
    h.engine.detach();
    h.engine.detach();

    assert_eq!(h.lock.release_calls(), 1);
    let cancels = h
        .vibrator
        .calls()
        .iter()
        .filter(|call| matches!(call, VibrationCall::Cancel { .. }))
        .count();
    assert_eq!(cancels, 1);
    assert_eq!(h.engine.pending_timers(), 0);
    assert_eq!(h.bridge.listener_count(), 0);

    h.run_until(15_000, 100);
    assert_eq!(h.vibrator.vibrate_count(), 1);

    h.engine.attach();
    assert_eq!(h.engine.mode(), EngineMode::Breath);
    assert_eq!(h.engine.next_deadline(), Some(15_060));
}

#[test]
fn wake_lock_failure_is_retried_once() {
    let mut h = Harness::new(MemoryStore::new().with(BREATH_FOLLOW_KEY, "1"));
    h.lock.fail_next(1);
    h.engine.attach();
    h.engine.set_premium_enabled_for_breath(true);
    assert!(!h.engine.wake_lock_held());
    assert_eq!(h.engine.next_deadline(), Some(60));

    h.poll_at(60);
    let events = h.poll_at(1200);
    assert!(h.engine.wake_lock_held());
    assert_eq!(h.lock.acquire_calls(), 2);
    assert!(events.contains(&Event::WakeLockChanged {
        held: true,
        at_ms: 1200
    }));
}

#[test]
fn wake_lock_gives_up_after_second_failure() {
    let mut h = Harness::new(MemoryStore::new().with(BREATH_FOLLOW_KEY, "1"));
    h.lock.fail_next(5);
    h.engine.attach();
    h.engine.set_premium_enabled_for_breath(true);
    h.run_until(20_000, 100);
    assert_eq!(h.lock.acquire_calls(), 2);
    assert!(!h.engine.wake_lock_held());
    // Haptics keep running without it.
    assert!(h.vibrator.vibrate_count() >= 5);
}

#[test]
fn revoked_wake_lock_is_reacquired() {
    let mut h = Harness::active();
    h.poll_at(500);
    h.lock.revoke();
    h.engine.notify_wake_lock_released();
    assert!(!h.engine.wake_lock_held());

    h.poll_at(1699);
    assert!(!h.engine.wake_lock_held());
    h.poll_at(1700);
    assert!(h.engine.wake_lock_held());
    assert!(h.lock.is_held());
}

#[test]
fn visibility_controls_the_wake_lock() {
    let mut h = Harness::active();
    assert!(h.lock.is_held());
    h.engine.set_page_visible(false);
    assert!(!h.lock.is_held());
    h.engine.set_page_visible(true);
    assert!(h.lock.is_held());

    h.engine.set_premium_enabled_for_breath(false);
    h.engine.set_page_visible(false);
    h.engine.set_page_visible(true);
    assert!(!h.lock.is_held());
}

#[test]
fn seeded_engines_repeat_their_patterns() {
    let run = |seed: u64| {
        let mut h = Harness::with_seed(MemoryStore::new().with(BREATH_FOLLOW_KEY, "1"), seed);
        h.engine.attach();
        h.engine.set_premium_enabled_for_breath(true);
        h.run_until(25_000, 20);
        h.vibrator.patterns()
    };
    assert_eq!(run(7), run(7));
}
