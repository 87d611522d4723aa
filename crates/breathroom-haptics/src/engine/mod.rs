//! Breath-synchronized feedback scheduler.
//!
//! The engine is a timer-driven state machine. It does not spawn threads or
//! tasks: the host calls [`HapticsEngine::poll`] whenever
//! [`HapticsEngine::next_deadline`] has passed (see [`crate::driver`] for a
//! tokio loop that does exactly that).
//!
//! ## Mode
//!
//! ```text
//! Off <-> Breath <-> Voice
//! ```
//!
//! The mode is re-derived on every input change (preferences, premium flag,
//! voice activity, cycle length). Entering an active mode schedules the first
//! inhale after a short startup delay; leaving it cancels every pending timer
//! and any vibration still playing.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = HapticsEngine::builder(bridge)
//!     .vibration(Box::new(device_vibrator))
//!     .build();
//! engine.attach();
//! engine.set_premium_enabled_for_breath(true);
//! // Whenever next_deadline() is due:
//! for event in engine.poll() { /* log or forward */ }
//! ```

mod state;

pub use state::{derive_mode, EngineState, ModeInputs, Signal, Transition};

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rand::SeedableRng;
use rand_pcg::Pcg64;
use tracing::{debug, trace};

use crate::config::HapticsConfig;
use crate::events::Event;
use crate::patterns::{
    confirm_breath_enabled_pattern, confirm_enabled_pattern, phase_pattern, preview_pattern,
    slider_tick_pattern, tick_pattern, wosh_hide_pattern, wosh_show_pattern, IntensityParams,
};
use crate::platform::{HapticsPlatform, UnsupportedVibrator, VibrationBackend};
use crate::prefs::{PreferenceBridge, Subscription};
use crate::timer::{Clock, SystemClock, TimerQueue};
use crate::timing::CycleTiming;
use crate::types::{EngineMode, HapticsIntensity, HapticsPreferences, PhaseEvent, VibrationPattern};
use crate::wake_lock::{NoWakeLock, WakeLockBackend, WakeLockManager};

pub const MIN_SLIDER_THROTTLE_MS: u64 = 30;
pub const MAX_SLIDER_THROTTLE_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Task {
    CycleStart,
    Phase(PhaseEvent),
}

/// Builder for [`HapticsEngine`]. Every platform piece defaults to a silent
/// stand-in.
pub struct EngineBuilder {
    bridge: PreferenceBridge,
    vibration: Option<Box<dyn VibrationBackend>>,
    wake_lock: Option<Box<dyn WakeLockBackend>>,
    clock: Option<Rc<dyn Clock>>,
    config: HapticsConfig,
    seed: Option<u64>,
}

impl EngineBuilder {
    pub fn vibration(mut self, backend: Box<dyn VibrationBackend>) -> Self {
        self.vibration = Some(backend);
        self
    }

    pub fn wake_lock(mut self, backend: Box<dyn WakeLockBackend>) -> Self {
        self.wake_lock = Some(backend);
        self
    }

    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: HapticsConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed the hold-bottom jitter. Overrides `engine.jitter_seed`.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> HapticsEngine {
        let config = self.config;
        let clock: Rc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Rc::new(SystemClock::new()),
        };
        let vibration: Box<dyn VibrationBackend> = match self.vibration {
            Some(backend) => backend,
            None => Box::new(UnsupportedVibrator),
        };
        let wake_backend: Box<dyn WakeLockBackend> = match self.wake_lock {
            Some(backend) => backend,
            None => Box::new(NoWakeLock),
        };
        let rng = match self.seed.or(config.engine.jitter_seed) {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_entropy(),
        };

        let platform = HapticsPlatform::new(vibration);
        let mut wake_lock =
            WakeLockManager::new(wake_backend).with_retry_delay(config.wake_lock.retry_delay_ms);
        // Only the running loop wants the screen awake.
        wake_lock.set_enabled(false);

        let inputs = ModeInputs {
            preferences: self.bridge.read(),
            premium: false,
            voice_active: false,
            supported: platform.supported(),
        };
        let state = EngineState::new(inputs, config.engine.default_cycle_seconds);

        let core = EngineCore {
            bridge: self.bridge,
            platform,
            wake_lock,
            clock,
            rng,
            state,
            timers: TimerQueue::new(),
            attached: false,
            cycle_index: 0,
            startup_delay_ms: config.engine.startup_delay_ms,
            wake_lock_allowed: config.wake_lock.enabled,
            slider_throttle_ms: clamp_throttle(config.engine.slider_tick_throttle_ms),
            last_slider_tick_ms: None,
            reported_wake_lock: false,
            prefs_dirty: Rc::new(Cell::new(false)),
            pending_events: Vec::new(),
        };

        HapticsEngine {
            core: Rc::new(RefCell::new(core)),
            subscription: None,
        }
    }
}

struct EngineCore {
    bridge: PreferenceBridge,
    platform: HapticsPlatform,
    wake_lock: WakeLockManager,
    clock: Rc<dyn Clock>,
    rng: Pcg64,
    state: EngineState,
    timers: TimerQueue<Task>,
    attached: bool,
    /// Cycles started since the loop was last (re)built.
    cycle_index: u64,
    startup_delay_ms: u64,
    wake_lock_allowed: bool,
    slider_throttle_ms: u64,
    last_slider_tick_ms: Option<u64>,
    /// Last wake lock state surfaced as an event.
    reported_wake_lock: bool,
    /// Set by the preference listener, cleared once the change is applied.
    prefs_dirty: Rc<Cell<bool>>,
    pending_events: Vec<Event>,
}

/// Per-screen haptics scheduler.
///
/// Owns the platform adapter, the wake lock manager and every timer. Create
/// one per breathing screen, `attach()` it on mount and `detach()` (or drop)
/// it on unmount.
pub struct HapticsEngine {
    core: Rc<RefCell<EngineCore>>,
    subscription: Option<Subscription>,
}

impl HapticsEngine {
    pub fn builder(bridge: PreferenceBridge) -> EngineBuilder {
        EngineBuilder {
            bridge,
            vibration: None,
            wake_lock: None,
            clock: None,
            config: HapticsConfig::default(),
            seed: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn mode(&self) -> EngineMode {
        self.core.borrow().state.mode()
    }

    pub fn timing(&self) -> CycleTiming {
        self.core.borrow().state.timing()
    }

    pub fn cycle_seconds(&self) -> f64 {
        self.core.borrow().state.cycle_seconds()
    }

    /// The snapshot the current mode was derived from.
    pub fn preferences(&self) -> HapticsPreferences {
        self.core.borrow().state.inputs().preferences
    }

    pub fn is_supported(&self) -> bool {
        self.core.borrow().platform.supported()
    }

    pub fn is_attached(&self) -> bool {
        self.core.borrow().attached
    }

    pub fn wake_lock_held(&self) -> bool {
        self.core.borrow().wake_lock.is_held()
    }

    /// Phase and cycle timers waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.core.borrow().timers.len()
    }

    pub fn slider_tick_throttle_ms(&self) -> u64 {
        self.core.borrow().slider_throttle_ms
    }

    /// Earliest time [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        let core = self.core.borrow();
        match (core.timers.next_deadline(), core.wake_lock.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Read preferences, subscribe to their changes, start following page
    /// visibility and start the loop if the mode is active. Calling it again
    /// while attached does nothing.
    pub fn attach(&mut self) -> Option<Event> {
        if self.core.borrow().attached {
            return None;
        }

        let (bridge, dirty) = {
            let core = self.core.borrow();
            (core.bridge.clone(), Rc::clone(&core.prefs_dirty))
        };
        let weak = Rc::downgrade(&self.core);
        self.subscription = Some(bridge.on_change(move || {
            dirty.set(true);
            let Some(core) = weak.upgrade() else {
                return;
            };
            match core.try_borrow_mut() {
                Ok(mut core) => core.sync_preferences(),
                Err(_) => debug!("engine busy; preference reload deferred to next poll"),
            };
        }));

        let mut core = self.core.borrow_mut();
        let now = core.now();
        core.attached = true;
        core.wake_lock.attach();
        core.prefs_dirty.set(false);

        let from = core.state.mode();
        let prefs = core.bridge.read();
        core.state.apply(Signal::Preferences(prefs));
        if core.state.mode().is_active() {
            core.start_loop(now);
        }
        core.flush_wake_lock(now);
        debug!(mode = ?core.state.mode(), "haptics engine attached");
        core.mode_changed(from, now)
    }

    /// Cancel every timer and any vibration still playing, release the wake
    /// lock and unsubscribe. Idempotent.
    pub fn detach(&mut self) {
        self.subscription = None;
        let mut core = self.core.borrow_mut();
        if !core.attached {
            return;
        }
        let now = core.now();
        core.attached = false;
        core.timers.clear();
        core.platform.stop();
        core.wake_lock.detach();
        core.flush_wake_lock(now);
        debug!("haptics engine detached");
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Paid-tier gate for breath-follow haptics.
    pub fn set_premium_enabled_for_breath(&mut self, enabled: bool) -> Option<Event> {
        self.core.borrow_mut().apply(Signal::Premium(enabled))
    }

    /// The voice guide started or stopped speaking.
    pub fn set_voice_active(&mut self, active: bool) -> Option<Event> {
        self.core.borrow_mut().apply(Signal::VoiceActive(active))
    }

    /// New cycle length in seconds, clamped to 4–30. An active loop restarts
    /// from a fresh inhale when the clamped value changes.
    pub fn set_cycle_seconds(&mut self, seconds: f64) -> Option<Event> {
        self.core.borrow_mut().apply(Signal::CycleSeconds(seconds))
    }

    /// Minimum spacing between slider ticks, clamped to 30–200 ms.
    pub fn set_slider_tick_throttle(&mut self, ms: u64) {
        self.core.borrow_mut().slider_throttle_ms = clamp_throttle(ms);
    }

    /// Re-read preferences now. For hosts that bypass the bridge callbacks.
    pub fn notify_preferences_changed(&mut self) -> Option<Event> {
        self.core.borrow_mut().reload_preferences()
    }

    /// Page visibility changed. Ignored while detached.
    pub fn set_page_visible(&mut self, visible: bool) {
        let mut core = self.core.borrow_mut();
        let now = core.now();
        core.wake_lock.on_visibility_change(visible, now);
        core.flush_wake_lock(now);
    }

    /// The platform dropped the wake lock on its own.
    pub fn notify_wake_lock_released(&mut self) {
        let mut core = self.core.borrow_mut();
        let now = core.now();
        core.wake_lock.on_released(now);
        core.flush_wake_lock(now);
    }

    /// Fire every due timer and return the events produced since the last
    /// poll, in order.
    pub fn poll(&mut self) -> Vec<Event> {
        let mut core = self.core.borrow_mut();
        core.sync_preferences();
        let now = core.now();
        core.wake_lock.poll(now);
        while let Some((deadline, task)) = core.timers.pop_due(now) {
            core.run_task(deadline, task, now);
        }
        core.flush_wake_lock(now);
        std::mem::take(&mut core.pending_events)
    }

    // ── One-shots ────────────────────────────────────────────────────

    pub fn tick(&mut self) -> bool {
        self.core.borrow_mut().one_shot(tick_pattern)
    }

    /// Slider detent. Calls closer together than the throttle are dropped.
    pub fn slider_step_tick(&mut self) -> bool {
        let mut core = self.core.borrow_mut();
        let now = core.now();
        if let Some(last) = core.last_slider_tick_ms {
            if now.saturating_sub(last) < core.slider_throttle_ms {
                return false;
            }
        }
        core.last_slider_tick_ms = Some(now);
        core.one_shot(slider_tick_pattern)
    }

    pub fn wosh_hide(&mut self) -> bool {
        self.core.borrow_mut().one_shot(wosh_hide_pattern)
    }

    pub fn wosh_show(&mut self) -> bool {
        self.core.borrow_mut().one_shot(wosh_show_pattern)
    }

    pub fn confirm_enabled(&mut self) -> bool {
        self.core.borrow_mut().one_shot(confirm_enabled_pattern)
    }

    pub fn confirm_breath_enabled(&mut self) -> bool {
        self.core.borrow_mut().one_shot(confirm_breath_enabled_pattern)
    }

    /// Audition an intensity before it is saved.
    pub fn preview_intensity(&mut self, intensity: HapticsIntensity) -> bool {
        self.core
            .borrow_mut()
            .one_shot(|_| preview_pattern(intensity))
    }
}

impl Drop for HapticsEngine {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for HapticsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("HapticsEngine")
            .field("mode", &core.state.mode())
            .field("cycle_seconds", &core.state.cycle_seconds())
            .field("attached", &core.attached)
            .field("pending_timers", &core.timers.len())
            .field("wake_lock", &core.wake_lock)
            .finish_non_exhaustive()
    }
}

impl EngineCore {
    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    fn apply(&mut self, signal: Signal) -> Option<Event> {
        let now = self.now();
        let from = self.state.mode();
        match self.state.apply(signal) {
            Transition::Unchanged => {}
            Transition::Stop => self.stop_loop(),
            Transition::Start | Transition::Restart => self.start_loop(now),
        }
        self.flush_wake_lock(now);
        self.mode_changed(from, now)
    }

    fn mode_changed(&self, from: EngineMode, now: u64) -> Option<Event> {
        let to = self.state.mode();
        if from == to {
            return None;
        }
        debug!(?from, ?to, "haptics mode changed");
        Some(Event::ModeChanged {
            from,
            to,
            at_ms: now,
        })
    }

    fn reload_preferences(&mut self) -> Option<Event> {
        self.prefs_dirty.set(false);
        let prefs = self.bridge.read();
        self.apply(Signal::Preferences(prefs))
    }

    /// Apply a change flagged by the preference listener, if any.
    fn sync_preferences(&mut self) {
        if !self.prefs_dirty.get() {
            return;
        }
        if let Some(event) = self.reload_preferences() {
            self.pending_events.push(event);
        }
    }

    /// Rebuild the loop from scratch. Pending timers are always cleared
    /// first so restarts never stack.
    fn start_loop(&mut self, now: u64) {
        self.timers.clear();
        self.cycle_index = 0;
        if !self.attached {
            return;
        }
        self.wake_lock.set_enabled(self.wake_lock_allowed);
        self.wake_lock.request(now);
        self.timers
            .schedule_at(now + self.startup_delay_ms, Task::CycleStart);
        debug!(
            mode = ?self.state.mode(),
            cycle_seconds = self.state.cycle_seconds(),
            "breath loop scheduled"
        );
    }

    fn stop_loop(&mut self) {
        self.timers.clear();
        self.platform.stop();
        self.wake_lock.set_enabled(false);
        debug!("breath loop stopped");
    }

    fn run_task(&mut self, deadline: u64, task: Task, now: u64) {
        match task {
            Task::CycleStart => self.start_cycle(deadline, now),
            Task::Phase(event) => self.fire_phase(event, deadline, now),
        }
    }

    fn start_cycle(&mut self, deadline: u64, now: u64) {
        if !self.state.mode().is_active() {
            return;
        }
        let timing = self.state.timing();
        let cycle_ms = timing.cycle_ms();
        // Polled more than a whole cycle late: start over from now instead of
        // replaying missed cycles.
        let anchor = if now >= deadline + cycle_ms {
            self.timers.retain(|task| !matches!(task, Task::Phase(_)));
            now
        } else {
            deadline
        };

        let mut first = None;
        for (offset, event) in timing.schedule() {
            if offset == 0 {
                first = Some(event);
            } else {
                self.timers.schedule_at(anchor + offset, Task::Phase(event));
            }
        }
        self.timers.schedule_at(anchor + cycle_ms, Task::CycleStart);

        trace!(cycle = self.cycle_index, anchor, "cycle started");
        self.pending_events.push(Event::CycleStarted {
            cycle_index: self.cycle_index,
            timing,
            at_ms: anchor,
        });
        self.cycle_index += 1;

        if let Some(event) = first {
            self.fire_phase(event, anchor, now);
        }
    }

    fn fire_phase(&mut self, event: PhaseEvent, deadline: u64, now: u64) {
        // A phase whose window already closed belongs to a stale cycle.
        if deadline + u64::from(event.duration_ms) <= now {
            trace!(phase = ?event.phase, deadline, now, "phase window elapsed; dropped");
            return;
        }
        // Preferences may have changed since the timer was set.
        let Some(mode) = self.state.mode().pattern_mode() else {
            trace!(phase = ?event.phase, "engine off; phase dropped");
            return;
        };
        let intensity = self.state.inputs().preferences.intensity;
        let pattern = phase_pattern(
            event.phase,
            intensity,
            mode,
            Some(event.duration_ms),
            &mut self.rng,
        );
        let accepted = self.platform.vibrate(&pattern);
        trace!(phase = ?event.phase, duration_ms = event.duration_ms, accepted, "phase fired");
        self.pending_events.push(Event::PhaseFired {
            phase: event.phase,
            duration_ms: event.duration_ms,
            pulses: pattern.pulse_count(),
            accepted,
            at_ms: now,
        });
    }

    fn one_shot(&mut self, build: impl FnOnce(IntensityParams) -> VibrationPattern) -> bool {
        let prefs = self.state.inputs().preferences;
        if !prefs.enabled || !self.platform.supported() {
            return false;
        }
        let pattern = build(IntensityParams::for_intensity(prefs.intensity));
        self.platform.vibrate(&pattern)
    }

    fn flush_wake_lock(&mut self, now: u64) {
        let held = self.wake_lock.is_held();
        if held != self.reported_wake_lock {
            self.reported_wake_lock = held;
            self.pending_events.push(Event::WakeLockChanged { held, at_ms: now });
        }
    }
}

fn clamp_throttle(ms: u64) -> u64 {
    ms.clamp(MIN_SLIDER_THROTTLE_MS, MAX_SLIDER_THROTTLE_MS)
}
