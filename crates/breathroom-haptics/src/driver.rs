//! Real-time driver.
//!
//! Runs a [`HapticsEngine`] on the current tokio task: sleeps until the next
//! engine deadline, applies host [`Command`]s as they arrive and detaches the
//! engine on shutdown. The engine is not `Send`, so run this on a
//! current-thread runtime or inside a `LocalSet`.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::debug;

use crate::engine::HapticsEngine;
use crate::events::Event;
use crate::timer::Clock;
use crate::types::HapticsIntensity;

/// [`Clock`] on tokio's time source, so paused-time tests stay
/// deterministic.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Instant corresponding to an engine timestamp.
    pub fn instant_at(&self, ms: u64) -> Instant {
        self.origin + Duration::from_millis(ms)
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Signals and one-shots a screen pushes into the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetPremium(bool),
    SetVoiceActive(bool),
    SetCycleSeconds(f64),
    SetSliderThrottle(u64),
    PageVisible(bool),
    WakeLockReleased,
    PreferencesChanged,
    Tick,
    SliderStepTick,
    WoshHide,
    WoshShow,
    ConfirmEnabled,
    ConfirmBreathEnabled,
    PreviewIntensity(HapticsIntensity),
}

/// Apply one command. Returns the mode change it caused, if any.
pub fn dispatch(engine: &mut HapticsEngine, command: Command) -> Option<Event> {
    match command {
        Command::SetPremium(enabled) => engine.set_premium_enabled_for_breath(enabled),
        Command::SetVoiceActive(active) => engine.set_voice_active(active),
        Command::SetCycleSeconds(seconds) => engine.set_cycle_seconds(seconds),
        Command::SetSliderThrottle(ms) => {
            engine.set_slider_tick_throttle(ms);
            None
        }
        Command::PageVisible(visible) => {
            engine.set_page_visible(visible);
            None
        }
        Command::WakeLockReleased => {
            engine.notify_wake_lock_released();
            None
        }
        Command::PreferencesChanged => engine.notify_preferences_changed(),
        Command::Tick => {
            engine.tick();
            None
        }
        Command::SliderStepTick => {
            engine.slider_step_tick();
            None
        }
        Command::WoshHide => {
            engine.wosh_hide();
            None
        }
        Command::WoshShow => {
            engine.wosh_show();
            None
        }
        Command::ConfirmEnabled => {
            engine.confirm_enabled();
            None
        }
        Command::ConfirmBreathEnabled => {
            engine.confirm_breath_enabled();
            None
        }
        Command::PreviewIntensity(intensity) => {
            engine.preview_intensity(intensity);
            None
        }
    }
}

/// Drive `engine` until `shutdown` resolves or every command sender is
/// dropped, then detach it. `clock` must be the clock the engine was built
/// with. Every engine event is handed to `on_event` in order.
pub async fn run(
    engine: &mut HapticsEngine,
    clock: TokioClock,
    mut commands: UnboundedReceiver<Command>,
    shutdown: impl Future<Output = ()>,
    mut on_event: impl FnMut(Event),
) {
    tokio::pin!(shutdown);

    loop {
        let deadline = engine.next_deadline().map(|ms| clock.instant_at(ms));
        let wake = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            command = commands.recv() => match command {
                Some(command) => {
                    if let Some(event) = dispatch(engine, command) {
                        on_event(event);
                    }
                }
                None => {
                    debug!("command channel closed; stopping haptics driver");
                    break;
                }
            },
            _ = wake => {}
        }

        for event in engine.poll() {
            on_event(event);
        }
    }

    engine.detach();
    for event in engine.poll() {
        on_event(event);
    }
}
