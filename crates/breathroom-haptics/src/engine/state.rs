//! Mode reducer.
//!
//! The engine keeps its inputs in one [`EngineState`] and feeds every setter
//! through [`EngineState::apply`]. The reducer only decides; timers, the
//! vibration channel and the wake lock are touched by the caller according to
//! the returned [`Transition`].

use crate::timing::{clamp_cycle_seconds, CycleTiming};
use crate::types::{EngineMode, HapticsPreferences};

/// Everything the mode depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeInputs {
    pub preferences: HapticsPreferences,
    /// Paid tier unlocked for breath-follow haptics.
    pub premium: bool,
    /// The voice guide is speaking.
    pub voice_active: bool,
    /// Device vibration detected.
    pub supported: bool,
}

/// Pure mode derivation.
pub fn derive_mode(inputs: &ModeInputs) -> EngineMode {
    let prefs = &inputs.preferences;
    if !prefs.enabled || !inputs.supported || !prefs.breath_follow_enabled || !inputs.premium {
        return EngineMode::Off;
    }
    if prefs.voice_sync_enabled && inputs.voice_active {
        EngineMode::Voice
    } else {
        EngineMode::Breath
    }
}

/// An input change pushed into the reducer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Preferences(HapticsPreferences),
    Premium(bool),
    VoiceActive(bool),
    CycleSeconds(f64),
}

/// What the engine has to do after a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Mode and timing unchanged, or both off.
    Unchanged,
    /// Left an active mode for Off.
    Stop,
    /// Entered an active mode from Off.
    Start,
    /// Still active but the loop must be rebuilt (mode flavour or cycle
    /// length changed).
    Restart,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    inputs: ModeInputs,
    cycle_seconds: f64,
    mode: EngineMode,
}

impl EngineState {
    pub fn new(inputs: ModeInputs, cycle_seconds: f64) -> Self {
        Self {
            mode: derive_mode(&inputs),
            inputs,
            cycle_seconds: clamp_cycle_seconds(cycle_seconds),
        }
    }

    pub fn inputs(&self) -> &ModeInputs {
        &self.inputs
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn cycle_seconds(&self) -> f64 {
        self.cycle_seconds
    }

    pub fn timing(&self) -> CycleTiming {
        CycleTiming::from_seconds(self.cycle_seconds)
    }

    pub fn apply(&mut self, signal: Signal) -> Transition {
        let mut timing_changed = false;
        match signal {
            Signal::Preferences(prefs) => self.inputs.preferences = prefs,
            Signal::Premium(premium) => self.inputs.premium = premium,
            Signal::VoiceActive(active) => self.inputs.voice_active = active,
            Signal::CycleSeconds(seconds) => {
                let clamped = clamp_cycle_seconds(seconds);
                timing_changed = clamped != self.cycle_seconds;
                self.cycle_seconds = clamped;
            }
        }

        let previous = self.mode;
        self.mode = derive_mode(&self.inputs);

        match (previous.is_active(), self.mode.is_active()) {
            (false, false) => Transition::Unchanged,
            (true, false) => Transition::Stop,
            (false, true) => Transition::Start,
            (true, true) if previous != self.mode || timing_changed => Transition::Restart,
            (true, true) => Transition::Unchanged,
        }
    }
}
