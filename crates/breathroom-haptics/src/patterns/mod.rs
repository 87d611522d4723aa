//! Pulse pattern generation.
//!
//! Everything here is a pure function of its inputs, apart from the jitter
//! drawn from the caller's RNG for the hold-bottom phase.
//!
//! The patterns are deliberately not metronomic: breath phases ramp pulse
//! strength and spacing, slow cycles get more air between pulses rather than
//! only more pulses, and the bottom hold wanders by a few milliseconds.
//! Constant intervals feel robotic; keep the variation.

mod feedback;
mod phase;

pub use feedback::{
    confirm_breath_enabled_pattern, confirm_enabled_pattern, preview_pattern,
    slider_tick_pattern, tick_pattern, wosh_hide_pattern, wosh_show_pattern,
    PREVIEW_DURATION_MS,
};
pub use phase::{
    hold_bottom_pattern, hold_top_pattern, ramp_pattern, RampProfile, DEFAULT_PHASE_MS,
    MIN_PHASE_MS,
};

use rand::Rng;

use crate::types::{BreathPhase, HapticsIntensity, PatternMode, VibrationPattern};

/// Shortest pulse a motor reliably renders.
pub const MIN_PULSE_MS: u32 = 6;

/// Extra softening for patterns played while the voice guide speaks.
pub const VOICE_MULTIPLIER: f64 = 0.9;

/// Pulse scaling for one intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityParams {
    pub multiplier: f64,
    pub max_pulse_ms: u32,
}

impl IntensityParams {
    pub fn for_intensity(intensity: HapticsIntensity) -> Self {
        match intensity {
            HapticsIntensity::Low => Self {
                multiplier: 0.55,
                max_pulse_ms: 34,
            },
            HapticsIntensity::Med => Self {
                multiplier: 1.0,
                max_pulse_ms: 55,
            },
            HapticsIntensity::High => Self {
                multiplier: 1.55,
                max_pulse_ms: 85,
            },
        }
    }

    /// Same ceiling, softer multiplier in voice mode.
    pub fn with_mode(self, mode: PatternMode) -> Self {
        match mode {
            PatternMode::Breath => self,
            PatternMode::Voice => Self {
                multiplier: self.multiplier * VOICE_MULTIPLIER,
                ..self
            },
        }
    }

    pub fn scale(&self, base_ms: f64) -> u32 {
        scale_pulse(base_ms, self.multiplier, self.max_pulse_ms)
    }
}

pub fn intensity_params(intensity: HapticsIntensity) -> IntensityParams {
    IntensityParams::for_intensity(intensity)
}

/// `clamp(round(ms * multiplier), 6, max_pulse_ms)`
pub fn scale_pulse(ms: f64, multiplier: f64, max_pulse_ms: u32) -> u32 {
    let scaled = (ms * multiplier).round();
    if !scaled.is_finite() || scaled <= f64::from(MIN_PULSE_MS) {
        return MIN_PULSE_MS;
    }
    (scaled as u32).clamp(MIN_PULSE_MS, max_pulse_ms.max(MIN_PULSE_MS))
}

/// Scale the pulse entries (even indices) of a base pattern, leaving the
/// pauses untouched.
pub fn scale_pulses(base: &[u32], params: IntensityParams) -> VibrationPattern {
    base.iter()
        .enumerate()
        .map(|(i, &ms)| if i % 2 == 0 { params.scale(f64::from(ms)) } else { ms })
        .collect::<Vec<_>>()
        .into()
}

/// Target spacing between pulse onsets in breath ramps. Lower means more ticks.
pub fn target_tick_ms(intensity: HapticsIntensity) -> u32 {
    match intensity {
        HapticsIntensity::High => 170,
        HapticsIntensity::Med => 200,
        HapticsIntensity::Low => 240,
    }
}

/// Build the pattern for one breathing phase.
///
/// `duration_ms` defaults to [`DEFAULT_PHASE_MS`] and is floored at
/// [`MIN_PHASE_MS`]. The total of the returned pattern never exceeds the
/// effective duration.
pub fn phase_pattern<R: Rng + ?Sized>(
    phase: BreathPhase,
    intensity: HapticsIntensity,
    mode: PatternMode,
    duration_ms: Option<u32>,
    rng: &mut R,
) -> VibrationPattern {
    let params = IntensityParams::for_intensity(intensity).with_mode(mode);
    let duration_ms = duration_ms.unwrap_or(DEFAULT_PHASE_MS).max(MIN_PHASE_MS);

    match phase {
        BreathPhase::HoldTop => hold_top_pattern(duration_ms, params),
        BreathPhase::HoldBottom => hold_bottom_pattern(duration_ms, params, intensity, rng),
        BreathPhase::Inhale | BreathPhase::Exhale => ramp_pattern(
            duration_ms,
            RampProfile::for_phase(phase, intensity),
            params,
            target_tick_ms(intensity),
        ),
    }
}
