//! Per-phase pattern builders.

use rand::Rng;

use super::IntensityParams;
use crate::types::{BreathPhase, HapticsIntensity, VibrationPattern};

/// Duration assumed when a phase is requested without one.
pub const DEFAULT_PHASE_MS: u32 = 900;
/// Floor applied to every requested phase duration.
pub const MIN_PHASE_MS: u32 = 250;

const MIN_RAMP_STEPS: u32 = 5;
const MAX_RAMP_STEPS: u32 = 26;

/// Share of the top hold that may carry pulses; the rest stays silent.
const HOLD_TOP_ACTIVE_SHARE: f64 = 0.7;

/// Share of the bottom hold kept silent before the next inhale.
const HOLD_BOTTOM_TAIL_SHARE: f64 = 0.14;
const HOLD_BOTTOM_INNER_PAUSE_MS: u32 = 110;
const HOLD_BOTTOM_INNER_JITTER_MS: u32 = 14;
const HOLD_BOTTOM_GAP_JITTER_MS: u32 = 10;
const HOLD_BOTTOM_MIN_GAP_MS: f64 = 440.0;
const HOLD_BOTTOM_MAX_GAP_MS: f64 = 1200.0;

/// Start and end points of a breath ramp, in unscaled milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampProfile {
    pub start_pulse: f64,
    pub end_pulse: f64,
    pub start_pause: f64,
    pub end_pause: f64,
}

impl RampProfile {
    /// Inhale ramps weak to strong, exhale mirrors it. Each intensity has its
    /// own shape rather than a plain multiple of the medium one.
    pub fn for_phase(phase: BreathPhase, intensity: HapticsIntensity) -> Self {
        let inhale = match intensity {
            HapticsIntensity::Low => Self {
                start_pulse: 8.0,
                end_pulse: 18.0,
                start_pause: 110.0,
                end_pause: 48.0,
            },
            HapticsIntensity::Med => Self {
                start_pulse: 10.0,
                end_pulse: 26.0,
                start_pause: 95.0,
                end_pause: 34.0,
            },
            HapticsIntensity::High => Self {
                start_pulse: 12.0,
                end_pulse: 34.0,
                start_pause: 85.0,
                end_pause: 28.0,
            },
        };
        match phase {
            BreathPhase::Exhale => inhale.reversed(),
            _ => inhale,
        }
    }

    pub fn reversed(self) -> Self {
        Self {
            start_pulse: self.end_pulse,
            end_pulse: self.start_pulse,
            start_pause: self.end_pause,
            end_pause: self.start_pause,
        }
    }

    fn at(&self, t: f64) -> (f64, f64) {
        let pulse = (self.start_pulse + (self.end_pulse - self.start_pulse) * t).round();
        let pause = (self.start_pause + (self.end_pause - self.start_pause) * t).round();
        (pulse, pause)
    }
}

/// Pulse train spanning the whole phase with interpolated pulse and pause
/// lengths.
///
/// Pauses stretch with the phase length (`duration / 1200`, clamped to
/// 0.95..=1.8) so slow cycles get more air, not only more pulses. Generation
/// stops as soon as the next entry would overrun the phase.
pub fn ramp_pattern(
    duration_ms: u32,
    profile: RampProfile,
    params: IntensityParams,
    target_tick_ms: u32,
) -> VibrationPattern {
    let duration = u64::from(duration_ms);
    let pause_scale = (f64::from(duration_ms) / 1200.0).clamp(0.95, 1.8);
    let steps = ((f64::from(duration_ms) / f64::from(target_tick_ms.max(1))).round() as u32)
        .clamp(MIN_RAMP_STEPS, MAX_RAMP_STEPS);

    let mut pattern = Vec::with_capacity(steps as usize * 2);
    let mut spent = 0u64;

    for i in 0..steps {
        let t = f64::from(i) / f64::from(steps - 1);
        let (pulse_raw, pause_raw) = profile.at(t);
        let pulse = params.scale(pulse_raw);
        let pause = (pause_raw * pause_scale).round().max(0.0) as u32;

        if spent + u64::from(pulse) > duration {
            break;
        }
        pattern.push(pulse);
        spent += u64::from(pulse);

        if i + 1 == steps {
            break;
        }
        // A missing pause would fuse two pulses, so stop instead.
        if spent + u64::from(pause) >= duration {
            break;
        }
        pattern.push(pause);
        spent += u64::from(pause);
    }

    if pattern.is_empty() && duration_ms > 0 {
        pattern.push(params.scale(12.0));
    }

    pattern.into()
}

/// "Arrival" cue for the top hold: ticks early, then silence until the
/// exhale.
pub fn hold_top_pattern(duration_ms: u32, params: IntensityParams) -> VibrationPattern {
    let active = (f64::from(duration_ms) * HOLD_TOP_ACTIVE_SHARE).round();

    let steps = if active < 380.0 {
        vec![params.scale(12.0)]
    } else if active < 850.0 {
        vec![
            params.scale(12.0),
            (active * 0.55).round() as u32,
            params.scale(10.0),
        ]
    } else {
        let gap = (active * 0.33).round() as u32;
        vec![
            params.scale(12.0),
            gap,
            params.scale(11.0),
            gap,
            params.scale(10.0),
        ]
    };
    steps.into()
}

/// Slower and denser wait pulses at higher intensity: one cluster per this
/// many milliseconds of bottom hold.
fn hold_bottom_divisor(intensity: HapticsIntensity) -> f64 {
    match intensity {
        HapticsIntensity::High => 920.0,
        HapticsIntensity::Med => 1080.0,
        HapticsIntensity::Low => 1250.0,
    }
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, base: u32, range: u32) -> u32 {
    let offset = rng.gen_range(-(range as i64)..=range as i64);
    (i64::from(base) + offset).clamp(0, 2000) as u32
}

/// Resting "dum .. dum" double taps for the bottom hold.
///
/// Both the pair spacing and the gap between pairs wander by a few
/// milliseconds. The last ~14% of the hold stays free for the next inhale.
/// Pairs that would overrun the phase are dropped; if not even one pair fits,
/// a single pulse is emitted.
pub fn hold_bottom_pattern<R: Rng + ?Sized>(
    duration_ms: u32,
    params: IntensityParams,
    intensity: HapticsIntensity,
    rng: &mut R,
) -> VibrationPattern {
    let duration = f64::from(duration_ms);
    let count = ((duration / hold_bottom_divisor(intensity)).round() as u32).clamp(2, 8);

    let first = params.scale(11.0);
    let second = params.scale(8.0);

    let usable = duration_ms.saturating_sub((duration * HOLD_BOTTOM_TAIL_SHARE).round() as u32);
    let cluster_ms = first + HOLD_BOTTOM_INNER_PAUSE_MS + second;
    let remaining = usable.saturating_sub(count * cluster_ms);
    let base_gap = (f64::from(remaining) / f64::from((count - 1).max(1)))
        .round()
        .clamp(HOLD_BOTTOM_MIN_GAP_MS, HOLD_BOTTOM_MAX_GAP_MS) as u32;

    let mut pattern = Vec::with_capacity(count as usize * 4);
    let mut spent = 0u64;

    for i in 0..count {
        let inner = jitter(rng, HOLD_BOTTOM_INNER_PAUSE_MS, HOLD_BOTTOM_INNER_JITTER_MS);
        let gap = if i > 0 {
            jitter(rng, base_gap, HOLD_BOTTOM_GAP_JITTER_MS)
        } else {
            0
        };
        let needed = u64::from(gap) + u64::from(first) + u64::from(inner) + u64::from(second);
        if spent + needed > u64::from(duration_ms) {
            break;
        }
        if i > 0 {
            pattern.push(gap);
        }
        pattern.extend([first, inner, second]);
        spent += needed;
    }

    if pattern.is_empty() {
        pattern.push(first);
    }

    pattern.into()
}
