//! Breathing cycle timing.
//!
//! The phase ratios are shared with the breathing indicator animation and the
//! voice guide schedule. Haptics stay phase-locked with both only as long as
//! all three use the same numbers.

use serde::{Deserialize, Serialize};

use crate::types::{BreathPhase, PhaseEvent};

pub const MIN_CYCLE_SECONDS: f64 = 4.0;
pub const MAX_CYCLE_SECONDS: f64 = 30.0;
pub const DEFAULT_CYCLE_SECONDS: f64 = 10.0;

pub const INHALE_RATIO: f64 = 0.28;
pub const HOLD_TOP_RATIO: f64 = 0.12;
pub const EXHALE_RATIO: f64 = 0.32;

/// Clamp a requested cycle length into the supported range.
///
/// Non-finite input falls back to [`DEFAULT_CYCLE_SECONDS`].
pub fn clamp_cycle_seconds(seconds: f64) -> f64 {
    if !seconds.is_finite() {
        return DEFAULT_CYCLE_SECONDS;
    }
    seconds.clamp(MIN_CYCLE_SECONDS, MAX_CYCLE_SECONDS)
}

/// Phase durations of one breathing cycle. Hold-bottom takes the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleTiming {
    pub cycle_seconds: f64,
    pub inhale_ms: u32,
    pub hold_top_ms: u32,
    pub exhale_ms: u32,
    pub hold_bottom_ms: u32,
}

impl CycleTiming {
    pub fn from_seconds(seconds: f64) -> Self {
        let cycle_seconds = clamp_cycle_seconds(seconds);
        let cycle_ms = (cycle_seconds * 1000.0).round() as u32;
        let inhale_ms = (cycle_seconds * INHALE_RATIO * 1000.0).round() as u32;
        let hold_top_ms = (cycle_seconds * HOLD_TOP_RATIO * 1000.0).round() as u32;
        let exhale_ms = (cycle_seconds * EXHALE_RATIO * 1000.0).round() as u32;
        let hold_bottom_ms = cycle_ms.saturating_sub(inhale_ms + hold_top_ms + exhale_ms);
        Self {
            cycle_seconds,
            inhale_ms,
            hold_top_ms,
            exhale_ms,
            hold_bottom_ms,
        }
    }

    pub fn cycle_ms(&self) -> u64 {
        u64::from(self.inhale_ms)
            + u64::from(self.hold_top_ms)
            + u64::from(self.exhale_ms)
            + u64::from(self.hold_bottom_ms)
    }

    pub fn duration_of(&self, phase: BreathPhase) -> u32 {
        match phase {
            BreathPhase::Inhale => self.inhale_ms,
            BreathPhase::HoldTop => self.hold_top_ms,
            BreathPhase::Exhale => self.exhale_ms,
            BreathPhase::HoldBottom => self.hold_bottom_ms,
        }
    }

    /// Offset of a phase from the cycle start.
    pub fn offset_of(&self, phase: BreathPhase) -> u64 {
        match phase {
            BreathPhase::Inhale => 0,
            BreathPhase::HoldTop => u64::from(self.inhale_ms),
            BreathPhase::Exhale => u64::from(self.inhale_ms) + u64::from(self.hold_top_ms),
            BreathPhase::HoldBottom => {
                u64::from(self.inhale_ms)
                    + u64::from(self.hold_top_ms)
                    + u64::from(self.exhale_ms)
            }
        }
    }

    /// Every phase of the cycle with its offset, in firing order.
    ///
    /// A zero-length hold-bottom is left out.
    pub fn schedule(&self) -> Vec<(u64, PhaseEvent)> {
        BreathPhase::ALL
            .iter()
            .filter(|&&phase| phase != BreathPhase::HoldBottom || self.hold_bottom_ms > 0)
            .map(|&phase| {
                (
                    self.offset_of(phase),
                    PhaseEvent {
                        phase,
                        duration_ms: self.duration_of(phase),
                    },
                )
            })
            .collect()
    }
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self::from_seconds(DEFAULT_CYCLE_SECONDS)
    }
}
