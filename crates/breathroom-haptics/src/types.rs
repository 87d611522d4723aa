//! Shared domain types: intensities, phases, modes and patterns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// User-selected vibration strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HapticsIntensity {
    Low,
    #[default]
    Med,
    High,
}

impl HapticsIntensity {
    pub const ALL: [HapticsIntensity; 3] = [Self::Low, Self::Med, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Med => "med",
            Self::High => "high",
        }
    }
}

impl fmt::Display for HapticsIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HapticsIntensity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "med" | "medium" => Ok(Self::Med),
            "high" => Ok(Self::High),
            _ => Err(ValidationError::UnknownValue {
                field: "intensity".into(),
                value: s.to_string(),
            }),
        }
    }
}

/// One of the four segments of a breathing cycle, in cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreathPhase {
    Inhale,
    HoldTop,
    Exhale,
    HoldBottom,
}

impl BreathPhase {
    /// Cycle order.
    pub const ALL: [BreathPhase; 4] = [
        Self::Inhale,
        Self::HoldTop,
        Self::Exhale,
        Self::HoldBottom,
    ];
}

impl FromStr for BreathPhase {
    type Err = ValidationError;

    /// Accepts the canonical names plus the short `in` / `hold` / `out`
    /// aliases still sent by older screens.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inhale" | "in" => Ok(Self::Inhale),
            "hold_top" | "holdtop" | "hold" => Ok(Self::HoldTop),
            "exhale" | "out" => Ok(Self::Exhale),
            "hold_bottom" | "holdbottom" => Ok(Self::HoldBottom),
            _ => Err(ValidationError::UnknownValue {
                field: "phase".into(),
                value: s.to_string(),
            }),
        }
    }
}

/// Derived engine mode. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    #[default]
    Off,
    Breath,
    Voice,
}

impl EngineMode {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Pattern flavour for the cycle loop, `None` while off.
    pub fn pattern_mode(&self) -> Option<PatternMode> {
        match self {
            Self::Off => None,
            Self::Breath => Some(PatternMode::Breath),
            Self::Voice => Some(PatternMode::Voice),
        }
    }
}

/// Flavour of phase patterns. Voice patterns are slightly softer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternMode {
    Breath,
    Voice,
}

/// Persisted haptics settings snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HapticsPreferences {
    /// Master switch for every vibration, including UI ticks.
    pub enabled: bool,
    pub intensity: HapticsIntensity,
    /// Cycle-synced vibration (paid tier, off by default).
    pub breath_follow_enabled: bool,
    /// Switch to voice-flavoured patterns while the voice guide speaks.
    pub voice_sync_enabled: bool,
}

impl Default for HapticsPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            intensity: HapticsIntensity::Med,
            breath_follow_enabled: false,
            voice_sync_enabled: false,
        }
    }
}

/// A single scheduled phase firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEvent {
    pub phase: BreathPhase,
    pub duration_ms: u32,
}

/// Alternating pulse/pause durations in milliseconds, starting with a pulse.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VibrationPattern(Vec<u32>);

impl VibrationPattern {
    pub fn new(steps: Vec<u32>) -> Self {
        Self(steps)
    }

    /// One pulse, the equivalent of vibrating for a plain duration.
    pub fn single(pulse_ms: u32) -> Self {
        Self(vec![pulse_ms])
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of every pulse and pause.
    pub fn total_ms(&self) -> u64 {
        self.0.iter().map(|&ms| u64::from(ms)).sum()
    }

    /// Vibration-on entries (even indices).
    pub fn pulses(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().step_by(2).copied()
    }

    /// Vibration-off entries (odd indices).
    pub fn pauses(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().skip(1).step_by(2).copied()
    }

    pub fn pulse_count(&self) -> usize {
        self.0.len().div_ceil(2)
    }
}

impl From<Vec<u32>> for VibrationPattern {
    fn from(steps: Vec<u32>) -> Self {
        Self(steps)
    }
}

impl AsRef<[u32]> for VibrationPattern {
    fn as_ref(&self) -> &[u32] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intensity_parses_tolerantly() {
        assert_eq!(" HIGH ".parse::<HapticsIntensity>().unwrap(), HapticsIntensity::High);
        assert_eq!("medium".parse::<HapticsIntensity>().unwrap(), HapticsIntensity::Med);
        assert!("loud".parse::<HapticsIntensity>().is_err());
    }

    #[test]
    fn phase_accepts_short_aliases() {
        assert_eq!("in".parse::<BreathPhase>().unwrap(), BreathPhase::Inhale);
        assert_eq!("hold".parse::<BreathPhase>().unwrap(), BreathPhase::HoldTop);
        assert_eq!("out".parse::<BreathPhase>().unwrap(), BreathPhase::Exhale);
        assert_eq!("hold_bottom".parse::<BreathPhase>().unwrap(), BreathPhase::HoldBottom);
    }

    #[test]
    fn pattern_splits_pulses_and_pauses() {
        let pattern = VibrationPattern::new(vec![10, 100, 12, 90, 14]);
        assert_eq!(pattern.pulses().collect::<Vec<_>>(), vec![10, 12, 14]);
        assert_eq!(pattern.pauses().collect::<Vec<_>>(), vec![100, 90]);
        assert_eq!(pattern.pulse_count(), 3);
        assert_eq!(pattern.total_ms(), 226);
    }

    #[test]
    fn default_preferences_keep_breath_follow_off() {
        let prefs = HapticsPreferences::default();
        assert!(prefs.enabled);
        assert_eq!(prefs.intensity, HapticsIntensity::Med);
        assert!(!prefs.breath_follow_enabled);
        assert!(!prefs.voice_sync_enabled);
    }
}
