use serde::{Deserialize, Serialize};

use crate::timing::CycleTiming;
use crate::types::{BreathPhase, EngineMode};

/// Every state change of the engine produces an Event.
/// Hosts may log or forward them; nothing in the engine depends on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ModeChanged {
        from: EngineMode,
        to: EngineMode,
        at_ms: u64,
    },
    CycleStarted {
        /// Counts cycles since the loop last (re)started.
        cycle_index: u64,
        timing: CycleTiming,
        at_ms: u64,
    },
    PhaseFired {
        phase: BreathPhase,
        duration_ms: u32,
        pulses: usize,
        /// Whether the platform accepted the pattern.
        accepted: bool,
        at_ms: u64,
    },
    WakeLockChanged {
        held: bool,
        at_ms: u64,
    },
}

impl Event {
    pub fn at_ms(&self) -> u64 {
        match self {
            Self::ModeChanged { at_ms, .. }
            | Self::CycleStarted { at_ms, .. }
            | Self::PhaseFired { at_ms, .. }
            | Self::WakeLockChanged { at_ms, .. } => *at_ms,
        }
    }
}
