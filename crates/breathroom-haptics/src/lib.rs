//! # Breathroom Haptics
//!
//! Breath-synchronized vibration feedback for the guided-breathing screen.
//! The visual indicator, the voice guide and this crate all follow the same
//! cycle ratios, so a pulse train lands on every inhale, hold and exhale the
//! user sees and hears.
//!
//! ## Architecture
//!
//! - **Engine**: a timer-driven state machine that derives its mode from the
//!   saved preferences, the paid-tier gate and the voice guide, and runs the
//!   phase-locked cycle loop while active
//! - **Patterns**: pure, intensity-dependent pulse trains with deliberate
//!   ramping and jitter
//! - **Platform**: best-effort adapters for device vibration and the screen
//!   wake lock; nothing ever fails outward
//! - **Preferences**: tolerant reads of the persisted settings plus change
//!   notification
//!
//! ## Key Components
//!
//! - [`HapticsEngine`]: per-screen scheduler
//! - [`phase_pattern`]: the pulse generator
//! - [`PreferenceBridge`]: settings snapshot and change listeners
//! - [`HapticsConfig`]: host-side configuration
//! - [`driver::run`]: tokio loop that drives an engine in real time

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod patterns;
pub mod platform;
pub mod prefs;
pub mod timer;
pub mod timing;
pub mod types;
pub mod wake_lock;

pub use config::HapticsConfig;
pub use engine::{derive_mode, EngineBuilder, HapticsEngine, ModeInputs};
pub use error::{ConfigError, HapticsError, PlatformError, PreferenceError, ValidationError, WakeLockError};
pub use events::Event;
pub use patterns::{phase_pattern, IntensityParams};
pub use platform::{HapticsPlatform, RecordingVibrator, VibrationBackend, VibrationCall};
pub use prefs::{PreferenceBridge, PreferenceStore, Subscription};
pub use timer::{Clock, ManualClock, SystemClock};
pub use timing::CycleTiming;
pub use types::{
    BreathPhase, EngineMode, HapticsIntensity, HapticsPreferences, PatternMode, PhaseEvent,
    VibrationPattern,
};
pub use wake_lock::{ScriptedWakeLock, WakeLockBackend, WakeLockManager};
