//! Vibration platform adapter.
//!
//! Hosts plug their device vibration API in as a [`VibrationBackend`].
//! [`HapticsPlatform`] wraps it so nothing ever fails outward: support is
//! detected once, rejected or failing requests come back as `false`, and
//! cancelling on an unsupported device does nothing.
//!
//! A new request replaces whatever pattern is still playing. Platforms that
//! cannot pre-empt may queue or drop it instead; that behaviour has not been
//! verified across devices.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::PlatformError;
use crate::timer::Clock;
use crate::types::VibrationPattern;

/// Device vibration capability.
pub trait VibrationBackend {
    fn is_supported(&self) -> bool;

    /// Start a pulse/pause pattern. `Ok(false)` means the platform declined.
    fn vibrate(&mut self, pattern: &[u32]) -> Result<bool, PlatformError>;

    /// Stop any pattern still playing.
    fn cancel(&mut self) -> Result<(), PlatformError>;
}

/// Best-effort wrapper around a [`VibrationBackend`].
pub struct HapticsPlatform {
    backend: Box<dyn VibrationBackend>,
    supported: bool,
}

impl HapticsPlatform {
    pub fn new(backend: Box<dyn VibrationBackend>) -> Self {
        let supported = backend.is_supported();
        if !supported {
            debug!("vibration unsupported; haptics stay silent");
        }
        Self { backend, supported }
    }

    /// Detected once at construction and never re-probed.
    pub fn supported(&self) -> bool {
        self.supported
    }

    /// Issue a request; returns whether the platform accepted it.
    pub fn vibrate(&mut self, pattern: &VibrationPattern) -> bool {
        if !self.supported || pattern.is_empty() {
            return false;
        }
        match self.backend.vibrate(pattern.as_slice()) {
            Ok(accepted) => {
                trace!(steps = pattern.len(), total_ms = pattern.total_ms(), accepted, "vibrate");
                accepted
            }
            Err(err) => {
                debug!(error = %err, "vibration request failed");
                false
            }
        }
    }

    pub fn stop(&mut self) {
        if !self.supported {
            return;
        }
        if let Err(err) = self.backend.cancel() {
            debug!(error = %err, "vibration cancel failed");
        }
    }
}

impl std::fmt::Debug for HapticsPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HapticsPlatform")
            .field("supported", &self.supported)
            .finish_non_exhaustive()
    }
}

/// Backend for devices without a vibration motor.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedVibrator;

impl VibrationBackend for UnsupportedVibrator {
    fn is_supported(&self) -> bool {
        false
    }

    fn vibrate(&mut self, _pattern: &[u32]) -> Result<bool, PlatformError> {
        Err(PlatformError::Unsupported)
    }

    fn cancel(&mut self) -> Result<(), PlatformError> {
        Err(PlatformError::Unsupported)
    }
}

/// One call seen by a [`RecordingVibrator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VibrationCall {
    Vibrate { at_ms: u64, pattern: VibrationPattern },
    Cancel { at_ms: u64 },
}

impl VibrationCall {
    pub fn at_ms(&self) -> u64 {
        match self {
            Self::Vibrate { at_ms, .. } | Self::Cancel { at_ms } => *at_ms,
        }
    }

    pub fn pattern(&self) -> Option<&VibrationPattern> {
        match self {
            Self::Vibrate { pattern, .. } => Some(pattern),
            Self::Cancel { .. } => None,
        }
    }
}

/// In-memory backend that records every call, for tests and headless hosts.
///
/// Clones share the log and the knobs, so keep one clone for inspection and
/// hand the other to the engine.
#[derive(Clone)]
pub struct RecordingVibrator {
    clock: Rc<dyn Clock>,
    supported: bool,
    calls: Rc<RefCell<Vec<VibrationCall>>>,
    accepting: Rc<Cell<bool>>,
    failures_left: Rc<Cell<u32>>,
}

impl RecordingVibrator {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            supported: true,
            calls: Rc::new(RefCell::new(Vec::new())),
            accepting: Rc::new(Cell::new(true)),
            failures_left: Rc::new(Cell::new(0)),
        }
    }

    /// A recorder that reports no vibration support.
    pub fn unsupported(clock: Rc<dyn Clock>) -> Self {
        Self {
            supported: false,
            ..Self::new(clock)
        }
    }

    /// Whether `vibrate` reports acceptance.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.set(accepting);
    }

    /// Make the next `n` calls fail with a backend error.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.set(n);
    }

    pub fn calls(&self) -> Vec<VibrationCall> {
        self.calls.borrow().clone()
    }

    /// Only the vibrate calls, with their timestamps.
    pub fn patterns(&self) -> Vec<(u64, VibrationPattern)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                VibrationCall::Vibrate { at_ms, pattern } => Some((*at_ms, pattern.clone())),
                VibrationCall::Cancel { .. } => None,
            })
            .collect()
    }

    pub fn vibrate_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, VibrationCall::Vibrate { .. }))
            .count()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    fn take_failure(&self) -> bool {
        let left = self.failures_left.get();
        if left == 0 {
            return false;
        }
        self.failures_left.set(left - 1);
        true
    }
}

impl VibrationBackend for RecordingVibrator {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn vibrate(&mut self, pattern: &[u32]) -> Result<bool, PlatformError> {
        if self.take_failure() {
            return Err(PlatformError::Backend("injected failure".into()));
        }
        self.calls.borrow_mut().push(VibrationCall::Vibrate {
            at_ms: self.clock.now_ms(),
            pattern: VibrationPattern::new(pattern.to_vec()),
        });
        Ok(self.accepting.get())
    }

    fn cancel(&mut self) -> Result<(), PlatformError> {
        self.calls.borrow_mut().push(VibrationCall::Cancel {
            at_ms: self.clock.now_ms(),
        });
        Ok(())
    }
}
