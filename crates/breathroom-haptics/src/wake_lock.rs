//! Best-effort screen wake lock.
//!
//! The lock is wanted while the breathing loop runs. Platforms drop it when
//! the page is hidden and may revoke it at any time, so the manager
//! reacquires on visibility and retries a failed or revoked lock exactly once
//! after [`DEFAULT_RETRY_DELAY_MS`]. Nothing here is ever fatal.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::WakeLockError;

pub const DEFAULT_RETRY_DELAY_MS: u64 = 1200;

/// Platform wake lock capability.
pub trait WakeLockBackend {
    fn is_supported(&self) -> bool;
    fn acquire(&mut self) -> Result<(), WakeLockError>;
    fn release(&mut self) -> Result<(), WakeLockError>;
}

/// Keeps at most one lock, tied to "enabled and visible".
pub struct WakeLockManager {
    backend: Box<dyn WakeLockBackend>,
    enabled: bool,
    attached: bool,
    visible: bool,
    held: bool,
    retry_at: Option<u64>,
    retry_delay_ms: u64,
}

impl WakeLockManager {
    pub fn new(backend: Box<dyn WakeLockBackend>) -> Self {
        Self {
            backend,
            enabled: true,
            attached: false,
            visible: true,
            held: false,
            retry_at: None,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_supported(&self) -> bool {
        self.backend.is_supported()
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// When the pending retry is due, if one is scheduled.
    pub fn next_deadline(&self) -> Option<u64> {
        self.retry_at
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Disabling releases immediately and drops any pending retry.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.retry_at = None;
            self.release();
        }
    }

    /// Start following visibility changes.
    pub fn attach(&mut self) {
        self.attached = true;
    }

    /// Stop following visibility changes and let go of the lock.
    pub fn detach(&mut self) {
        self.attached = false;
        self.retry_at = None;
        self.release();
    }

    /// Page visibility changed. Only acted upon while attached.
    pub fn on_visibility_change(&mut self, visible: bool, now_ms: u64) {
        self.visible = visible;
        if !self.attached {
            return;
        }
        if visible {
            self.request(now_ms);
        } else {
            // Locks cannot be held while hidden.
            self.retry_at = None;
            self.release();
        }
    }

    /// Try to take the lock. A failure schedules one retry; a hidden page
    /// waits for the next visibility change instead.
    pub fn request(&mut self, now_ms: u64) {
        match self.try_acquire() {
            Ok(()) => {}
            Err(WakeLockError::NotVisible) => trace!("wake lock deferred until visible"),
            Err(_) => self.schedule_retry(now_ms),
        }
    }

    /// The platform revoked the lock on its own.
    pub fn on_released(&mut self, now_ms: u64) {
        if !self.held {
            return;
        }
        debug!("wake lock released by platform");
        self.held = false;
        self.schedule_retry(now_ms);
    }

    /// Run the pending retry if it is due. A failed retry is not retried.
    pub fn poll(&mut self, now_ms: u64) {
        match self.retry_at {
            Some(at) if at <= now_ms => {
                self.retry_at = None;
                if let Err(err) = self.try_acquire() {
                    debug!(error = %err, "wake lock retry failed; giving up");
                }
            }
            _ => {}
        }
    }

    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Err(err) = self.backend.release() {
            debug!(error = %err, "wake lock release failed");
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// `Ok` when the lock is held afterwards or was not wanted at all.
    fn try_acquire(&mut self) -> Result<(), WakeLockError> {
        if !self.enabled || self.held {
            return Ok(());
        }
        if !self.backend.is_supported() {
            return Ok(());
        }
        if !self.visible {
            return Err(WakeLockError::NotVisible);
        }
        match self.backend.acquire() {
            Ok(()) => {
                self.held = true;
                self.retry_at = None;
                debug!("wake lock acquired");
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "wake lock request failed");
                Err(err)
            }
        }
    }

    fn schedule_retry(&mut self, now_ms: u64) {
        if !self.enabled || !self.visible || self.retry_at.is_some() {
            return;
        }
        self.retry_at = Some(now_ms + self.retry_delay_ms);
    }
}

impl std::fmt::Debug for WakeLockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeLockManager")
            .field("enabled", &self.enabled)
            .field("attached", &self.attached)
            .field("visible", &self.visible)
            .field("held", &self.held)
            .field("retry_at", &self.retry_at)
            .finish_non_exhaustive()
    }
}

/// Backend for platforms without a wake lock API.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWakeLock;

impl WakeLockBackend for NoWakeLock {
    fn is_supported(&self) -> bool {
        false
    }

    fn acquire(&mut self) -> Result<(), WakeLockError> {
        Err(WakeLockError::Unsupported)
    }

    fn release(&mut self) -> Result<(), WakeLockError> {
        Ok(())
    }
}

/// Scriptable in-memory wake lock. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedWakeLock {
    held: Rc<Cell<bool>>,
    failures_left: Rc<Cell<u32>>,
    acquire_calls: Rc<Cell<u32>>,
    release_calls: Rc<Cell<u32>>,
}

impl ScriptedWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` acquisitions fail.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.set(n);
    }

    pub fn is_held(&self) -> bool {
        self.held.get()
    }

    pub fn acquire_calls(&self) -> u32 {
        self.acquire_calls.get()
    }

    pub fn release_calls(&self) -> u32 {
        self.release_calls.get()
    }

    /// Simulate the platform dropping the lock. The owner still has to be
    /// told through [`WakeLockManager::on_released`].
    pub fn revoke(&self) {
        self.held.set(false);
    }
}

impl WakeLockBackend for ScriptedWakeLock {
    fn is_supported(&self) -> bool {
        true
    }

    fn acquire(&mut self) -> Result<(), WakeLockError> {
        self.acquire_calls.set(self.acquire_calls.get() + 1);
        let left = self.failures_left.get();
        if left > 0 {
            self.failures_left.set(left - 1);
            return Err(WakeLockError::Denied("scripted failure".into()));
        }
        self.held.set(true);
        Ok(())
    }

    fn release(&mut self) -> Result<(), WakeLockError> {
        self.release_calls.set(self.release_calls.get() + 1);
        self.held.set(false);
        Ok(())
    }
}
