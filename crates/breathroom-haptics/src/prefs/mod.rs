//! Preference bridge: tolerant reads of the persisted haptics settings plus
//! change notification.
//!
//! Every field is parsed on its own. A missing, unreadable or malformed value
//! falls back to that field's default without disturbing the others.

mod store;

pub use store::{MemoryStore, PreferenceStore, TomlFileStore};

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::error::PreferenceError;
use crate::types::{HapticsIntensity, HapticsPreferences};

pub const ENABLED_KEY: &str = "haptics_enabled";
pub const INTENSITY_KEY: &str = "haptics_intensity";
pub const BREATH_FOLLOW_KEY: &str = "breath_haptics";
pub const VOICE_SYNC_KEY: &str = "haptics_voice_sync";

/// Lenient boolean: `1/0`, `true/false`, `on/off`, `yes/no`.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

type Listener = Rc<RefCell<Box<dyn FnMut()>>>;

struct BridgeInner {
    store: RefCell<Box<dyn PreferenceStore>>,
    listeners: RefCell<Vec<(u64, Listener)>>,
    next_listener: Cell<u64>,
}

/// Shared handle to the preference store. Clones talk to the same store and
/// the same listeners.
#[derive(Clone)]
pub struct PreferenceBridge {
    inner: Rc<BridgeInner>,
}

impl PreferenceBridge {
    pub fn new(store: Box<dyn PreferenceStore>) -> Self {
        Self {
            inner: Rc::new(BridgeInner {
                store: RefCell::new(store),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    /// Current snapshot. Never fails.
    pub fn read(&self) -> HapticsPreferences {
        let defaults = HapticsPreferences::default();
        let guard = self.inner.store.borrow();
        let store: &dyn PreferenceStore = &**guard;

        let enabled = read_field(store, ENABLED_KEY, parse_flag, defaults.enabled);
        let intensity = read_field(
            store,
            INTENSITY_KEY,
            |raw| raw.parse::<HapticsIntensity>().ok(),
            defaults.intensity,
        );
        let breath_follow_enabled = read_field(
            store,
            BREATH_FOLLOW_KEY,
            parse_flag,
            defaults.breath_follow_enabled,
        );
        let voice_sync_enabled = read_field(
            store,
            VOICE_SYNC_KEY,
            parse_flag,
            defaults.voice_sync_enabled,
        );

        HapticsPreferences {
            enabled,
            intensity,
            breath_follow_enabled,
            voice_sync_enabled,
        }
    }

    /// Persist a whole snapshot, then notify listeners.
    pub fn write(&self, prefs: &HapticsPreferences) -> Result<(), PreferenceError> {
        {
            let mut store = self.inner.store.borrow_mut();
            store.set(ENABLED_KEY, flag(prefs.enabled))?;
            store.set(INTENSITY_KEY, prefs.intensity.as_str())?;
            store.set(BREATH_FOLLOW_KEY, flag(prefs.breath_follow_enabled))?;
            store.set(VOICE_SYNC_KEY, flag(prefs.voice_sync_enabled))?;
        }
        self.notify();
        Ok(())
    }

    /// Write one raw value without notifying.
    pub fn set_raw(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        self.inner.store.borrow_mut().set(key, value)
    }

    /// Register a change listener. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn on_change(&self, callback: impl FnMut() + 'static) -> Subscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        let callback: Box<dyn FnMut()> = Box::new(callback);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(callback))));
        Subscription {
            id,
            bridge: Rc::downgrade(&self.inner),
        }
    }

    /// Tell every listener the settings changed.
    pub fn notify(&self) {
        // Snapshot first so listeners may unsubscribe while being called.
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            match listener.try_borrow_mut() {
                Ok(mut callback) => (callback.as_mut())(),
                Err(_) => debug!("skipping re-entrant preference listener"),
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

impl std::fmt::Debug for PreferenceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceBridge")
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`PreferenceBridge::on_change`]. Dropping it
/// unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    bridge: Weak<BridgeInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bridge.upgrade() {
            inner
                .listeners
                .borrow_mut()
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn read_field<T>(
    store: &dyn PreferenceStore,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
    default: T,
) -> T {
    match store.get(key) {
        Ok(Some(raw)) => parse(&raw).unwrap_or_else(|| {
            warn!(key, value = %raw, "malformed preference; using default");
            default
        }),
        Ok(None) => default,
        Err(err) => {
            warn!(key, error = %err, "preference unreadable; using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_reads_defaults() {
        let bridge = PreferenceBridge::in_memory();
        assert_eq!(bridge.read(), HapticsPreferences::default());
    }

    #[test]
    fn malformed_fields_fall_back_individually() {
        let store = MemoryStore::new()
            .with(ENABLED_KEY, "maybe")
            .with(INTENSITY_KEY, "HIGH")
            .with(BREATH_FOLLOW_KEY, "1")
            .with(VOICE_SYNC_KEY, "sometimes");
        let prefs = PreferenceBridge::new(Box::new(store)).read();
        assert!(prefs.enabled);
        assert_eq!(prefs.intensity, HapticsIntensity::High);
        assert!(prefs.breath_follow_enabled);
        assert!(!prefs.voice_sync_enabled);
    }

    #[test]
    fn bad_intensity_keeps_other_fields() {
        let store = MemoryStore::new()
            .with(ENABLED_KEY, "0")
            .with(INTENSITY_KEY, "extreme");
        let prefs = PreferenceBridge::new(Box::new(store)).read();
        assert!(!prefs.enabled);
        assert_eq!(prefs.intensity, HapticsIntensity::Med);
    }

    #[test]
    fn write_persists_and_notifies() {
        let bridge = PreferenceBridge::in_memory();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _sub = bridge.on_change(move || counter.set(counter.get() + 1));

        let prefs = HapticsPreferences {
            enabled: false,
            intensity: HapticsIntensity::Low,
            breath_follow_enabled: true,
            voice_sync_enabled: true,
        };
        bridge.write(&prefs).unwrap();
        assert_eq!(bridge.read(), prefs);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bridge = PreferenceBridge::in_memory();
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let sub = bridge.on_change(move || counter.set(counter.get() + 1));
        assert_eq!(bridge.listener_count(), 1);

        bridge.notify();
        sub.unsubscribe();
        bridge.notify();
        assert_eq!(hits.get(), 1);
        assert_eq!(bridge.listener_count(), 0);
    }

    #[test]
    fn unreadable_file_store_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");
        std::fs::write(&path, "[[[").unwrap();
        let bridge = PreferenceBridge::new(Box::new(TomlFileStore::new(&path)));
        assert_eq!(bridge.read(), HapticsPreferences::default());
    }

    #[test]
    fn flags_parse_leniently() {
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag(""), None);
    }
}
