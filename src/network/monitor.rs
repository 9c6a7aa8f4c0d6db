//! Memoized capability lookup with push-notification fan-out.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{CapabilitySnapshot, CapabilitySource, LocalConnectivity, Transport};

/// Receives `(old, new)` capability snapshots on every platform change.
pub type CapabilityListener =
    Arc<dyn Fn(Option<CapabilitySnapshot>, Option<CapabilitySnapshot>) + Send + Sync>;

/// Caches the active network's capabilities until invalidated and forwards
/// change notifications to one registered listener.
pub struct CapabilityMonitor {
    source: Arc<dyn CapabilitySource>,
    cached: Mutex<Option<CapabilitySnapshot>>,
    listener: Mutex<Option<CapabilityListener>>,
}

impl CapabilityMonitor {
    /// Create a monitor over `source`. Nothing is queried until first use.
    #[must_use]
    pub fn new(source: Arc<dyn CapabilitySource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
            listener: Mutex::new(None),
        }
    }

    fn cached(&self) -> MutexGuard<'_, Option<CapabilitySnapshot>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Memoized snapshot; queries the source on a cache miss.
    #[must_use]
    pub fn current(&self) -> Option<CapabilitySnapshot> {
        let mut cached = self.cached();
        if cached.is_none() {
            *cached = self.source.active_capabilities();
        }
        cached.clone()
    }

    /// Forget the memoized snapshot.
    pub fn invalidate(&self) {
        *self.cached() = None;
        debug!("capability cache invalidated");
    }

    /// Platform push notification: the active network changed.
    pub fn publish(&self, new: CapabilitySnapshot) {
        let old = self.current();
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(old, Some(new.clone()));
        }
        *self.cached() = Some(new);
    }

    /// Register the change listener, replacing any previous one.
    pub fn register_listener(&self, listener: CapabilityListener) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    /// Drop the change listener. Returns whether one was registered.
    pub fn unregister_listener(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    /// Whether a change listener is registered.
    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl LocalConnectivity for CapabilityMonitor {
    fn is_locally_connected(&self) -> bool {
        self.current()
            .is_some_and(|snapshot| snapshot.satisfies_internet())
    }

    fn has_wifi(&self) -> bool {
        self.current()
            .is_some_and(|snapshot| snapshot.has_transport(Transport::Wifi))
    }

    fn has_mobile(&self) -> bool {
        self.current()
            .is_some_and(|snapshot| snapshot.has_transport(Transport::Cellular))
    }

    fn capabilities(&self) -> Option<CapabilitySnapshot> {
        self.current()
    }
}
