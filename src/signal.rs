//! Change-gated value holder.
//!
//! A [`ChangeGatedSignal`] stores one value and notifies its observers only
//! when a newly posted value differs from the stored one. The first value
//! always notifies since "never set" differs from every value. The first
//! observer and the removal of the last observer are reported to an
//! optional [`SignalHook`], which is how the reachability prober gets
//! started and torn down on demand.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

/// Callback invoked with every changed value.
pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifier returned by [`ChangeGatedSignal::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Lazily creates and tears down the resource feeding a signal.
pub trait SignalHook: Send + Sync {
    /// The signal gained its first observer.
    fn on_active(&self);
    /// The signal lost its last observer.
    fn on_inactive(&self);
}

struct SignalState<T> {
    value: Option<T>,
    observers: Vec<(ObserverId, Observer<T>)>,
    next_id: u64,
}

/// Single-value holder that suppresses notifications for unchanged values.
pub struct ChangeGatedSignal<T> {
    state: Mutex<SignalState<T>>,
    hook: Mutex<Option<Weak<dyn SignalHook>>>,
}

impl<T> Default for ChangeGatedSignal<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SignalState {
                value: None,
                observers: Vec::new(),
                next_id: 0,
            }),
            hook: Mutex::new(None),
        }
    }
}

impl<T: Clone + PartialEq> ChangeGatedSignal<T> {
    /// Create a signal that has never been set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SignalState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hook(&self) -> Option<Arc<dyn SignalHook>> {
        self.hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Wire the resource hook. Replaces any previous hook.
    pub fn set_hook(&self, hook: Weak<dyn SignalHook>) {
        *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    /// Store `value` and notify observers in subscription order, unless it
    /// equals the stored value. Returns whether observers were notified.
    pub fn post_value(&self, value: T) -> bool {
        let observers: Vec<Observer<T>> = {
            let mut state = self.lock();
            if state.value.as_ref() == Some(&value) {
                return false;
            }
            state.value = Some(value.clone());
            state
                .observers
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect()
        };
        for observer in observers {
            observer(&value);
        }
        true
    }

    /// Currently stored value, `None` if never set.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.lock().value.clone()
    }

    /// Subscribe to changes. The first observer activates the hook.
    pub fn observe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> ObserverId {
        let (id, first) = {
            let mut state = self.lock();
            let id = ObserverId(state.next_id);
            state.next_id += 1;
            state.observers.push((id, Arc::new(observer)));
            (id, state.observers.len() == 1)
        };
        if first {
            if let Some(hook) = self.hook() {
                hook.on_active();
            }
        }
        id
    }

    /// Unsubscribe. Removing the last observer deactivates the hook.
    /// Returns whether the observer was registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let (removed, now_empty) = {
            let mut state = self.lock();
            let before = state.observers.len();
            state.observers.retain(|(existing, _)| *existing != id);
            (state.observers.len() != before, state.observers.is_empty())
        };
        if removed && now_empty {
            if let Some(hook) = self.hook() {
                hook.on_inactive();
            }
        }
        removed
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }
}

/// Process-wide reachability signal, created on first use.
pub fn shared_reachability() -> Arc<ChangeGatedSignal<bool>> {
    static SHARED: OnceLock<Arc<ChangeGatedSignal<bool>>> = OnceLock::new();
    Arc::clone(SHARED.get_or_init(|| Arc::new(ChangeGatedSignal::new())))
}
