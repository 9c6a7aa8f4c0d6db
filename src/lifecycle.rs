//! Foreground/background wiring of the connectivity subsystem.
//!
//! [`ConnectivityLifecycle`] is the only caller of the prober and sequencer
//! control verbs. A host calls [`on_resume`](ConnectivityLifecycle::on_resume)
//! when its context comes to the foreground,
//! [`on_pause`](ConnectivityLifecycle::on_pause) when it is partially hidden
//! and [`on_stop`](ConnectivityLifecycle::on_stop) when it goes away.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, warn};

use crate::config::LifecycleConfig;
use crate::network::monitor::CapabilityMonitor;
use crate::network::CapabilitySnapshot;
use crate::orchestrator::BootstrapOrchestrator;
use crate::probe::ReachabilityProber;
use crate::signal::{ObserverId, SignalHook};
use crate::Result;

/// Lifecycle owner for one host context.
pub struct ConnectivityLifecycle {
    options: LifecycleConfig,
    orchestrator: Arc<BootstrapOrchestrator>,
    prober: Arc<ReachabilityProber>,
    monitor: Arc<CapabilityMonitor>,
    observer: Mutex<Option<ObserverId>>,
}

impl ConnectivityLifecycle {
    /// Wire the prober as the lifecycle hook of its signal so the first
    /// observer starts it and the last one stops it.
    #[must_use]
    pub fn new(
        options: LifecycleConfig,
        orchestrator: Arc<BootstrapOrchestrator>,
        prober: Arc<ReachabilityProber>,
        monitor: Arc<CapabilityMonitor>,
    ) -> Self {
        let weak = Arc::downgrade(&prober);
        let hook: Weak<dyn SignalHook> = weak;
        prober.signal().set_hook(hook);
        Self {
            options,
            orchestrator,
            prober,
            monitor,
            observer: Mutex::new(None),
        }
    }

    fn observer(&self) -> MutexGuard<'_, Option<ObserverId>> {
        self.observer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The orchestrator driven by this lifecycle.
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<BootstrapOrchestrator> {
        &self.orchestrator
    }

    /// The prober driven by this lifecycle.
    #[must_use]
    pub fn prober(&self) -> &Arc<ReachabilityProber> {
        &self.prober
    }

    /// Whether the reachability observer is registered.
    #[must_use]
    pub fn is_observing(&self) -> bool {
        self.observer().is_some()
    }

    /// Register the change callbacks and continue the bootstrap.
    ///
    /// Returns whether a bootstrap step is pending.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if a step cancelled the sequence.
    pub fn on_resume(&self) -> Result<bool> {
        if self.options.capability_callback_enabled() && !self.monitor.has_listener() {
            let orchestrator = Arc::clone(&self.orchestrator);
            self.monitor
                .register_listener(Arc::new(
                    move |old: Option<CapabilitySnapshot>, new: Option<CapabilitySnapshot>| {
                        let orchestrator = Arc::clone(&orchestrator);
                        spawn_reaction(async move {
                            orchestrator.react_to_capabilities_changed(old, new).await;
                        });
                    },
                ));
            debug!("capability listener registered");
        }

        if self.options.reachability_callback_enabled() {
            let mut observer = self.observer();
            if observer.is_none() {
                let orchestrator = Arc::clone(&self.orchestrator);
                *observer = Some(self.prober.signal().observe(move |reachable: &bool| {
                    let orchestrator = Arc::clone(&orchestrator);
                    let reachable = *reachable;
                    spawn_reaction(async move {
                        orchestrator.react_to_reachability_changed(reachable).await;
                    });
                }));
                debug!("reachability observer registered");
            }
        }

        let sequencer = self.orchestrator.sequencer();
        if let Some(err) = sequencer.last_error().filter(|_| sequencer.has_error()) {
            warn!(%err, "previous bootstrap run failed");
        }
        sequencer.unload();
        self.orchestrator.attach_session_report();

        self.prober.resume();
        let pending = if sequencer.is_completed() {
            sequencer.start()
        } else {
            sequencer.resume()
        };
        info!("connectivity lifecycle resumed");
        pending
    }

    /// Stop testing reachability while partially hidden.
    pub fn on_pause(&self) {
        self.prober.pause();
        debug!("connectivity lifecycle paused");
    }

    /// Tear everything down for this context.
    pub fn on_stop(&self) {
        self.monitor.unregister_listener();
        let observer = self.observer().take();
        if let Some(id) = observer {
            self.prober.signal().remove_observer(id);
        }
        self.prober.stop();
        self.monitor.invalidate();
        self.orchestrator.sequencer().cancel();
        info!("connectivity lifecycle stopped");
    }
}

fn spawn_reaction(reaction: impl Future<Output = ()> + Send + 'static) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(reaction);
        }
        Err(_) => warn!("no async runtime; connectivity reaction dropped"),
    }
}
