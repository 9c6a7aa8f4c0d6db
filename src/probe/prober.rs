//! Adaptive-interval reachability poll loop.
//!
//! A [`ReachabilityProber`] owns one background task. On every tick (the
//! first one immediately, then one per interval) it tests reachability if
//! testing is enabled and the interval since the last success has elapsed,
//! then posts the result through a [`ChangeGatedSignal`] so observers only
//! hear about changes. The loop can be [`paused`](ReachabilityProber::pause)
//! without stopping it and [`stopped`](ReachabilityProber::stop) mid-wait.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::network::LocalConnectivity;
use crate::signal::{ChangeGatedSignal, SignalHook};

use super::{Clock, ProbeConfig, ReachabilityTest};

/// Everything a single tick needs; cloned into the background task.
#[derive(Clone)]
struct Probe {
    config: Arc<ProbeConfig>,
    tester: Arc<dyn ReachabilityTest>,
    connectivity: Arc<dyn LocalConnectivity>,
    signal: Arc<ChangeGatedSignal<bool>>,
    clock: Arc<dyn Clock>,
}

impl Probe {
    async fn tick(&self) -> Option<bool> {
        if !self.config.repeat_enabled() {
            return None;
        }
        let now = self.clock.now_ms();
        if !self.config.is_due(now) {
            return None;
        }

        let reachable = self.connectivity.is_locally_connected() && self.run_test().await;
        if reachable && self.config.record_success(now) {
            debug!(last_success_ms = now, "reachability test succeeded");
        }
        self.signal.post_value(reachable);
        Some(reachable)
    }

    /// Run the test in its own task so neither an error nor a panic can
    /// escape the loop.
    async fn run_test(&self) -> bool {
        let tester = Arc::clone(&self.tester);
        match tokio::spawn(async move { tester.test().await }).await {
            Ok(Ok(reachable)) => reachable,
            Ok(Err(err)) => {
                warn!(%err, "reachability test failed");
                false
            }
            Err(err) => {
                warn!(%err, "reachability test aborted");
                false
            }
        }
    }
}

struct ProbeTask {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Cancellable polling loop feeding the reachability signal.
pub struct ReachabilityProber {
    probe: Probe,
    task: Mutex<Option<ProbeTask>>,
}

impl ReachabilityProber {
    /// Construct a prober (does not start the loop yet).
    #[must_use]
    pub fn new(
        config: Arc<ProbeConfig>,
        tester: Arc<dyn ReachabilityTest>,
        connectivity: Arc<dyn LocalConnectivity>,
        signal: Arc<ChangeGatedSignal<bool>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            probe: Probe {
                config,
                tester,
                connectivity,
                signal,
                clock,
            },
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<ProbeTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shared interval bookkeeping.
    #[must_use]
    pub fn config(&self) -> &Arc<ProbeConfig> {
        &self.probe.config
    }

    /// Signal receiving every test result.
    #[must_use]
    pub fn signal(&self) -> &Arc<ChangeGatedSignal<bool>> {
        &self.probe.signal
    }

    /// Whether the background loop is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task()
            .as_ref()
            .is_some_and(|task| !task.join.is_finished())
    }

    /// Launch the loop at `interval_ms` (clamped to the floor) with testing
    /// enabled, unless it is already running. Returns whether a loop was
    /// launched.
    pub fn restart(&self, interval_ms: u64) -> bool {
        let mut task = self.task();
        if task.as_ref().is_some_and(|running| !running.join.is_finished()) {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime; reachability prober not started");
            return false;
        };

        let interval_ms = self.probe.config.set_interval_ms(interval_ms);
        self.probe.config.set_repeat_enabled(true);

        let cancel = CancellationToken::new();
        let join = runtime.spawn(
            run(self.probe.clone(), cancel.clone()).instrument(info_span!("reachability_prober")),
        );
        *task = Some(ProbeTask { cancel, join });
        info!(interval_ms, "reachability prober started");
        true
    }

    /// Stop testing without stopping the loop.
    pub fn pause(&self) {
        self.probe.config.set_repeat_enabled(false);
    }

    /// Resume testing after a pause.
    pub fn resume(&self) {
        self.probe.config.set_repeat_enabled(true);
    }

    /// Cancel the loop. Idempotent; returns whether a loop was stopped.
    pub fn stop(&self) -> bool {
        match self.task().take() {
            Some(task) => {
                task.cancel.cancel();
                info!("reachability prober stopped");
                true
            }
            None => false,
        }
    }

    /// Cancel the loop and wait for the task to exit.
    pub async fn shutdown(&self) {
        let task = self.task().take();
        if let Some(task) = task {
            task.cancel.cancel();
            let _ = task.join.await;
            info!("reachability prober shut down");
        }
    }

    /// Update the interval, clamped to the floor; applies from the next tick.
    pub fn set_interval(&self, interval_ms: u64) -> u64 {
        self.probe.config.set_interval_ms(interval_ms)
    }

    /// Run a single tick of the loop. Returns the posted result, or `None`
    /// when testing is paused or not yet due.
    pub async fn probe_once(&self) -> Option<bool> {
        self.probe.tick().await
    }
}

impl SignalHook for ReachabilityProber {
    fn on_active(&self) {
        self.restart(self.probe.config.interval_ms());
    }

    fn on_inactive(&self) {
        self.stop();
    }
}

impl Drop for ReachabilityProber {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = task.take() {
            task.cancel.cancel();
        }
    }
}

/// Core poll loop.
async fn run(probe: Probe, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("reachability prober cancelled");
                return;
            }
            result = probe.tick() => {
                if let Some(reachable) = result {
                    debug!(reachable, "reachability tick");
                }
            }
        }

        let wait = Duration::from_millis(probe.config.interval_ms());
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("reachability prober cancelled");
                return;
            }
            () = tokio::time::sleep(wait) => {}
        }
    }
}
