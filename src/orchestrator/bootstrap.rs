//! Session bootstrap pipeline.
//!
//! Three steps run in order on the orchestrator's sequencer:
//!
//! 1. create or reuse the process session, then trim old history,
//! 2. write a network state row if none exists for the session,
//! 3. write a capability row if none exists for the session.
//!
//! Any failure in the first step asks the sequencer for a full restart, so
//! the next `start()` or `resume()` begins again from the session step.
//! Once the session step delivers, change reactions switch from
//! [`ReactionMode::Queued`] to [`ReactionMode::Direct`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::models::network_state::NetworkStateSnapshot;
use crate::models::session::Session;
use crate::network::{CapabilitySnapshot, LocalConnectivity};
use crate::persistence::retention::{self, RetentionPolicy};
use crate::persistence::{CapabilityStore, NetworkStateStore, SessionStore};
use crate::sequencer::{Outcome, Step, StepSequencer};
use crate::Result;

use super::reactions::ReactionMode;

/// Value produced by bootstrap and reaction steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapValue {
    /// The session the process runs under.
    Session(Session),
    /// A synchronization step ran to completion.
    Synced,
}

/// Storage collaborators used by the orchestrator.
#[derive(Clone)]
pub struct Stores {
    /// Session log.
    pub sessions: Arc<dyn SessionStore>,
    /// Network state log.
    pub states: Arc<dyn NetworkStateStore>,
    /// Network capability log.
    pub capabilities: Arc<dyn CapabilityStore>,
}

/// State shared between the orchestrator and the closures of its steps.
pub(super) struct Context {
    pub(super) stores: Stores,
    pub(super) connectivity: Arc<dyn LocalConnectivity>,
    pub(super) retention: RetentionPolicy,
    pub(super) started_at: DateTime<Utc>,
    pub(super) session: Mutex<Option<Session>>,
    pub(super) mode: Mutex<ReactionMode>,
    pub(super) reachable: AtomicBool,
    pub(super) pending_capabilities: Mutex<Option<CapabilitySnapshot>>,
}

impl Context {
    pub(super) fn session(&self) -> Option<Session> {
        lock(&self.session).clone()
    }

    pub(super) fn mode(&self) -> ReactionMode {
        *lock(&self.mode)
    }

    /// Current network flags tagged with `session_id`.
    pub(super) fn network_snapshot(&self, session_id: i64) -> NetworkStateSnapshot {
        let is_connected = self.connectivity.is_locally_connected();
        NetworkStateSnapshot {
            session_id,
            is_connected,
            has_internet: is_connected && self.reachable.load(Ordering::SeqCst),
            has_wifi: self.connectivity.has_wifi(),
            has_mobile: self.connectivity.has_mobile(),
        }
    }

    /// Append the current network state for `session_id`.
    pub(super) async fn write_network_state(&self, session_id: i64) -> Result<i64> {
        let snapshot = self.network_snapshot(session_id);
        let id = self.stores.states.write_state(snapshot).await?;
        debug!(
            session_id,
            is_connected = snapshot.is_connected,
            has_internet = snapshot.has_internet,
            "network state written"
        );
        Ok(id)
    }

    /// Append `capabilities` for `session_id`.
    pub(super) async fn write_capabilities(
        &self,
        session_id: i64,
        capabilities: CapabilitySnapshot,
    ) -> Result<i64> {
        let id = self
            .stores
            .capabilities
            .write_capabilities(session_id, capabilities)
            .await?;
        debug!(session_id, "network capabilities written");
        Ok(id)
    }

    /// Write a network state unless the latest one already belongs to
    /// `session_id`.
    async fn sync_network_state(&self, session_id: i64) -> Result<()> {
        let latest = self.stores.states.load_latest_state().await?;
        if latest.map(|state| state.session_id) != Some(session_id) {
            self.write_network_state(session_id).await?;
        }
        Ok(())
    }

    /// Write the active capabilities unless the latest row already belongs
    /// to `session_id`.
    async fn sync_capabilities(&self, session_id: i64) -> Result<()> {
        let latest = self.stores.capabilities.load_latest_capabilities().await?;
        if latest.map(|row| row.session_id) == Some(session_id) {
            return Ok(());
        }
        match self.connectivity.capabilities() {
            Some(capabilities) => {
                self.write_capabilities(session_id, capabilities).await?;
            }
            None => debug!("no active network; capability sync skipped"),
        }
        Ok(())
    }

    /// Insert the process session and cache it straight away, so neither a
    /// failed reload nor an abandoned run can insert a second one.
    async fn create_session(&self) -> Result<Session> {
        let id = self.stores.sessions.create_session(self.started_at).await?;
        let created = Session::new(id, self.started_at);
        *lock(&self.session) = Some(created.clone());
        info!(session_id = id, "session created");

        match self.stores.sessions.load_latest_session().await {
            Ok(Some(latest)) if latest.id == id => {
                *lock(&self.session) = Some(latest.clone());
                Ok(latest)
            }
            Ok(_) => Ok(created),
            Err(err) => {
                warn!(%err, session_id = id, "session reload failed; keeping created record");
                Ok(created)
            }
        }
    }

    async fn trim_history(&self) {
        retention::trim(
            self.stores.sessions.as_ref(),
            self.stores.states.as_ref(),
            self.stores.capabilities.as_ref(),
            self.retention,
        )
        .await;
    }
}

pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the bootstrap sequence and the process session.
pub struct BootstrapOrchestrator {
    pub(super) context: Arc<Context>,
    pub(super) sequencer: StepSequencer<BootstrapValue>,
    pub(super) state_write: Step<BootstrapValue>,
    pub(super) capability_write: Step<BootstrapValue>,
    session_report: Step<BootstrapValue>,
}

impl BootstrapOrchestrator {
    /// Build the orchestrator and attach the three bootstrap steps.
    /// Nothing runs until the sequencer is started.
    #[must_use]
    pub fn new(
        stores: Stores,
        connectivity: Arc<dyn LocalConnectivity>,
        retention: RetentionPolicy,
    ) -> Self {
        let context = Arc::new(Context {
            stores,
            connectivity,
            retention,
            started_at: Utc::now(),
            session: Mutex::new(None),
            mode: Mutex::new(ReactionMode::Queued),
            reachable: AtomicBool::new(false),
            pending_capabilities: Mutex::new(None),
        });

        let sequencer = StepSequencer::new("bootstrap");
        sequencer.attach(session_step(&context));
        sequencer.attach(state_sync_step(&context));
        sequencer.attach(capability_sync_step(&context));

        Self {
            state_write: super::reactions::state_write_step(&context),
            capability_write: super::reactions::capability_write_step(&context),
            session_report: session_report_step(&context),
            context,
            sequencer,
        }
    }

    /// The bootstrap sequence.
    #[must_use]
    pub fn sequencer(&self) -> &StepSequencer<BootstrapValue> {
        &self.sequencer
    }

    /// Session created by the bootstrap, once it exists.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.context.session()
    }

    /// When this process started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.context.started_at
    }

    /// How change reactions are currently applied.
    #[must_use]
    pub fn mode(&self) -> ReactionMode {
        self.context.mode()
    }

    /// Last reachability value seen by the reachability reaction.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.context.reachable.load(Ordering::SeqCst)
    }

    /// Queue a step logging the current session id, unless one is already
    /// pending.
    pub fn attach_session_report(&self) -> bool {
        self.sequencer.attach_once_pending(self.session_report.clone())
    }
}

fn session_step(context: &Arc<Context>) -> Step<BootstrapValue> {
    let work_context = Arc::clone(context);
    let result_context = Arc::clone(context);
    Step::task(
        move || {
            let context = Arc::clone(&work_context);
            async move {
                if let Some(session) = context.session() {
                    return Outcome::Success(Some(BootstrapValue::Session(session)));
                }
                let session = match context.create_session().await {
                    Ok(session) => session,
                    Err(err) => {
                        warn!(%err, "session creation failed; bootstrap will restart");
                        return Outcome::AutoReset;
                    }
                };
                context.trim_history().await;
                Outcome::Success(Some(BootstrapValue::Session(session)))
            }
        },
        move |value| match value {
            Some(BootstrapValue::Session(session)) => {
                *lock(&result_context.mode) = ReactionMode::Direct;
                debug!(session_id = session.id, "reactions switched to direct mode");
                Outcome::Success(Some(BootstrapValue::Session(session)))
            }
            _ => {
                warn!("session step produced no session; bootstrap will restart");
                Outcome::AutoReset
            }
        },
    )
}

fn state_sync_step(context: &Arc<Context>) -> Step<BootstrapValue> {
    let context = Arc::clone(context);
    Step::task(
        move || {
            let context = Arc::clone(&context);
            async move {
                let Some(session) = context.session() else {
                    return Outcome::AutoReset;
                };
                let result = context.sync_network_state(session.id).await;
                Outcome::from(result.map(|()| Some(BootstrapValue::Synced)))
            }
        },
        Outcome::Success,
    )
}

fn capability_sync_step(context: &Arc<Context>) -> Step<BootstrapValue> {
    let context = Arc::clone(context);
    Step::task(
        move || {
            let context = Arc::clone(&context);
            async move {
                let Some(session) = context.session() else {
                    return Outcome::AutoReset;
                };
                let result = context.sync_capabilities(session.id).await;
                Outcome::from(result.map(|()| Some(BootstrapValue::Synced)))
            }
        },
        Outcome::Success,
    )
}

fn session_report_step(context: &Arc<Context>) -> Step<BootstrapValue> {
    let context = Arc::clone(context);
    Step::capture(move |_| {
        match context.session() {
            Some(session) => info!(session_id = session.id, "current session"),
            None => info!("no session yet"),
        }
        Outcome::Success(None)
    })
}
