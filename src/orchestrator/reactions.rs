//! Connectivity change reactions.
//!
//! Before the session exists, a change cannot be persisted: it is queued as
//! a step on the bootstrap sequence and runs after the sync steps. Each
//! reaction has one fixed step instance attached with
//! `attach_once_pending`, so a burst of changes collapses into a single
//! pending write that reads the latest values when it finally runs. Once
//! the session step has delivered, reactions write straight to the stores.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::network::CapabilitySnapshot;
use crate::sequencer::{Outcome, Step};

use super::bootstrap::{lock, BootstrapOrchestrator, BootstrapValue, Context};

/// How change reactions are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionMode {
    /// Queue a step on the bootstrap sequence.
    Queued,
    /// Write immediately.
    Direct,
}

impl BootstrapOrchestrator {
    /// Record a reachability change and persist a fresh network state.
    pub async fn react_to_reachability_changed(&self, reachable: bool) {
        self.context.reachable.store(reachable, Ordering::SeqCst);
        debug!(reachable, mode = ?self.context.mode(), "reachability changed");

        match self.context.mode() {
            ReactionMode::Queued => {
                self.sequencer.attach_once_pending(self.state_write.clone());
            }
            ReactionMode::Direct => {
                let Some(session) = self.context.session() else {
                    warn!("no session; network state not written");
                    return;
                };
                if let Err(err) = self.context.write_network_state(session.id).await {
                    warn!(%err, "failed to write network state");
                }
            }
        }
    }

    /// Persist the new capabilities of the active network.
    pub async fn react_to_capabilities_changed(
        &self,
        old: Option<CapabilitySnapshot>,
        new: Option<CapabilitySnapshot>,
    ) {
        if old.is_some() {
            info!("network capabilities have changed");
        }
        let Some(new) = new else {
            return;
        };

        match self.context.mode() {
            ReactionMode::Queued => {
                *lock(&self.context.pending_capabilities) = Some(new);
                self.sequencer
                    .attach_once_pending(self.capability_write.clone());
            }
            ReactionMode::Direct => {
                let Some(session) = self.context.session() else {
                    warn!("no session; network capabilities not written");
                    return;
                };
                if let Err(err) = self.context.write_capabilities(session.id, new).await {
                    warn!(%err, "failed to write network capabilities");
                }
            }
        }
    }
}

/// Queued reachability reaction: writes the network state current when
/// the step runs.
pub(super) fn state_write_step(context: &Arc<Context>) -> Step<BootstrapValue> {
    let context = Arc::clone(context);
    Step::task(
        move || {
            let context = Arc::clone(&context);
            async move {
                let Some(session) = context.session() else {
                    return Outcome::Success(None);
                };
                Outcome::from(
                    context
                        .write_network_state(session.id)
                        .await
                        .map(|_| Some(BootstrapValue::Synced)),
                )
            }
        },
        Outcome::Success,
    )
}

/// Queued capability reaction: writes the most recent pending snapshot.
pub(super) fn capability_write_step(context: &Arc<Context>) -> Step<BootstrapValue> {
    let context = Arc::clone(context);
    Step::task(
        move || {
            let context = Arc::clone(&context);
            async move {
                let Some(session) = context.session() else {
                    return Outcome::Success(None);
                };
                let pending = lock(&context.pending_capabilities).take();
                let Some(capabilities) = pending else {
                    return Outcome::Success(None);
                };
                Outcome::from(
                    context
                        .write_capabilities(session.id, capabilities)
                        .await
                        .map(|_| Some(BootstrapValue::Synced)),
                )
            }
        },
        Outcome::Success,
    )
}
