//! Bootstrap orchestration.
//!
//! Composes the session, network-state and capability steps on a
//! [`StepSequencer`](crate::sequencer::StepSequencer) and routes
//! connectivity change reactions either onto the sequence or straight to
//! the stores.

pub mod bootstrap;
pub mod reactions;

pub use bootstrap::{BootstrapOrchestrator, BootstrapValue, Stores};
pub use reactions::ReactionMode;
