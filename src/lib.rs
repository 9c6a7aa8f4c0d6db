#![forbid(unsafe_code)]

//! Connectivity awareness: a reachability prober, a change-gated signal and
//! a step sequencer that bootstraps a persisted session and keeps network
//! history in sync with it.

pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod models;
pub mod network;
pub mod orchestrator;
pub mod persistence;
pub mod probe;
pub mod sequencer;
pub mod signal;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
