//! Domain model module declarations.

pub mod capabilities;
pub mod network_state;
pub mod session;
