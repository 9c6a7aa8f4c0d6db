//! Local connectivity: capability snapshots and the memoized platform lookup.
//!
//! Platform bindings are out of scope; a host feeds capability snapshots in
//! through a [`CapabilitySource`] (pull) and [`CapabilityMonitor::publish`]
//! (push notifications).

pub mod monitor;

pub use monitor::{CapabilityListener, CapabilityMonitor};

use serde::{Deserialize, Serialize};

use crate::config::ConnectivityConfig;

/// Capability code of a network able to reach the internet.
pub const CAPABILITY_INTERNET: i32 = 12;

/// Physical or virtual transport carrying a network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Mobile data.
    Cellular,
    /// Wi-Fi.
    Wifi,
    /// Wired ethernet.
    Ethernet,
    /// Bluetooth tethering.
    Bluetooth,
    /// Virtual private network.
    Vpn,
}

/// Point-in-time description of the active network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub struct CapabilitySnapshot {
    /// Capability codes advertised by the network.
    pub capabilities: Vec<i32>,
    /// Transports carrying the network.
    pub transports: Vec<Transport>,
    /// Estimated downstream bandwidth.
    pub downstream_kbps: i32,
    /// Estimated upstream bandwidth.
    pub upstream_kbps: i32,
    /// Signal strength as reported by the platform.
    pub signal_strength: i32,
}

impl CapabilitySnapshot {
    /// Whether the network advertises `capability`.
    #[must_use]
    pub fn has_capability(&self, capability: i32) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether the network runs over `transport`.
    #[must_use]
    pub fn has_transport(&self, transport: Transport) -> bool {
        self.transports.contains(&transport)
    }

    /// Whether the network can satisfy an internet request.
    #[must_use]
    pub fn satisfies_internet(&self) -> bool {
        self.has_capability(CAPABILITY_INTERNET)
    }
}

/// Local view of connectivity consumed by the prober and orchestrator.
pub trait LocalConnectivity: Send + Sync {
    /// Whether the active network can reach the internet locally.
    fn is_locally_connected(&self) -> bool;
    /// Whether the active network runs over Wi-Fi.
    fn has_wifi(&self) -> bool;
    /// Whether the active network runs over mobile data.
    fn has_mobile(&self) -> bool;
    /// Capabilities of the active network, if any.
    fn capabilities(&self) -> Option<CapabilitySnapshot>;
}

/// Expensive platform lookup of the active network's capabilities.
pub trait CapabilitySource: Send + Sync {
    /// Query the platform. `None` when no network is active.
    fn active_capabilities(&self) -> Option<CapabilitySnapshot>;
}

/// Source returning a fixed snapshot, for hosts without a platform notifier.
#[derive(Debug, Clone)]
pub struct StaticCapabilitySource {
    snapshot: Option<CapabilitySnapshot>,
}

impl StaticCapabilitySource {
    /// Wrap a fixed snapshot.
    #[must_use]
    pub fn new(snapshot: Option<CapabilitySnapshot>) -> Self {
        Self { snapshot }
    }

    /// Build from the `[connectivity]` configuration section. No transports
    /// configured means no active network.
    #[must_use]
    pub fn from_config(config: &ConnectivityConfig) -> Self {
        if config.transports.is_empty() {
            return Self::new(None);
        }
        Self::new(Some(CapabilitySnapshot {
            capabilities: config.capabilities.clone(),
            transports: config.transports.clone(),
            downstream_kbps: config.downstream_kbps,
            upstream_kbps: config.upstream_kbps,
            signal_strength: config.signal_strength,
        }))
    }
}

impl CapabilitySource for StaticCapabilitySource {
    fn active_capabilities(&self) -> Option<CapabilitySnapshot> {
        self.snapshot.clone()
    }
}
