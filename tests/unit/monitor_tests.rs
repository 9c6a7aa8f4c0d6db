//! Unit tests for `CapabilityMonitor` memoization and notifications.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use netaware::config::ConnectivityConfig;
use netaware::network::monitor::CapabilityMonitor;
use netaware::network::{
    CapabilitySnapshot, CapabilitySource, LocalConnectivity, StaticCapabilitySource, Transport,
    CAPABILITY_INTERNET,
};

struct CountingSource {
    snapshot: Option<CapabilitySnapshot>,
    lookups: AtomicUsize,
}

impl CapabilitySource for CountingSource {
    fn active_capabilities(&self) -> Option<CapabilitySnapshot> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.snapshot.clone()
    }
}

fn wifi() -> CapabilitySnapshot {
    CapabilitySnapshot {
        capabilities: vec![CAPABILITY_INTERNET],
        transports: vec![Transport::Wifi],
        downstream_kbps: 30_000,
        upstream_kbps: 10_000,
        signal_strength: -50,
    }
}

fn cellular_without_internet() -> CapabilitySnapshot {
    CapabilitySnapshot {
        capabilities: vec![],
        transports: vec![Transport::Cellular],
        ..CapabilitySnapshot::default()
    }
}

fn monitor_over(snapshot: Option<CapabilitySnapshot>) -> (CapabilityMonitor, Arc<CountingSource>) {
    let source = Arc::new(CountingSource {
        snapshot,
        lookups: AtomicUsize::new(0),
    });
    (CapabilityMonitor::new(Arc::clone(&source) as _), source)
}

#[test]
fn lookup_is_memoized_until_invalidated() {
    let (monitor, source) = monitor_over(Some(wifi()));

    assert_eq!(monitor.current(), Some(wifi()));
    assert_eq!(monitor.current(), Some(wifi()));
    assert_eq!(source.lookups.load(Ordering::SeqCst), 1);

    monitor.invalidate();
    monitor.current();
    assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
}

#[test]
fn connectivity_flags_follow_snapshot() {
    let (monitor, _) = monitor_over(Some(wifi()));
    assert!(monitor.is_locally_connected());
    assert!(monitor.has_wifi());
    assert!(!monitor.has_mobile());

    let (monitor, _) = monitor_over(Some(cellular_without_internet()));
    assert!(!monitor.is_locally_connected());
    assert!(monitor.has_mobile());
}

#[test]
fn no_network_means_all_flags_false() {
    let (monitor, _) = monitor_over(None);
    assert!(!monitor.is_locally_connected());
    assert!(!monitor.has_wifi());
    assert!(!monitor.has_mobile());
    assert!(monitor.capabilities().is_none());
}

#[test]
fn publish_forwards_old_and_new_then_caches() {
    let (monitor, source) = monitor_over(Some(wifi()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    monitor.register_listener(Arc::new(move |old: Option<CapabilitySnapshot>, new: Option<CapabilitySnapshot>| {
        sink.lock().unwrap().push((old, new));
    }));

    monitor.publish(cellular_without_internet());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Some(wifi()));
    assert_eq!(seen[0].1, Some(cellular_without_internet()));
    assert_eq!(monitor.current(), Some(cellular_without_internet()));
    assert_eq!(source.lookups.load(Ordering::SeqCst), 1);
}

#[test]
fn unregistered_listener_is_not_called() {
    let (monitor, _) = monitor_over(None);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    monitor.register_listener(Arc::new(move |_: Option<CapabilitySnapshot>, _: Option<CapabilitySnapshot>| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    assert!(monitor.has_listener());
    assert!(monitor.unregister_listener());
    assert!(!monitor.unregister_listener());
    monitor.publish(wifi());

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(monitor.is_locally_connected());
}

#[test]
fn static_source_reads_config() {
    let config = ConnectivityConfig {
        transports: vec![Transport::Ethernet],
        capabilities: vec![CAPABILITY_INTERNET],
        downstream_kbps: 100_000,
        upstream_kbps: 100_000,
        signal_strength: 0,
    };
    let snapshot = StaticCapabilitySource::from_config(&config)
        .active_capabilities()
        .expect("snapshot");
    assert!(snapshot.satisfies_internet());
    assert!(snapshot.has_transport(Transport::Ethernet));

    let empty = StaticCapabilitySource::from_config(&ConnectivityConfig::default());
    assert!(empty.active_capabilities().is_none());
}
