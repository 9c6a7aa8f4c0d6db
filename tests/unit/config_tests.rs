//! Unit tests for configuration parsing and validation.

use std::io::Write;
use std::path::PathBuf;

use netaware::config::GlobalConfig;
use netaware::network::Transport;
use netaware::persistence::retention::RetentionPolicy;
use netaware::AppError;

fn sample_toml() -> &'static str {
    r#"
db_path = "data/history.db"

[probe]
url = "https://example.com/generate_204"
interval_ms = 5000
min_interval_ms = 3000
request_timeout_ms = 2000

[retention]
sessions = 5
network_states = 50
network_capabilities = 40

[lifecycle]
capability_callback = false

[connectivity]
transports = ["wifi", "vpn"]
capabilities = [12, 16]
downstream_kbps = 20000
upstream_kbps = 5000
signal_strength = -60
"#
}

#[test]
fn parses_valid_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("valid config");

    assert_eq!(config.db_path, PathBuf::from("data/history.db"));
    assert_eq!(config.probe.url, "https://example.com/generate_204");
    assert_eq!(config.probe.interval_ms, 5000);
    assert_eq!(config.probe.request_timeout().as_millis(), 2000);
    assert_eq!(config.retention.sessions, 5);
    assert!(!config.lifecycle.capability_callback);
    assert!(config.lifecycle.reachability_callback);
    assert_eq!(
        config.connectivity.transports,
        vec![Transport::Wifi, Transport::Vpn]
    );
    assert_eq!(config.connectivity.capabilities, vec![12, 16]);
    assert_eq!(config.connectivity.signal_strength, -60);
}

#[test]
fn empty_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults");

    assert_eq!(config.db_path, PathBuf::from("netaware.db"));
    assert_eq!(config.probe.url, "https://httpbin.org/delay/1");
    assert_eq!(config.probe.interval_ms, 3000);
    assert_eq!(config.probe.min_interval_ms, 3000);
    assert_eq!(config.probe.request_timeout_ms, 10_000);
    assert_eq!(config.retention.policy(), RetentionPolicy::default());
    assert!(config.lifecycle.capability_callback_enabled());
    assert!(config.lifecycle.reachability_callback_enabled());
    assert!(config.connectivity.transports.is_empty());
}

#[test]
fn interval_below_floor_is_clamped() {
    let config = GlobalConfig::from_toml_str(
        r"
[probe]
interval_ms = 100
min_interval_ms = 3000
",
    )
    .expect("clamped config");
    assert_eq!(config.probe.interval_ms, 3000);
}

#[test]
fn zero_floor_is_rejected() {
    let result = GlobalConfig::from_toml_str(
        r"
[probe]
min_interval_ms = 0
",
    );
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn empty_url_is_rejected() {
    let result = GlobalConfig::from_toml_str(
        r#"
[probe]
url = "  "
"#,
    );
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn zero_retention_is_rejected() {
    let result = GlobalConfig::from_toml_str(
        r"
[retention]
network_states = 0
",
    );
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn invalid_toml_is_rejected() {
    let result = GlobalConfig::from_toml_str("[probe\ninterval_ms = ");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn unknown_transport_is_rejected() {
    let result = GlobalConfig::from_toml_str(
        r#"
[connectivity]
transports = ["carrier-pigeon"]
"#,
    );
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn denied_internet_access_disables_callbacks() {
    let config = GlobalConfig::from_toml_str(
        r"
[lifecycle]
internet_access_permitted = false
",
    )
    .expect("config");
    assert!(!config.lifecycle.capability_callback_enabled());
    assert!(!config.lifecycle.reachability_callback_enabled());
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(sample_toml().as_bytes()).expect("write");

    let config = GlobalConfig::load_from_path(file.path()).expect("load");
    assert_eq!(config.retention.network_capabilities, 40);
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let result = GlobalConfig::load_from_path(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}
