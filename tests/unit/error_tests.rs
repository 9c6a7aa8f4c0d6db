//! Unit tests for `AppError` formatting and conversions.

use netaware::sequencer::Outcome;
use netaware::AppError;

#[test]
fn display_includes_category_prefix() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(AppError::Db("locked".into()).to_string(), "db: locked");
    assert_eq!(AppError::Probe("timeout".into()).to_string(), "probe: timeout");
    assert_eq!(AppError::Step("boom".into()).to_string(), "step: boom");
    assert_eq!(AppError::Cancelled.to_string(), "cancelled");
    assert_eq!(AppError::NotFound("session 3".into()).to_string(), "not found: session 3");
    assert_eq!(AppError::Io("denied".into()).to_string(), "io: denied");
}

#[test]
fn io_error_converts_to_io() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(err, AppError::Io(msg) if msg.contains("gone")));
}

#[test]
fn toml_error_converts_to_config() {
    let parse: Result<toml::Value, _> = toml::from_str("= 1");
    let err: AppError = parse.expect_err("invalid toml").into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn results_map_to_outcomes() {
    assert!(matches!(Outcome::from(Ok::<_, AppError>(3)), Outcome::Success(3)));
    assert!(matches!(
        Outcome::<u8>::from(Err(AppError::Cancelled)),
        Outcome::Cancelled
    ));
    assert!(matches!(
        Outcome::<u8>::from(Err(AppError::Db("x".into()))),
        Outcome::Fault(AppError::Db(_))
    ));
}

#[test]
fn outcome_map_preserves_control_variants() {
    assert!(matches!(Outcome::Success(2).map(|v| v * 2), Outcome::Success(4)));
    assert!(matches!(Outcome::<u8>::AutoReset.map(|v| v + 1), Outcome::AutoReset));
    assert!(!Outcome::<u8>::Cancelled.is_success());
}
