// tests/unit_config_test.rs

use herdguard::config::CoordinatorConfig;
use std::io::Write;

#[test]
fn test_defaults() {
    let config = CoordinatorConfig::default();
    assert_eq!(config.compute_time, 2.0);
    assert_eq!(config.wait_seconds, None);
    assert_eq!(config.waiter_retries, 1);
    assert!(config.validate().is_ok());
}

#[test]
fn test_from_file_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "compute_time = 0.5").unwrap();
    writeln!(file, "wait_seconds = 0.05").unwrap();
    writeln!(file, "waiter_retries = 3").unwrap();

    let config = CoordinatorConfig::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.compute_time, 0.5);
    assert_eq!(config.wait_seconds, Some(0.05));
    assert_eq!(config.waiter_retries, 3);
}

#[test]
fn test_from_file_applies_defaults_for_missing_fields() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "compute_time = 4.0").unwrap();

    let config = CoordinatorConfig::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.compute_time, 4.0);
    assert_eq!(config.wait_seconds, None);
    assert_eq!(config.waiter_retries, 1);
}

#[test]
fn test_from_file_rejects_invalid_compute_time() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "compute_time = 0.0").unwrap();

    assert!(CoordinatorConfig::from_file(file.path().to_str().unwrap()).is_err());
}

#[test]
fn test_validate_rejects_negative_wait() {
    let config = CoordinatorConfig {
        wait_seconds: Some(-1.0),
        ..CoordinatorConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_from_file_missing_path() {
    assert!(CoordinatorConfig::from_file("/definitely/not/here.toml").is_err());
}
