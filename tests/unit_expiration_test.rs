// tests/unit_expiration_test.rs

use herdguard::core::expiration::{ABSOLUTE_EXPIRATION_THRESHOLD, normalize_expiration};

const NOW: f64 = 1_700_000_000.0;

#[test]
fn test_relative_values_pass_through() {
    assert_eq!(normalize_expiration(0.0, NOW), 0.0);
    assert_eq!(normalize_expiration(60.0, NOW), 60.0);
    assert_eq!(normalize_expiration(86_400.0, NOW), 86_400.0);
}

#[test]
fn test_threshold_is_exclusive() {
    // Exactly 30 days is still a relative value.
    assert_eq!(
        normalize_expiration(ABSOLUTE_EXPIRATION_THRESHOLD, NOW),
        ABSOLUTE_EXPIRATION_THRESHOLD
    );
    // One second past the threshold is an absolute timestamp.
    let absolute = ABSOLUTE_EXPIRATION_THRESHOLD + 1.0;
    assert_eq!(normalize_expiration(absolute, NOW), absolute - NOW);
}

#[test]
fn test_epoch_timestamp_becomes_relative() {
    assert_eq!(normalize_expiration(NOW + 100.0, NOW), 100.0);
}

#[test]
fn test_past_epoch_timestamp_goes_negative() {
    // An absolute timestamp in the past means "already stale".
    assert_eq!(normalize_expiration(NOW - 50.0, NOW), -50.0);
}

#[test]
fn test_fractional_seconds_survive() {
    assert_eq!(normalize_expiration(0.25, NOW), 0.25);
    assert_eq!(normalize_expiration(NOW + 0.5, NOW), 0.5);
}
