//! Tests for retry policy module

use super::*;

// ============================================================================
// Fixed Policy Tests
// ============================================================================

#[test]
fn test_retry_policy_default_values() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.initial_delay_seconds, 120);
    assert_eq!(policy.max_delay_seconds, 120);
    assert_eq!(policy.backoff_multiplier, 1.0);
    assert!(policy.is_fixed());
}

#[test]
fn test_fixed_delay_ignores_receive_count() {
    let policy = RetryPolicy::fixed(45);

    assert_eq!(policy.calculate_delay(None), 45);
    assert_eq!(policy.calculate_delay(Some(1)), 45);
    assert_eq!(policy.calculate_delay(Some(500)), 45);
}

#[test]
fn test_fixed_delay_is_capped_at_visibility_limit() {
    let policy = RetryPolicy::fixed(100_000);

    assert_eq!(policy.calculate_delay(Some(1)), MAX_VISIBILITY_SECONDS);
}

// ============================================================================
// Exponential Policy Tests
// ============================================================================

#[test]
fn test_exponential_delay_growth() {
    let policy = RetryPolicy::exponential(10, 1_000, 2.0);

    // First delivery: 10 * 2^0
    assert_eq!(policy.calculate_delay(Some(1)), 10);

    // Second delivery: 10 * 2^1
    assert_eq!(policy.calculate_delay(Some(2)), 20);

    // Fourth delivery: 10 * 2^3
    assert_eq!(policy.calculate_delay(Some(4)), 80);

    // Eighth delivery: would be 1280 but capped at 1000
    assert_eq!(policy.calculate_delay(Some(8)), 1_000);
}

/// Verify a NaN multiplier never yields an immediate redelivery
#[test]
fn test_nan_multiplier_falls_back_to_initial_delay() {
    let policy = RetryPolicy::exponential(30, 900, f64::NAN);

    assert!(policy.is_fixed());
    assert_eq!(policy.calculate_delay(Some(1)), 30);
    assert_eq!(policy.calculate_delay(Some(3)), 30);
    assert_eq!(policy.calculate_delay(None), 30);
}

/// Verify an infinite multiplier is held at the policy maximum
#[test]
fn test_infinite_multiplier_is_capped() {
    let policy = RetryPolicy::exponential(30, 900, f64::INFINITY);

    assert_eq!(policy.calculate_delay(Some(3)), 900);
}

#[test]
fn test_exponential_missing_count_uses_initial_delay() {
    let policy = RetryPolicy::exponential(10, 1_000, 2.0);

    assert_eq!(policy.calculate_delay(None), 10);
    assert_eq!(policy.calculate_delay(Some(0)), 10);
}

#[test]
fn test_exponential_huge_receive_count_does_not_overflow() {
    let policy = RetryPolicy::exponential(1, 100_000, 10.0);

    assert_eq!(policy.calculate_delay(Some(u32::MAX)), MAX_VISIBILITY_SECONDS);
}

#[test]
fn test_policy_deserializes_with_defaults() {
    let policy: RetryPolicy = serde_json::from_str(r#"{"initial_delay_seconds": 30}"#).unwrap();

    assert_eq!(policy.initial_delay_seconds, 30);
    assert_eq!(policy.max_delay_seconds, 120);
    assert!(policy.is_fixed());
    assert_eq!(policy.calculate_delay(Some(3)), 30);
}
