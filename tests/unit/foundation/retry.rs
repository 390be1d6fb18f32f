use super::*;

fn policy(n: u32) -> RetryPolicy {
    RetryPolicy::new(n, Duration::from_secs(1)).unwrap()
}

#[test]
fn policy_rejects_zero_attempts_and_zero_timeout() {
    assert!(RetryPolicy::new(0, Duration::from_secs(1)).is_err());
    assert!(RetryPolicy::new(1, Duration::ZERO).is_err());
}

#[test]
fn single_attempt_policy_tries_exactly_once() {
    let mut calls = 0;
    let out: Result<(), _> = run_with_retry(&policy(1), "t", |_| {
        calls += 1;
        Err(AttemptError::Transient("down"))
    });
    let err = out.unwrap_err();
    assert_eq!(calls, 1);
    assert_eq!(err.attempts, 1);
    assert_eq!(err.last, "down");
}

#[test]
fn transient_failures_are_retried_until_success() {
    let mut seen = Vec::new();
    let out = run_with_retry(&policy(3), "t", |attempt| {
        seen.push(attempt);
        if attempt < 3 {
            Err(AttemptError::Transient("flaky"))
        } else {
            Ok(attempt * 10)
        }
    });
    assert_eq!(out.unwrap(), 30);
    assert_eq!(seen, vec![1, 2, 3]);
}

#[test]
fn permanent_failure_stops_immediately() {
    let mut calls = 0;
    let out: Result<(), _> = run_with_retry(&policy(5), "t", |_| {
        calls += 1;
        Err(AttemptError::Permanent("404"))
    });
    assert_eq!(calls, 1);
    assert_eq!(out.unwrap_err().attempts, 1);
}
