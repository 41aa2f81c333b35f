//! §8 S6: a rule with `cooldown_minutes=15, max_notifications_per_hour=2`
//! admits the first and third qualifying result but blocks the second
//! (too soon after the first) and would block a fourth within the hour
//! (hourly cap already spent).

use chrono::{Duration, TimeZone, Utc};
use testctl_core::alerts::{AlertEngine, AlertRule};
use testctl_core::contracts::{AlertType, ErrorKind, TestResult};
use uuid::Uuid;

fn failing_result(score: f64) -> TestResult {
    let mut result = TestResult::failure(
        Uuid::new_v4(),
        Uuid::new_v4(),
        "api_tester",
        100,
        ErrorKind::TransientIo,
        "endpoint returned 503",
    );
    result.score = score;
    result
}

#[tokio::test]
async fn cooldown_and_hourly_cap_gate_admission() {
    let engine = AlertEngine::new(Vec::new(), 3);
    let mut rule = AlertRule::new("rate-limited", vec![AlertType::TestFailure]);
    rule.cooldown = Duration::minutes(15);
    rule.max_notifications_per_hour = 2;
    engine.add_rule(rule);

    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let t10 = t0 + Duration::minutes(10);
    let t20 = t0 + Duration::minutes(20);
    let t25 = t0 + Duration::minutes(25);

    // t=0: admitted (first ever fire).
    let fired_t0 = engine.evaluate_test_result(&failing_result(0.1), t0);
    assert_eq!(fired_t0.len(), 1, "t=0 should fire");

    // t=10min: blocked by the 15-minute cooldown.
    let fired_t10 = engine.evaluate_test_result(&failing_result(0.1), t10);
    assert!(fired_t10.is_empty(), "t=10min should be blocked by cooldown");

    // t=20min: cooldown has elapsed (20 >= 15), hourly count is 1 < 2 -> admitted.
    let fired_t20 = engine.evaluate_test_result(&failing_result(0.1), t20);
    assert_eq!(fired_t20.len(), 1, "t=20min should fire, completing the hourly cap");

    // t=25min: cooldown elapsed again, but hourly cap (2) already spent.
    let fired_t25 = engine.evaluate_test_result(&failing_result(0.1), t25);
    assert!(fired_t25.is_empty(), "t=25min should be blocked by the hourly cap");

    assert_eq!(engine.queue_len(), 2, "exactly the two admitted alerts were enqueued for delivery");
}

/// §8 property 4, restated with a fresh hour: once the hour window
/// rolls over the count resets and a new admission becomes possible.
#[tokio::test]
async fn hourly_cap_resets_on_the_next_hour_window() {
    let engine = AlertEngine::new(Vec::new(), 3);
    let mut rule = AlertRule::new("rate-limited", vec![AlertType::TestFailure]);
    rule.cooldown = Duration::minutes(1);
    rule.max_notifications_per_hour = 1;
    engine.add_rule(rule);

    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let within_hour = t0 + Duration::minutes(30);
    let next_hour = t0 + Duration::hours(1) + Duration::minutes(1);

    assert_eq!(engine.evaluate_test_result(&failing_result(0.1), t0).len(), 1);
    assert!(engine.evaluate_test_result(&failing_result(0.1), within_hour).is_empty());
    assert_eq!(engine.evaluate_test_result(&failing_result(0.1), next_hour).len(), 1);
}

/// A passing result never synthesises an alert regardless of rate state.
#[tokio::test]
async fn passing_results_never_fire() {
    let engine = AlertEngine::new(Vec::new(), 3);
    engine.add_rule(AlertRule::new("any-failure", vec![AlertType::TestFailure]));
    let mut result = failing_result(1.0);
    result.passed = true;
    let fired = engine.evaluate_test_result(&result, Utc::now());
    assert!(fired.is_empty());
}
