// tests/readiness.rs

use std::time::Duration;

use cutover::readiness::{Readiness, wait_until_ready};
use cutover_test_utils::fakes::FakeSupervisor;
use cutover_test_utils::{init_tracing, with_timeout};

const WAIT: Duration = Duration::from_millis(1);

#[tokio::test]
async fn running_on_third_poll_is_ready() {
    init_tracing();
    let sup = FakeSupervisor::with_statuses(&["STARTING", "STARTING", "RUNNING"]);

    let result = with_timeout(wait_until_ready(&sup, "prog", 3, WAIT)).await;

    assert_eq!(result, Readiness::Running);
    assert_eq!(sup.status_polls(), 3);
}

#[tokio::test]
async fn exhausting_tries_is_not_ready() {
    init_tracing();
    let sup = FakeSupervisor::with_statuses(&["STARTING", "STARTING", "STARTING"]);

    let result = with_timeout(wait_until_ready(&sup, "prog", 2, WAIT)).await;

    assert_eq!(
        result,
        Readiness::Exhausted {
            last: "STARTING".to_string(),
            tries: 2
        }
    );
    assert!(!result.is_ready());
    assert_eq!(sup.status_polls(), 2, "max_tries bounds the total polls");
}

#[tokio::test]
async fn fatal_stops_polling_immediately() {
    init_tracing();
    let sup = FakeSupervisor::with_statuses(&["STARTING", "FATAL", "RUNNING"]);

    let result = with_timeout(wait_until_ready(&sup, "prog", 5, WAIT)).await;

    assert_eq!(result, Readiness::Fatal);
    assert_eq!(sup.status_polls(), 2);
}

#[tokio::test]
async fn unavailable_status_stops_polling_immediately() {
    init_tracing();
    let sup = FakeSupervisor::new();
    sup.status_unavailable();

    let result = with_timeout(wait_until_ready(&sup, "prog", 5, WAIT)).await;

    assert!(matches!(result, Readiness::Unavailable(_)), "got {result:?}");
    assert_eq!(sup.status_polls(), 1);
}

#[tokio::test]
async fn status_words_are_case_insensitive() {
    init_tracing();
    let sup = FakeSupervisor::with_statuses(&["backoff", "running"]);

    let result = with_timeout(wait_until_ready(&sup, "prog", 2, WAIT)).await;

    assert!(result.is_ready());
}

#[tokio::test]
async fn wait_doubles_between_polls() {
    init_tracing();
    let sup = FakeSupervisor::with_statuses(&["STARTING", "STARTING", "STARTING", "RUNNING"]);

    let started = std::time::Instant::now();
    let result = with_timeout(wait_until_ready(&sup, "prog", 4, Duration::from_millis(20))).await;

    assert!(result.is_ready());
    // 20 + 40 + 80 ms of sleeping before the fourth poll.
    assert!(started.elapsed() >= Duration::from_millis(140));
}
