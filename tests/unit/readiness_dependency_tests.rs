#[path = "../common/mod.rs"]
mod common;

use common::{always, counting, database_spec, phase, ready_after, CallLog};
use readygate::readiness::{
    DependencyResult, DependencySpec, DependencyState, ProbeFailure, ProbeOutcome, SpecError,
    TimeoutBound, TimeoutPolicy,
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn assert_about(elapsed: Duration, expected: Duration) {
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(100),
        "expected about {expected:?}, got {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn staged_start_up_resolves_ready_after_both_phases() {
    let log = CallLog::new();
    let spec = database_spec(
        ready_after("tcp-connect", Duration::from_secs(5), &log),
        ready_after("query", Duration::from_secs(4), &log),
    );

    let started = Instant::now();
    let report = spec.evaluate(&CancellationToken::new()).await;

    assert_eq!(report.result, DependencyResult::Ready);
    assert_eq!(report.phases_completed, 2);
    assert_eq!(report.phases_total, 2);
    assert_about(started.elapsed(), Duration::from_secs(9));

    // t = 0..=5 for the TCP probe, then t = 5, 7, 9 for the query.
    let calls = log.calls();
    assert_eq!(log.count("tcp-connect"), 6);
    assert_eq!(log.count("query"), 3);
    let first_query = calls
        .iter()
        .position(|call| call == "query")
        .expect("query probe ran");
    assert!(calls[..first_query].iter().all(|call| call == "tcp-connect"));
    assert!(calls[first_query..].iter().all(|call| call == "query"));
}

#[tokio::test(start_paused = true)]
async fn phase_bound_times_out_before_the_dependency_deadline() {
    let log = CallLog::new();
    let spec = database_spec(
        ready_after("tcp-connect", Duration::from_secs(5), &log),
        always("query", ProbeOutcome::transient("database \"app\" does not exist"), &log),
    );

    let started = Instant::now();
    let report = spec.evaluate(&CancellationToken::new()).await;

    assert_eq!(
        report.result,
        DependencyResult::TimedOut {
            phase: "schema-ready".to_string(),
            bound: TimeoutBound::Phase,
            last_failure: Some(ProbeFailure {
                probe: "query".to_string(),
                reason: "database \"app\" does not exist".to_string(),
            }),
        }
    );
    assert_eq!(report.phases_completed, 1);
    assert_about(started.elapsed(), Duration::from_secs(25));
}

#[tokio::test(start_paused = true)]
async fn dependency_deadline_caps_the_sum_of_phase_budgets() {
    let log = CallLog::new();
    let spec = DependencySpec::new(
        "db",
        vec![
            phase(
                "server-up",
                vec![ready_after("tcp-connect", Duration::from_secs(50), &log)],
                Duration::from_secs(1),
                Duration::from_secs(60),
            ),
            phase(
                "schema-ready",
                vec![always(
                    "query",
                    ProbeOutcome::transient("relation \"users\" missing"),
                    &log,
                )],
                Duration::from_secs(2),
                Duration::from_secs(60),
            ),
        ],
        Duration::from_secs(70),
    )
    .expect("valid dependency");

    let started = Instant::now();
    let report = spec.evaluate(&CancellationToken::new()).await;

    match &report.result {
        DependencyResult::TimedOut { phase, bound, .. } => {
            assert_eq!(phase, "schema-ready");
            assert_eq!(*bound, TimeoutBound::Deadline);
        }
        other => panic!("expected a deadline timeout, got {other:?}"),
    }
    assert_eq!(report.phases_completed, 1);
    assert_about(started.elapsed(), Duration::from_secs(70));
}

#[tokio::test(start_paused = true)]
async fn later_phase_never_runs_when_an_earlier_phase_does_not_complete() {
    let log = CallLog::new();
    let spec = database_spec(
        always("tcp-connect", ProbeOutcome::transient("connection refused"), &log),
        always("query", ProbeOutcome::Success, &log),
    );

    let report = spec.evaluate(&CancellationToken::new()).await;

    assert_eq!(report.state(), DependencyState::TimedOut);
    assert_eq!(report.result.phase(), Some("server-up"));
    assert_eq!(log.count("query"), 0);
}

#[tokio::test(start_paused = true)]
async fn fatal_probe_fails_after_one_evaluation() {
    let (auth, calls) = counting("auth", ProbeOutcome::fatal("wrong credentials"));
    let log = CallLog::new();
    let spec = database_spec(auth, always("query", ProbeOutcome::Success, &log));

    let started = Instant::now();
    let report = spec.evaluate(&CancellationToken::new()).await;

    assert_eq!(
        report.result,
        DependencyResult::Failed {
            phase: "server-up".to_string(),
            failure: ProbeFailure {
                probe: "auth".to_string(),
                reason: "wrong credentials".to_string(),
            },
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(log.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn degrade_policy_turns_timeouts_into_degraded() {
    let log = CallLog::new();
    let spec = DependencySpec::new(
        "redis",
        vec![phase(
            "server-up",
            vec![always("ping", ProbeOutcome::transient("LOADING"), &log)],
            Duration::from_secs(1),
            Duration::from_secs(30),
        )],
        Duration::from_secs(10),
    )
    .expect("valid dependency")
    .with_timeout_policy(TimeoutPolicy::Degrade);

    let started = Instant::now();
    let report = spec.evaluate(&CancellationToken::new()).await;

    assert!(matches!(
        report.result,
        DependencyResult::Degraded {
            bound: Some(TimeoutBound::Deadline),
            ..
        }
    ));
    assert!(report.state().is_satisfied());
    assert_about(started.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn degrade_policy_does_not_mask_fatal_failures() {
    let log = CallLog::new();
    let spec = DependencySpec::new(
        "redis",
        vec![phase(
            "server-up",
            vec![always("ping", ProbeOutcome::fatal("NOAUTH"), &log)],
            Duration::from_secs(1),
            Duration::from_secs(30),
        )],
        Duration::from_secs(30),
    )
    .expect("valid dependency")
    .with_timeout_policy(TimeoutPolicy::Degrade);

    let report = spec.evaluate(&CancellationToken::new()).await;

    assert_eq!(report.state(), DependencyState::Failed);
}

#[tokio::test(start_paused = true)]
async fn cancelled_evaluation_reports_pending() {
    let log = CallLog::new();
    let spec = database_spec(
        always("tcp-connect", ProbeOutcome::transient("connection refused"), &log),
        always("query", ProbeOutcome::Success, &log),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = spec.evaluate(&cancel).await;

    assert_eq!(report.state(), DependencyState::Pending);
    assert!(log.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn single_pass_evaluation_never_sleeps() {
    let log = CallLog::new();
    let spec = database_spec(
        always("tcp-connect", ProbeOutcome::Success, &log),
        always("query", ProbeOutcome::transient("relation missing"), &log),
    );

    let started = Instant::now();
    let report = spec.evaluate_once().await;

    assert_eq!(
        report.result,
        DependencyResult::Pending {
            phase: "schema-ready".to_string(),
            last_failure: Some(ProbeFailure {
                probe: "query".to_string(),
                reason: "relation missing".to_string(),
            }),
        }
    );
    assert_eq!(report.phases_completed, 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(log.calls(), vec!["tcp-connect", "query"]);
}

#[tokio::test]
async fn single_pass_under_degrade_reports_degraded() {
    let log = CallLog::new();
    let spec = DependencySpec::new(
        "redis",
        vec![phase(
            "server-up",
            vec![always("ping", ProbeOutcome::transient("connection refused"), &log)],
            Duration::from_secs(1),
            Duration::from_secs(30),
        )],
        Duration::from_secs(30),
    )
    .expect("valid dependency")
    .with_timeout_policy(TimeoutPolicy::Degrade);

    let report = spec.evaluate_once().await;

    assert!(matches!(
        report.result,
        DependencyResult::Degraded { bound: None, .. }
    ));
}

#[test]
fn report_serialises_state_and_phase() {
    let log = CallLog::new();
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let report = runtime.block_on(
        database_spec(
            always("tcp-connect", ProbeOutcome::fatal("wrong credentials"), &log),
            always("query", ProbeOutcome::Success, &log),
        )
        .evaluate_once(),
    );

    let value = serde_json::to_value(&report).expect("report serialises");
    assert_eq!(value["dependency"], "db");
    assert_eq!(value["state"], "FAILED");
    assert_eq!(value["phase"], "server-up");
    assert_eq!(value["failure"]["probe"], "tcp-connect");
    assert_eq!(value["phases_total"], 2);
}

#[test]
fn malformed_dependencies_are_rejected() {
    let log = CallLog::new();
    let server_up = || {
        phase(
            "server-up",
            vec![always("tcp", ProbeOutcome::Success, &log)],
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
    };

    assert_eq!(
        DependencySpec::new("db", Vec::new(), Duration::from_secs(5)).unwrap_err(),
        SpecError::NoPhases {
            dependency: "db".to_string()
        }
    );
    assert!(matches!(
        DependencySpec::new("db", vec![server_up()], Duration::ZERO),
        Err(SpecError::ZeroDuration { .. })
    ));
    assert!(matches!(
        DependencySpec::new("db", vec![server_up(), server_up()], Duration::from_secs(5)),
        Err(SpecError::DuplicateName { .. })
    ));
    assert!(matches!(
        DependencySpec::new(" ", vec![server_up()], Duration::from_secs(5)),
        Err(SpecError::EmptyName { .. })
    ));
}
