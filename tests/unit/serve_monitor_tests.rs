#[path = "../common/mod.rs"]
mod common;

use anyhow::{Context, Result};
use common::{counting, phase};
use readygate::app::ReadygateApp;
use readygate::config::spec::{CheckConfig, ReadinessConfig};
use readygate::connectors::ManagementServer;
use readygate::integration::ProbeFactory;
use readygate::readiness::{DependencySpec, DependencyState, Orchestrator, Probe, ProbeOutcome};
use readygate::reporter::{CheckProfile, ReadinessMonitor};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn dependency(name: &str, probe: Probe) -> DependencySpec {
    DependencySpec::new(
        name,
        vec![phase(
            "server-up",
            vec![probe],
            Duration::from_secs(1),
            Duration::from_secs(30),
        )],
        Duration::from_secs(30),
    )
    .expect("valid dependency")
}

fn check(cache: Duration, failure_threshold: u32, dependencies: Option<&[&str]>) -> CheckConfig {
    CheckConfig {
        cache,
        failure_threshold,
        dependencies: dependencies
            .map(|names| names.iter().map(|name| name.to_string()).collect()),
    }
}

fn monitor_with(
    outcomes: Vec<(&str, ProbeOutcome)>,
    window: Duration,
) -> (ReadinessMonitor, Vec<Arc<AtomicUsize>>) {
    let mut counters = Vec::new();
    let specs = outcomes
        .into_iter()
        .map(|(name, outcome)| {
            let (probe, calls) = counting("probe", outcome);
            counters.push(calls);
            dependency(name, probe)
        })
        .collect();
    let orchestrator = Orchestrator::new(specs).expect("valid orchestrator");
    (ReadinessMonitor::new(&orchestrator, window), counters)
}

#[tokio::test(start_paused = true)]
async fn repeated_queries_within_the_window_run_no_probes() {
    let (monitor, counters) = monitor_with(
        vec![
            ("db", ProbeOutcome::Success),
            ("redis", ProbeOutcome::transient("connection refused")),
        ],
        Duration::from_secs(2),
    );

    let first = monitor.current_status().await;
    let second = monitor.current_status().await;

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!first.ready);
    assert_eq!(first.dependencies[0].state(), DependencyState::Ready);
    assert_eq!(first.dependencies[1].state(), DependencyState::Pending);
    assert_eq!(counters[0].load(Ordering::SeqCst), 1);
    assert_eq!(counters[1].load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    let third = monitor.current_status().await;

    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(counters[0].load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn refresh_slower_than_the_window_is_still_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let slow = Probe::from_fn("query", move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3)).await;
            ProbeOutcome::transient("connection timed out")
        }
    });
    let orchestrator =
        Orchestrator::new(vec![dependency("db", slow)]).expect("valid orchestrator");
    let monitor = ReadinessMonitor::new(&orchestrator, Duration::from_secs(2));

    let (first, second) = tokio::join!(monitor.current_status(), monitor.current_status());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let third = monitor.current_status().await;
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    monitor.current_status().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn zero_window_always_refreshes() {
    let (monitor, counters) =
        monitor_with(vec![("db", ProbeOutcome::Success)], Duration::ZERO);

    let first = monitor.current_status().await;
    let second = monitor.current_status().await;

    assert!(first.ready);
    assert_eq!(first.as_ref(), second.as_ref());
    assert_eq!(counters[0].load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failure_threshold_counts_fresh_observations_only() {
    let (monitor, _) = monitor_with(
        vec![("db", ProbeOutcome::transient("connection refused"))],
        Duration::from_secs(1),
    );
    let liveness = CheckProfile::new(
        "liveness",
        monitor.clone(),
        check(Duration::from_secs(1), 3, None),
    );
    let readiness = CheckProfile::new(
        "readiness",
        monitor,
        check(Duration::from_secs(1), 1, None),
    );

    let verdict = liveness.evaluate().await;
    assert!(verdict.healthy);
    assert_eq!(verdict.consecutive_failures, 1);

    // Polling inside the cache window sees the same observation.
    for _ in 0..5 {
        assert_eq!(liveness.evaluate().await.consecutive_failures, 1);
    }
    assert!(!readiness.evaluate().await.healthy);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(liveness.evaluate().await.healthy);
    tokio::time::advance(Duration::from_secs(1)).await;
    let verdict = liveness.evaluate().await;
    assert!(!verdict.healthy);
    assert_eq!(verdict.consecutive_failures, 3);
    assert_eq!(verdict.failure_threshold, 3);
}

#[tokio::test(start_paused = true)]
async fn check_subsets_ignore_other_dependencies() {
    let (monitor, _) = monitor_with(
        vec![
            ("db", ProbeOutcome::Success),
            ("redis", ProbeOutcome::fatal("NOAUTH Authentication required")),
        ],
        Duration::from_secs(1),
    );
    let readiness = CheckProfile::new(
        "readiness",
        monitor.clone(),
        check(Duration::from_secs(1), 1, Some(&["db"])),
    );
    let everything =
        CheckProfile::new("liveness", monitor, check(Duration::from_secs(1), 1, None));

    let verdict = readiness.evaluate().await;
    assert!(verdict.healthy);
    assert!(verdict.status.ready);
    assert_eq!(verdict.status.dependencies.len(), 1);
    assert_eq!(readiness.name(), "readiness");

    assert!(!everything.evaluate().await.healthy);
}

async fn get(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    for _ in 0..50 {
        match client.get(url).send().await {
            Ok(response) => return Ok(response),
            Err(err) if err.is_connect() => tokio::time::sleep(Duration::from_millis(20)).await,
            Err(err) => return Err(err.into()),
        }
    }
    anyhow::bail!("management server at {url} never accepted a connection")
}

#[tokio::test(flavor = "multi_thread")]
async fn management_endpoints_report_check_verdicts() -> Result<()> {
    let upstream = TcpListener::bind("127.0.0.1:0").await?;
    let open_port = upstream.local_addr()?.port();
    let closed_port = common::reserve_port()?;
    let port = common::reserve_port()?;

    let yaml = format!(
        r#"
app:
  poll_interval: 5s
dependencies:
  - name: db
    phases:
      - name: server-up
        probes:
          - name: tcp
            type: tcp
            options: {{ host: 127.0.0.1, port: {open_port} }}
  - name: cache
    phases:
      - name: server-up
        probes:
          - name: tcp
            type: tcp
            options: {{ host: 127.0.0.1, port: {closed_port} }}
checks:
  readiness:
    cache: 2s
  liveness:
    dependencies: [db]
management:
  host: 127.0.0.1
  port: {port}
"#
    );
    let config = ReadinessConfig::from_yaml_str(&yaml).context("spec must parse")?;
    let app = ReadygateApp::from_config(config, &ProbeFactory::new())?;
    let management = app
        .config()
        .management
        .clone()
        .context("management section")?;
    let server = ManagementServer::build(&management)?.context("endpoints enabled")?;

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.serve(app.state(), shutdown.clone()));

    let client = reqwest::Client::new();
    let base = format!("http://127.0.0.1:{port}");

    let ready = get(&client, &format!("{base}/ready")).await?;
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        ready
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok()),
        Some("2")
    );
    let body: Value = ready.json().await?;
    assert_eq!(body["status"], "failing");
    assert_eq!(body["check"], "readiness");
    assert_eq!(body["ready"], false);

    let live = get(&client, &format!("{base}/live")).await?;
    assert_eq!(live.status(), StatusCode::OK);
    let body: Value = live.json().await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["dependencies"].as_array().map(Vec::len), Some(1));

    let first: Value = get(&client, &format!("{base}/status")).await?.json().await?;
    let second: Value = get(&client, &format!("{base}/status")).await?.json().await?;
    assert_eq!(first["ready"], false);
    assert_eq!(first["dependencies"], second["dependencies"]);
    assert_eq!(first["dependencies"][0]["state"], "READY");
    assert_eq!(first["dependencies"][1]["state"], "PENDING");
    assert!(first["ts"].is_string());

    let metrics = get(&client, &format!("{base}/metrics")).await?.text().await?;
    assert!(metrics.contains("readygate_status_refreshes_total"));
    assert!(metrics.contains("readygate_probe_outcomes_total"));

    drop(client);
    shutdown.cancel();
    handle.await??;
    drop(upstream);
    Ok(())
}
