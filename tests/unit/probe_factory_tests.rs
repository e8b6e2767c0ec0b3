#[path = "../common/mod.rs"]
mod common;

use readygate::config::spec::ReadinessConfig;
use readygate::integration::{host_and_port, ProbeFactory, ProbeFactoryError};
use readygate::readiness::{DependencyState, ProbeOutcome};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpListener;

fn spec_for_port(port: u16) -> ReadinessConfig {
    let yaml = format!(
        r#"
dependencies:
  - name: db
    deadline: 5s
    phases:
      - name: server-up
        retry_interval: 100ms
        probes:
          - name: tcp-connect
            type: tcp
            timeout: 1s
            options:
              url_env: APP_DATABASE_URL
  - name: api
    deadline: 5s
    phases:
      - name: listening
        probes:
          - name: tcp
            type: tcp
            options:
              host: 127.0.0.1
              port: {port}
"#
    );
    ReadinessConfig::from_yaml_str(&yaml).expect("spec must parse")
}

fn env(pairs: &[(&str, &str)]) -> ProbeFactory {
    let values: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    ProbeFactory::with_env(move |key| values.get(key).cloned())
}

#[test]
fn url_environment_variables_are_resolved_at_build_time() {
    let config = spec_for_port(8080);

    let err = env(&[])
        .build_orchestrator(&config)
        .expect_err("missing variable");
    match err {
        ProbeFactoryError::MissingEnv { probe, var } => {
            assert_eq!(var, "APP_DATABASE_URL");
            assert_eq!(
                probe,
                "dependency `db` phase `server-up` probe `tcp-connect`"
            );
        }
        other => panic!("expected missing env error, got {other:?}"),
    }

    let orchestrator = env(&[("APP_DATABASE_URL", "postgres://app:pw@db/app")])
        .build_orchestrator(&config)
        .expect("orchestrator builds");
    let specs = orchestrator.specs();
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].id(), "db");
    let probe = &specs[0].phases()[0].probes()[0];
    assert_eq!(probe.kind(), "tcp");
    assert_eq!(probe.timeout(), Some(Duration::from_secs(1)));
    assert_eq!(specs[0].phases()[0].retry_interval(), Duration::from_millis(100));
}

#[test]
fn invalid_urls_are_reported_with_the_password_redacted() {
    let config = spec_for_port(8080);

    let err = env(&[("APP_DATABASE_URL", "postgres://app:hunter2@db:port/app")])
        .build_orchestrator(&config)
        .expect_err("url with an invalid port");

    let rendered = err.to_string();
    assert!(matches!(err, ProbeFactoryError::InvalidUrl { .. }));
    assert!(!rendered.contains("hunter2"), "{rendered}");
}

#[test]
fn host_and_port_fills_in_well_known_ports() {
    assert_eq!(
        host_and_port("postgres://app@db/app"),
        Ok(("db".to_string(), 5432))
    );
    assert_eq!(
        host_and_port("redis://cache:6380/0"),
        Ok(("cache".to_string(), 6380))
    );
    assert_eq!(
        host_and_port("https://search.internal/_health"),
        Ok(("search.internal".to_string(), 443))
    );
    assert!(host_and_port("amqp://broker/vhost").is_err());
    assert!(host_and_port("not a url").is_err());
}

#[tokio::test]
async fn built_tcp_probes_observe_real_listeners() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let open_port = listener.local_addr().expect("local addr").port();
    let closed_port = common::reserve_port().expect("reserve port");

    let database_url = format!("postgres://127.0.0.1:{open_port}/app");

    let open = env(&[("APP_DATABASE_URL", database_url.as_str())])
        .build_orchestrator(&spec_for_port(open_port))
        .expect("orchestrator builds");
    let result = open.run().await;
    assert!(result.is_ready(), "{result:?}");

    let closed = env(&[("APP_DATABASE_URL", database_url.as_str())])
        .build_orchestrator(&spec_for_port(closed_port))
        .expect("orchestrator builds");
    let spec = &closed.specs()[1];
    let report = spec.evaluate_once().await;
    assert_eq!(report.state(), DependencyState::Pending);
    assert!(matches!(
        spec.phases()[0].probes()[0].evaluate(None).await,
        ProbeOutcome::Transient(_)
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn command_probes_classify_exit_codes() {
    let config = ReadinessConfig::from_yaml_str(
        r#"
dependencies:
  - name: migrations
    phases:
      - name: applied
        probes:
          - name: check
            type: command
            options:
              program: sh
              args: ["-c", "echo 'role missing' >&2; exit 2"]
              fatal_exit_codes: [2]
"#,
    )
    .expect("spec must parse");

    let orchestrator = ProbeFactory::new()
        .build_orchestrator(&config)
        .expect("orchestrator builds");
    let report = orchestrator.specs()[0].evaluate_once().await;

    assert_eq!(report.state(), DependencyState::Failed);
    let failure = report.result.last_failure().expect("failure recorded");
    assert!(failure.reason.contains("role missing"), "{}", failure.reason);
}
