use readygate::config::spec::{
    ManagementConfig, ProbeKind, ReadinessConfig, SpecConfigError, TcpTarget, UrlSource,
};
use readygate::probes::MissingDatabase;
use readygate::readiness::TimeoutPolicy;
use std::io::Write;
use std::time::Duration;

const SPEC_YAML: &str = r#"
app:
  poll_interval: 3s
  default_deadline: 2m
  probe_timeout: 4s
dependencies:
  - name: db
    deadline: 90s
    phases:
      - name: server-up
        retry_interval: 1s
        max_duration: 60s
        probes:
          - name: tcp-connect
            type: tcp
            options:
              url_env: DATABASE_URL
      - name: schema-ready
        retry_interval: 2s
        max_duration: 20s
        probes:
          - name: query
            type: postgres
            timeout: 2s
            options:
              url_env: DATABASE_URL
              query: SELECT 1 FROM users LIMIT 1
              missing_database: fatal
  - name: redis
    on_timeout: degrade
    phases:
      - name: server-up
        probes:
          - name: ping
            type: redis
            options:
              url: redis://cache:6379
  - name: search
    phases:
      - name: cluster-green
        probes:
          - name: health
            type: http
            options:
              url: http://search:9200/_cluster/health
              expect_status: 200
          - name: migrations
            type: command
            options:
              program: ./bin/check-migrations
              args: ["--quiet"]
              fatal_exit_codes: [2]
checks:
  readiness:
    cache: 1s
    dependencies: [db, redis]
  liveness:
    failure_threshold: 5
management:
  host: 127.0.0.1
  port: 9090
"#;

fn parse(yaml: &str) -> Result<ReadinessConfig, SpecConfigError> {
    ReadinessConfig::from_reader(yaml.as_bytes())
}

fn validation_messages(yaml: &str) -> Vec<String> {
    match parse(yaml) {
        Err(SpecConfigError::Invalid(err)) => err.messages().to_vec(),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn full_spec_parses_with_defaults_applied() {
    let config = parse(SPEC_YAML).expect("spec must parse");

    assert_eq!(config.app.poll_interval, Duration::from_secs(3));
    assert_eq!(config.dependencies.len(), 3);

    let db = config.dependency("db").expect("db dependency");
    assert_eq!(db.deadline, Duration::from_secs(90));
    assert_eq!(db.on_timeout, TimeoutPolicy::Fatal);
    assert_eq!(db.phases[0].name, "server-up");
    assert_eq!(db.phases[1].max_duration, Duration::from_secs(20));
    assert_eq!(
        db.phases[0].probes[0].kind,
        ProbeKind::Tcp(TcpTarget::Url(UrlSource::Env("DATABASE_URL".to_string())))
    );
    assert_eq!(db.phases[0].probes[0].timeout, Duration::from_secs(4));
    assert_eq!(db.phases[1].probes[0].timeout, Duration::from_secs(2));
    match &db.phases[1].probes[0].kind {
        ProbeKind::Postgres(options) => {
            assert_eq!(options.missing_database, MissingDatabase::Fatal);
            assert_eq!(options.query.as_deref(), Some("SELECT 1 FROM users LIMIT 1"));
        }
        other => panic!("expected postgres probe, got {other:?}"),
    }

    let redis = config.dependency("redis").expect("redis dependency");
    assert_eq!(redis.on_timeout, TimeoutPolicy::Degrade);
    assert_eq!(redis.deadline, Duration::from_secs(120));
    assert_eq!(redis.phases[0].retry_interval, Duration::from_secs(3));
    assert_eq!(redis.phases[0].max_duration, Duration::from_secs(120));

    let search = config.dependency("search").expect("search dependency");
    match &search.phases[0].probes[1].kind {
        ProbeKind::Command(options) => {
            assert_eq!(options.program, "./bin/check-migrations");
            assert_eq!(options.args, vec!["--quiet".to_string()]);
            assert_eq!(options.fatal_exit_codes, vec![2]);
        }
        other => panic!("expected command probe, got {other:?}"),
    }

    assert_eq!(config.checks.readiness.cache, Duration::from_secs(1));
    assert_eq!(config.checks.readiness.failure_threshold, 1);
    assert_eq!(
        config.checks.readiness.dependencies,
        Some(vec!["db".to_string(), "redis".to_string()])
    );
    assert_eq!(config.checks.liveness.cache, Duration::from_secs(3));
    assert_eq!(config.checks.liveness.failure_threshold, 5);

    let management = config.management.expect("management section");
    assert_eq!(management.host, "127.0.0.1");
    assert_eq!(management.port, 9090);
    assert_eq!(
        management.ready.map(|endpoint| endpoint.path),
        Some("/ready".to_string())
    );
}

#[test]
fn every_problem_is_reported_at_once() {
    let messages = validation_messages(
        r#"
dependencies:
  - name: db
    deadline: soon
    on_timeout: ignore
    phases:
      - name: server-up
        retry_interval: 0s
        probes:
          - name: tcp
            type: tcp
            options:
              host: db
      - name: server-up
        probes:
          - name: query
            type: postgres
            options:
              url: postgres://db/app
              url_env: DATABASE_URL
  - name: db
    phases: []
"#,
    );

    let expected_fragments = [
        "dependency `db` deadline must be a valid duration",
        "on_timeout must be one of `fatal` or `degrade`",
        "retry_interval must be greater than zero",
        "options require both `host` and `port`",
        "declares phase `server-up` more than once",
        "must set only one of `url` or `url_env`",
        "must declare at least one phase",
    ];
    for fragment in expected_fragments {
        assert!(
            messages.iter().any(|message| message.contains(fragment)),
            "missing `{fragment}` in {messages:#?}"
        );
    }
}

#[test]
fn empty_and_unknown_sections_are_rejected() {
    let messages = validation_messages("dependencies: []\nretries: 3\n");

    assert!(messages
        .iter()
        .any(|message| message.contains("at least one dependency is required")));
    assert!(messages
        .iter()
        .any(|message| message.contains("unknown top-level key \"retries\"")));
}

#[test]
fn unknown_probe_type_and_option_fields_are_rejected() {
    let messages = validation_messages(
        r#"
dependencies:
  - name: broker
    phases:
      - name: up
        probes:
          - name: amqp
            type: amqp
          - name: web
            type: http
            options:
              url: http://broker:15672
              verb: HEAD
"#,
    );

    assert!(messages
        .iter()
        .any(|message| message.contains("unsupported type `amqp`")));
    assert!(messages
        .iter()
        .any(|message| message.contains("probe `web` has invalid options")));
}

#[test]
fn check_subsets_must_name_known_dependencies() {
    let messages = validation_messages(
        r#"
dependencies:
  - name: db
    phases:
      - name: up
        probes:
          - name: tcp
            type: tcp
            options: { host: db, port: 5432 }
checks:
  liveness:
    dependencies: [cache]
    failure_threshold: 0
"#,
    );

    assert!(messages
        .iter()
        .any(|message| message.contains("unknown dependency `cache`")));
    assert!(messages
        .iter()
        .any(|message| message.contains("failure_threshold must be greater than zero")));
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let err = parse("dependencies: [\n").expect_err("broken yaml");
    assert!(matches!(err, SpecConfigError::Parse(_)));
}

#[test]
fn management_section_defaults_every_endpoint() {
    let config = parse(
        r#"
dependencies:
  - name: db
    phases:
      - name: up
        probes:
          - name: tcp
            type: tcp
            options: { host: db, port: 5432 }
management:
  port: 9100
"#,
    )
    .expect("spec must parse");

    assert_eq!(
        config.management,
        Some(ManagementConfig {
            port: 9100,
            ..ManagementConfig::default()
        })
    );
}

#[test]
fn management_paths_must_be_distinct() {
    let messages = validation_messages(
        r#"
dependencies:
  - name: db
    phases:
      - name: up
        probes:
          - name: tcp
            type: tcp
            options: { host: db, port: 5432 }
management:
  port: 9100
  live:
    path: health
  ready:
    path: /health
"#,
    );

    assert!(messages
        .iter()
        .any(|message| message.contains("`/health` is used more than once")));
}

#[test]
fn environment_defaults_build_database_and_optional_redis() {
    let config =
        ReadinessConfig::from_environment(Some("postgres://app:secret@db:5432/app"), None)
            .expect("database url is enough");

    assert_eq!(config.dependencies.len(), 1);
    let db = &config.dependencies[0];
    assert_eq!(db.name, "db");
    assert_eq!(db.deadline, Duration::from_secs(90));
    let phases: Vec<_> = db.phases.iter().map(|phase| phase.name.as_str()).collect();
    assert_eq!(phases, vec!["server-up", "schema-ready"]);
    assert_eq!(db.phases[0].retry_interval, Duration::from_secs(1));
    assert_eq!(db.phases[0].max_duration, Duration::from_secs(60));
    assert_eq!(db.phases[1].retry_interval, Duration::from_secs(2));
    assert_eq!(db.phases[1].max_duration, Duration::from_secs(20));

    let with_redis = ReadinessConfig::from_environment(
        Some("postgres://db/app"),
        Some("redis://cache:6379/0"),
    )
    .expect("both urls");
    let redis = with_redis.dependency("redis").expect("redis dependency");
    assert_eq!(redis.on_timeout, TimeoutPolicy::Degrade);
}

#[test]
fn environment_defaults_require_a_database_url() {
    let err = ReadinessConfig::from_environment(Some("  "), Some("redis://cache"))
        .expect_err("blank database url");

    assert!(err.to_string().contains("DATABASE_URL is not set"));
}

#[test]
fn spec_file_is_read_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(SPEC_YAML.as_bytes()).expect("write spec");

    let config = ReadinessConfig::from_path(file.path()).expect("spec loads from disk");
    assert_eq!(config.dependencies.len(), 3);

    let missing = ReadinessConfig::from_path(file.path().with_extension("missing"));
    assert!(matches!(missing, Err(SpecConfigError::Io(_))));
}
