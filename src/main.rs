#![allow(clippy::result_large_err)]

use anyhow::Context;
use readygate::app::ReadygateApp;
use readygate::config::{ReadinessConfig, ReadygateConfig};
use readygate::reporter::{ExecCommand, EXIT_CONFIG_ERROR, EXIT_DEPENDENCY_FAILURE, EXIT_READY};
use readygate::runtime::spawn_signal_listener;
use readygate::telemetry;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

const QUIET_FILTER: &str = "readygate=warn,warn";

enum CliCommand {
    Gate {
        spec_path: Option<PathBuf>,
        command: Option<ExecCommand>,
    },
    Serve {
        spec_path: Option<PathBuf>,
    },
    Check {
        spec_path: Option<PathBuf>,
    },
    Validate {
        specs: Vec<PathBuf>,
    },
    Help,
}

#[tokio::main]
async fn main() -> ExitCode {
    let command = match parse_cli_args(std::env::args_os().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("error: {err:#}");
            eprintln!("run `readygate --help` for usage");
            return exit_code(EXIT_CONFIG_ERROR);
        }
    };

    let tracing_result = match &command {
        CliCommand::Check { .. } | CliCommand::Validate { .. } => {
            telemetry::init_tracing_with_default(QUIET_FILTER)
        }
        _ => telemetry::init_tracing(),
    };
    if let Err(err) = tracing_result {
        eprintln!("error: failed to initialise telemetry: {err}");
        return exit_code(EXIT_DEPENDENCY_FAILURE);
    }

    match run(command).await {
        Ok(code) => exit_code(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            let configuration = err
                .downcast_ref::<readygate::Error>()
                .is_some_and(readygate::Error::is_configuration);
            exit_code(if configuration {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_DEPENDENCY_FAILURE
            })
        }
    }
}

async fn run(command: CliCommand) -> anyhow::Result<i32> {
    match command {
        CliCommand::Gate { spec_path, command } => {
            let app = build_app(spec_path)?;
            spawn_signal_listener(app.shutdown_token());
            Ok(app.gate(command).await)
        }
        CliCommand::Serve { spec_path } => {
            let app = build_app(spec_path)?;
            spawn_signal_listener(app.shutdown_token());
            app.serve().await.context("management server error")?;
            Ok(EXIT_READY)
        }
        CliCommand::Check { spec_path } => {
            let app = build_app(spec_path)?;
            let status = app.check().await;
            let rendered =
                serde_json::to_string_pretty(status.as_ref()).context("failed to render status")?;
            println!("{rendered}");
            Ok(if status.ready {
                EXIT_READY
            } else {
                EXIT_DEPENDENCY_FAILURE
            })
        }
        CliCommand::Validate { specs } => Ok(run_validate_command(&specs)),
        CliCommand::Help => {
            print_help();
            Ok(EXIT_READY)
        }
    }
}

fn build_app(spec_path: Option<PathBuf>) -> anyhow::Result<ReadygateApp> {
    let mut settings = ReadygateConfig::load()
        .map_err(readygate::Error::from)
        .context("failed to load configuration")?;
    if spec_path.is_some() {
        settings.spec_path = spec_path;
    }

    let app = ReadygateApp::initialise(&settings)?;
    Ok(app)
}

fn run_validate_command(specs: &[PathBuf]) -> i32 {
    let mut had_error = false;

    for path in specs {
        match ReadinessConfig::from_path(path) {
            Ok(config) => println!(
                "validated {} ({} dependencies)",
                path.display(),
                config.dependencies.len()
            ),
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                had_error = true;
            }
        }
    }

    if had_error {
        EXIT_CONFIG_ERROR
    } else {
        EXIT_READY
    }
}

fn parse_cli_args<I>(args: I) -> anyhow::Result<CliCommand>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Ok(CliCommand::Help);
    };

    match first.to_str() {
        Some("gate") => parse_gate_args(args),
        Some("serve") => Ok(CliCommand::Serve {
            spec_path: parse_spec_flag("serve", args)?,
        }),
        Some("check") => Ok(CliCommand::Check {
            spec_path: parse_spec_flag("check", args)?,
        }),
        Some("validate") => {
            let specs: Vec<PathBuf> = args.map(PathBuf::from).collect();
            if specs.is_empty() {
                anyhow::bail!("readygate validate requires at least one spec path");
            }
            Ok(CliCommand::Validate { specs })
        }
        Some("-h") | Some("--help") | Some("help") => Ok(CliCommand::Help),
        _ => anyhow::bail!("unrecognised command `{}`", first.to_string_lossy()),
    }
}

fn parse_gate_args(mut args: impl Iterator<Item = OsString>) -> anyhow::Result<CliCommand> {
    let mut spec_path = None;

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--") => {
                let Some(program) = args.next() else {
                    anyhow::bail!("expected a command after `--`");
                };
                return Ok(CliCommand::Gate {
                    spec_path,
                    command: Some(ExecCommand::new(program, args.collect())),
                });
            }
            Some("-c") | Some("--config") => {
                if spec_path.is_some() {
                    anyhow::bail!("dependency spec path specified multiple times");
                }
                let value = args.next().ok_or_else(|| {
                    anyhow::anyhow!("expected path after {}", arg.to_string_lossy())
                })?;
                spec_path = Some(PathBuf::from(value));
            }
            _ => anyhow::bail!("unrecognised argument `{}`", arg.to_string_lossy()),
        }
    }

    Ok(CliCommand::Gate {
        spec_path,
        command: None,
    })
}

fn parse_spec_flag(
    command: &str,
    mut args: impl Iterator<Item = OsString>,
) -> anyhow::Result<Option<PathBuf>> {
    let mut spec_path = None;

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("-c") | Some("--config") => {
                if spec_path.is_some() {
                    anyhow::bail!("dependency spec path specified multiple times");
                }
                let value = args.next().ok_or_else(|| {
                    anyhow::anyhow!("expected path after {}", arg.to_string_lossy())
                })?;
                spec_path = Some(PathBuf::from(value));
            }
            _ => anyhow::bail!(
                "unrecognised argument `{}` for `readygate {command}`",
                arg.to_string_lossy()
            ),
        }
    }

    Ok(spec_path)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn print_help() {
    println!(
        "\
Usage: readygate gate [-c <PATH>] [-- <COMMAND> [ARGS]...]
       readygate serve [-c <PATH>]
       readygate check [-c <PATH>]
       readygate validate <PATH>...

Commands:
  gate        Wait for every dependency, then exec COMMAND
  serve       Serve /live, /ready, /status and /metrics
  check       Evaluate once, print JSON status, exit 0 when ready
  validate    Check dependency spec files without running probes

Options:
  -c, --config <PATH>    Dependency spec YAML (default: READYGATE__SPEC_PATH,
                         otherwise built from DATABASE_URL and REDIS_URL)
  -h, --help             Print this help message

Exit status:
  0  ready (gate hands off to COMMAND)
  1  dependency failed or timed out
  2  configuration error
  3  COMMAND could not be started
"
    );
}
