//! mrun: the command-line entry point for Matrixrun.
//!
//! # Usage
//!
//! ```text
//! mrun                          # default sessions
//! mrun -s tests -s lint         # by name
//! mrun -s tests-3.12            # one instance, by display id
//! mrun -t ci --include-non-default
//! mrun -l                       # list sessions
//! mrun -s echo_args -- hello world
//! ```
//!
//! Exit codes: 0 when every selected session succeeded (skips are neutral),
//! 1 when any failed, 2 for invocation mistakes caught before running.

mod args;

use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use matrixrun_core::config::SessionFile;
use matrixrun_core::errors::{EXIT_FAILURE, EXIT_SUCCESS};
use matrixrun_core::report::render_listing;
use matrixrun_core::{Error, Orchestrator, ShellRunner};

use args::Args;

fn main() {
    let args = Args::parse();
    init_logging(args.log_filter());

    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    };
    process::exit(code);
}

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter.
fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load, plan and (unless listing) execute. Returns the process exit code.
fn run(args: &Args) -> Result<i32, Error> {
    let file = SessionFile::load(&args.file)?;
    let (store, options) = file.into_store()?;
    info!("loaded {} sessions from {}", store.len(), args.file.display());

    let invocation = args.invocation(&options);
    let orchestrator = Orchestrator::new(store, Box::new(runner_for(args)));
    let plan = orchestrator.plan(&invocation.criteria)?;

    if args.list {
        let entries = plan.listing();
        if args.json {
            println!("{}", to_json(&entries));
        } else {
            println!("{}", render_listing(&entries));
        }
        return Ok(EXIT_SUCCESS);
    }

    let report = orchestrator.execute(&plan, &invocation);
    if args.json {
        println!("{}", to_json(&report));
    } else {
        println!("{}", report.render());
    }

    if let Some(path) = &args.report {
        if let Err(e) = std::fs::write(path, to_json(&report)) {
            error!("cannot write report to {}: {}", path.display(), e);
            return Ok(EXIT_FAILURE);
        }
    }

    Ok(report.exit_code())
}

/// Shell runner rooted at the session file's directory.
fn runner_for(args: &Args) -> ShellRunner {
    let mut runner = ShellRunner::new();
    if let Some(dir) = args.file.parent().filter(|d| !d.as_os_str().is_empty()) {
        runner = runner.working_dir(dir);
    }
    if args.no_install {
        runner = runner.skip_install();
    }
    runner
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use matrixrun_core::errors::EXIT_USAGE;

    const PROJECT: &str = r#"
sessions:
  - name: ok
    tags: [quick]
    steps:
      - log: fine
  - name: bad
    steps:
      - fail: broken on purpose
  - name: hidden
    default: false
    steps:
      - skip: not today
"#;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sessions.yaml"), PROJECT).unwrap();
        dir
    }

    fn args(dir: &tempfile::TempDir, extra: &[&str]) -> Args {
        let file = dir.path().join("sessions.yaml");
        let mut argv = vec!["mrun".to_string(), "-f".to_string(), file.display().to_string()];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn passing_session_exits_zero() {
        let dir = project();
        assert_eq!(run(&args(&dir, &["-s", "ok"])).unwrap(), EXIT_SUCCESS);
    }

    #[test]
    fn default_run_with_failure_exits_one() {
        let dir = project();
        assert_eq!(run(&args(&dir, &[])).unwrap(), EXIT_FAILURE);
    }

    #[test]
    fn skip_is_neutral_unless_promoted() {
        let dir = project();
        assert_eq!(run(&args(&dir, &["-s", "hidden"])).unwrap(), EXIT_SUCCESS);
        assert_eq!(
            run(&args(&dir, &["-s", "hidden", "--error-on-skip"])).unwrap(),
            EXIT_FAILURE
        );
    }

    #[test]
    fn unknown_session_is_a_usage_error() {
        let dir = project();
        let err = run(&args(&dir, &["-s", "nope"])).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn missing_file_is_a_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&args(&dir, &[])).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn listing_does_not_run() {
        let dir = project();
        assert_eq!(run(&args(&dir, &["-l", "-s", "bad"])).unwrap(), EXIT_SUCCESS);
    }

    #[test]
    fn report_file_is_written() {
        let dir = project();
        let out = dir.path().join("report.json");
        let code = run(&args(
            &dir,
            &["-t", "quick", "--report", out.to_str().unwrap()],
        ))
        .unwrap();
        assert_eq!(code, EXIT_SUCCESS);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["results"][0]["display_id"], "ok");
        assert_eq!(json["results"][0]["status"], "success");
    }

    #[cfg(unix)]
    #[test]
    fn command_output_reaches_the_report() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("sessions.yaml"),
            r#"
sessions:
  - name: echo_args
    steps:
      - run: [echo, "Arguments received:", "{posargs}"]
"#,
        )
        .unwrap();
        let out = dir.path().join("report.json");
        let code = run(&args(
            &dir,
            &["--report", out.to_str().unwrap(), "--", "hello", "world"],
        ))
        .unwrap();
        assert_eq!(code, EXIT_SUCCESS);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(
            json["results"][0]["log"][0],
            "Arguments received: hello world"
        );
    }
}
