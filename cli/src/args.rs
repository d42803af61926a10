//! Command-line arguments and their translation into an `Invocation`.

use std::path::PathBuf;

use clap::Parser;

use matrixrun_core::config::{FileOptions, DEFAULT_SESSION_FILE};
use matrixrun_core::report::ReportPolicy;
use matrixrun_core::{Criteria, EngineOptions, Invocation};

#[derive(Parser, Debug)]
#[command(name = "mrun")]
#[command(about = "Run declared sessions across interpreter and parameter matrices")]
pub struct Args {
    /// Session file to load
    #[arg(short = 'f', long = "file", env = "MRUN_SESSIONS_FILE", default_value = DEFAULT_SESSION_FILE)]
    pub file: PathBuf,

    /// Sessions to run, by name or display id (repeatable, comma separated)
    #[arg(short = 's', long = "session", alias = "sessions", value_delimiter = ',')]
    pub sessions: Vec<String>,

    /// Run sessions carrying any of these tags
    #[arg(short = 't', long = "tag", alias = "tags", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Only run instances for these interpreter versions
    #[arg(short = 'p', long = "python", value_delimiter = ',')]
    pub python: Vec<String>,

    /// Let tag selection include sessions marked `default: false`
    #[arg(long)]
    pub include_non_default: bool,

    /// Stop starting sessions after the first failure
    #[arg(short = 'x', long = "stop-on-first-error", alias = "fail-fast")]
    pub fail_fast: bool,

    /// Number of sessions to run concurrently
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// List sessions and exit
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Print the listing or the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Write the JSON report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Skip package installs
    #[arg(long)]
    pub no_install: bool,

    /// Leave skipped sessions out of the report
    #[arg(long)]
    pub omit_skipped: bool,

    /// Treat skipped sessions as failures
    #[arg(long)]
    pub error_on_skip: bool,

    /// Debug logging
    #[arg(short = 'v', long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Arguments after `--`, passed to sessions unchanged
    #[arg(last = true)]
    pub posargs: Vec<String>,
}

impl Args {
    /// Merge the command line with the session file's options. The command
    /// line wins; file `sessions` apply only when neither names nor tags
    /// were given.
    pub fn invocation(&self, options: &FileOptions) -> Invocation {
        let mut criteria = Criteria {
            names: self.sessions.clone(),
            tags: self.tags.clone(),
            include_non_default: self.include_non_default,
            interpreters: self.python.clone(),
        };
        if !criteria.is_explicit() {
            criteria.names = options.sessions.clone();
        }

        Invocation {
            criteria,
            posargs: self.posargs.clone(),
            engine: EngineOptions {
                fail_fast: self.fail_fast || options.fail_fast,
                jobs: self.jobs.or(options.jobs).unwrap_or(1).max(1),
            },
            report: ReportPolicy {
                omit_skipped: self.omit_skipped,
                skipped_is_failure: self.error_on_skip,
            },
        }
    }

    /// Default log filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}
