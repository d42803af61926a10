//! The handle a session body receives while it runs.
//!
//! `Session` exposes the instance's resolved binding (interpreter, parameters,
//! positional arguments) and the operations a body may perform through the
//! runner. Outcomes are explicit: a body returns `Err(Signal::Skip(..))` or
//! `Err(Signal::Fail(..))` instead of unwinding.

use std::fmt;

use tracing::{debug, info};

use super::runner::{Environment, Runner};
use crate::session::{Params, SessionInstance};

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// A non-success outcome signalled by a session body.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The body voluntarily stopped; not an error.
    Skip(String),
    /// The body failed (non-zero command, explicit error).
    Fail(String),
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Skip(reason) => write!(f, "skipped: {}", reason),
            Signal::Fail(message) => write!(f, "failed: {}", message),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Execution context of one running instance.
pub struct Session<'a> {
    instance: &'a SessionInstance,
    posargs: &'a [String],
    runner: &'a dyn Runner,
    env: &'a Environment,
    log: Vec<String>,
}

impl<'a> Session<'a> {
    pub fn new(
        instance: &'a SessionInstance,
        posargs: &'a [String],
        runner: &'a dyn Runner,
        env: &'a Environment,
    ) -> Self {
        Session {
            instance,
            posargs,
            runner,
            env,
            log: Vec::new(),
        }
    }

    /// Definition name of the running instance.
    pub fn name(&self) -> &str {
        &self.instance.definition_name
    }

    /// Display id of the running instance.
    pub fn id(&self) -> &str {
        &self.instance.display_id
    }

    pub fn interpreter(&self) -> Option<&str> {
        self.instance.interpreter.as_deref()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.instance.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &Params {
        &self.instance.params
    }

    /// Positional arguments, verbatim and in invocation order.
    pub fn posargs(&self) -> &[String] {
        self.posargs
    }

    /// Emit a log line attributed to this instance.
    pub fn log(&mut self, message: &str) {
        info!(session = %self.instance.display_id, "{}", message);
        self.log.push(message.to_string());
    }

    /// Run a command in the instance's environment, returning its stdout.
    /// Each stdout line is also logged against the instance.
    pub fn run<I, S>(&mut self, argv: I) -> Result<String, Signal>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() {
            return Err(Signal::Fail("run: empty command".into()));
        }
        debug!(session = %self.instance.display_id, command = %argv.join(" "), "run");
        let stdout = self
            .runner
            .run(self.env, &argv)
            .map_err(|e| Signal::Fail(format!("command '{}' failed: {}", argv.join(" "), e)))?;
        for line in stdout.trim_end().lines() {
            self.log(line);
        }
        Ok(stdout)
    }

    /// Install packages into the instance's environment.
    pub fn install<I, S>(&mut self, packages: I) -> Result<(), Signal>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let packages: Vec<String> = packages.into_iter().map(Into::into).collect();
        if packages.is_empty() {
            return Ok(());
        }
        debug!(session = %self.instance.display_id, packages = %packages.join(" "), "install");
        self.runner
            .install(self.env, &packages)
            .map_err(|e| Signal::Fail(format!("install of {} failed: {}", packages.join(" "), e)))
    }

    /// Build a skip signal: `return Err(session.skip("why"))`.
    pub fn skip(&self, reason: &str) -> Signal {
        Signal::Skip(reason.to_string())
    }

    /// Build a failure signal: `return Err(session.error("why"))`.
    pub fn error(&self, message: &str) -> Signal {
        Signal::Fail(message.to_string())
    }

    /// Lines logged so far.
    pub fn log_lines(&self) -> &[String] {
        &self.log
    }

    pub(crate) fn into_log(self) -> Vec<String> {
        self.log
    }
}
