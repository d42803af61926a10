//! Declarative session steps and the bodies built from them.
//!
//! A step is one action (`install`, `run`, `log`, `skip`, `fail`) with an
//! optional `when` condition on the positional arguments. Arguments are
//! templated: `{posargs}` as a whole argument expands to the positional
//! arguments, `{python}` and `{<axis>}` are substituted in place.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::execution::context::{Session, Signal};
use crate::session::SessionBody;

/// Argument that expands to every positional argument.
const POSARGS_TOKEN: &str = "{posargs}";

// ---------------------------------------------------------------------------
// StepCondition
// ---------------------------------------------------------------------------

/// Condition that decides whether a step executes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StepCondition {
    #[default]
    Always,
    /// Only when positional arguments were given.
    Posargs,
    /// Only when no positional arguments were given.
    NoPosargs,
}

impl StepCondition {
    pub fn evaluate(&self, posargs: &[String]) -> bool {
        match self {
            StepCondition::Always => true,
            StepCondition::Posargs => !posargs.is_empty(),
            StepCondition::NoPosargs => posargs.is_empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// StepAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Install(Vec<String>),
    Run(Vec<String>),
    Log(String),
    Skip(String),
    Fail(String),
}

// ---------------------------------------------------------------------------
// StepSpec
// ---------------------------------------------------------------------------

/// One step of a session, as written in the session file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepSpec {
    #[serde(flatten)]
    pub action: StepAction,
    #[serde(default)]
    pub when: StepCondition,
}

impl StepSpec {
    pub fn new(action: StepAction) -> Self {
        StepSpec {
            action,
            when: StepCondition::Always,
        }
    }

    fn validate(&self, session: &str, index: usize) -> Result<(), ConfigError> {
        let reason = match &self.action {
            StepAction::Run(argv) if argv.is_empty() => Some("run needs a command"),
            StepAction::Run(argv) if argv[0] == POSARGS_TOKEN => {
                Some("run command must not start with {posargs}")
            }
            StepAction::Install(pkgs) if pkgs.is_empty() => Some("install needs packages"),
            _ => None,
        };
        match reason {
            Some(reason) => Err(ConfigError::InvalidStep {
                session: session.to_string(),
                index,
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn execute(&self, session: &mut Session<'_>) -> Result<(), Signal> {
        if !self.when.evaluate(session.posargs()) {
            return Ok(());
        }
        match &self.action {
            StepAction::Install(packages) => {
                let packages = expand_args(packages, session);
                session.install(packages)
            }
            StepAction::Run(argv) => {
                let argv = expand_args(argv, session);
                session.run(argv).map(|_| ())
            }
            StepAction::Log(message) => {
                let message = substitute(message, session);
                session.log(&message);
                Ok(())
            }
            StepAction::Skip(reason) => Err(session.skip(&substitute(reason, session))),
            StepAction::Fail(message) => Err(session.error(&substitute(message, session))),
        }
    }
}

/// Build a session body that executes `steps` in order, stopping at the
/// first skip or failure. Steps are validated up front.
pub fn body_from_steps(session: &str, steps: Vec<StepSpec>) -> Result<SessionBody, ConfigError> {
    for (index, step) in steps.iter().enumerate() {
        step.validate(session, index)?;
    }
    Ok(SessionBody::new(move |s| {
        for step in &steps {
            step.execute(s)?;
        }
        Ok(())
    }))
}

/// Expand `{posargs}` arguments and substitute placeholders in the rest.
pub fn expand_args(args: &[String], session: &Session<'_>) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        if arg == POSARGS_TOKEN {
            out.extend(session.posargs().iter().cloned());
        } else {
            out.push(substitute(arg, session));
        }
    }
    out
}

/// Replace `{python}` and `{<axis>}` placeholders in one pass over `text`.
/// Substituted values are never rescanned. Unknown placeholders are left
/// untouched.
pub fn substitute(text: &str, session: &Session<'_>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        if key.contains('{') {
            out.push('{');
            rest = after;
            continue;
        }
        match placeholder_value(key, session) {
            Some(value) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn placeholder_value<'s>(key: &str, session: &'s Session<'_>) -> Option<&'s str> {
    if key == "python" {
        return Some(session.interpreter().unwrap_or(""));
    }
    session.param(key)
}
