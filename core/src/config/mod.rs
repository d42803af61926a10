//! Session file: the declarative registration surface.
//!
//! A YAML file (conventionally `sessions.yaml`) declares sessions and run
//! options. Loading it produces a populated `SessionStore` plus the options
//! that act as defaults for the command line.

pub mod steps;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, Error};
use crate::session::store::SessionStore;
use crate::session::{Axis, SessionDefinition};
use steps::{body_from_steps, StepSpec};

/// File name looked up in the working directory when none is given.
pub const DEFAULT_SESSION_FILE: &str = "sessions.yaml";

// ---------------------------------------------------------------------------
// Scalar
// ---------------------------------------------------------------------------

/// A YAML scalar used as an interpreter version or axis value.
///
/// Decimals are refused: YAML reads `3.10` as the float `3.1`, so the text
/// the user wrote cannot be recovered. Strings, integers and booleans keep
/// their textual form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => f.write_str(s),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Either a single scalar or a list of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl Scalar {
    fn to_text(&self, session: &str, field: &str) -> Result<String, ConfigError> {
        match self {
            Scalar::Float(_) => Err(ConfigError::UnquotedNumber {
                session: session.to_string(),
                field: field.to_string(),
                value: self.to_string(),
            }),
            other => Ok(other.to_string()),
        }
    }
}

impl OneOrMany {
    fn into_vec(self) -> Vec<Scalar> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

fn texts(scalars: &[Scalar], session: &str, field: &str) -> Result<Vec<String>, ConfigError> {
    scalars.iter().map(|s| s.to_text(session, field)).collect()
}

// ---------------------------------------------------------------------------
// File schema
// ---------------------------------------------------------------------------

/// Run options declared in the session file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileOptions {
    /// Sessions to run when the invoker names neither sessions nor tags.
    #[serde(default)]
    pub sessions: Vec<String>,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub jobs: Option<usize>,
}

/// One parametrize axis as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AxisSpec {
    pub name: String,
    pub values: Vec<Scalar>,
}

fn default_true() -> bool {
    true
}

/// One session as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub python: Option<OneOrMany>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub default: bool,
    #[serde(default)]
    pub parametrize: Vec<AxisSpec>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl SessionSpec {
    fn into_definition(self) -> Result<SessionDefinition, ConfigError> {
        let python = self.python.map(OneOrMany::into_vec).unwrap_or_default();
        let python = texts(&python, &self.name, "python")?;
        let mut axes = Vec::with_capacity(self.parametrize.len());
        for axis in &self.parametrize {
            axes.push(Axis::new(&axis.name, texts(&axis.values, &self.name, &axis.name)?));
        }

        let body = body_from_steps(&self.name, self.steps)?;
        let mut def = SessionDefinition::new(&self.name, body)
            .python(python)
            .tags(self.tags)
            .default(self.default);
        def.axes = axes;
        def.description = self.description;
        Ok(def)
    }
}

/// Top-level session file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionFile {
    #[serde(default)]
    pub options: FileOptions,
    #[serde(default)]
    pub sessions: Vec<SessionSpec>,
}

impl SessionFile {
    /// Load a session file from disk.
    pub fn load(path: &Path) -> Result<SessionFile, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        SessionFile::parse(&content)
    }

    /// Parse a session file from a YAML string.
    pub fn parse(content: &str) -> Result<SessionFile, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Register every declared session, in file order.
    pub fn into_store(self) -> Result<(SessionStore, FileOptions), Error> {
        let mut store = SessionStore::new();
        for spec in self.sessions {
            store.register(spec.into_definition()?)?;
        }
        Ok((store, self.options))
    }
}

/// The sample project used across the crate's tests.
#[cfg(test)]
pub(crate) const SAMPLE_SESSIONS: &str = r#"
options:
  sessions: [tests, lint]

sessions:
  - name: tests
    python: ["3.11", "3.12", "3.13"]
    tags: [test, ci]
    steps:
      - install: [pytest]
      - run: [pytest, test_main.py]

  - name: lint
    tags: [quality, ci]
    steps:
      - install: [ruff]
      - run: [ruff, check, main.py]

  - name: always_fail
    description: This session always fails for testing error handling.
    python: ["3.11", "3.12", "3.13"]
    tags: [test]
    steps:
      - log: This session is designed to fail
      - fail: exit status 1

  - name: always_skip
    tags: [demo]
    steps:
      - skip: This session is intentionally skipped for demonstration purposes

  - name: test_parametrize
    python: ["3.11", "3.12", "3.13"]
    tags: [test, matrix]
    parametrize:
      - name: param1
        values: [value1, value2]
      - name: param2
        values: [optionA, optionB]
    steps:
      - run: [echo, "Python: {python}, Param1: {param1}, Param2: {param2}"]

  - name: non_default_session
    default: false
    steps:
      - log: This is a non-default session that won't run unless specified.
      - run: [echo, Non-default session executed]

  - name: echo_args
    tags: [demo]
    steps:
      - run: [echo, "Arguments received:", "{posargs}"]
        when: posargs
      - run: [echo, "No arguments - try running with: mrun -s echo_args -- hello world"]
        when: no_posargs

  - name: docs
    tags: [docs]
    steps:
      - install: [sphinx, sphinx-rtd-theme]
      - log: Building documentation...
      - run: [echo, Documentation build would run here]
"#;

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::errors::DefinitionError;
    use crate::session::expand::expand_all;

    #[test]
    fn parse_full_file() {
        let file = SessionFile::parse(SAMPLE_SESSIONS).unwrap();
        assert_eq!(file.options.sessions, vec!["tests", "lint"]);
        assert_eq!(file.sessions.len(), 8);
        assert_eq!(file.sessions[4].parametrize.len(), 2);
        assert!(!file.sessions[5].default);
        assert!(file.sessions[0].default);
    }

    #[test]
    fn into_store_registers_in_order() {
        let (store, options) = SessionFile::parse(SAMPLE_SESSIONS).unwrap().into_store().unwrap();
        let names: Vec<&str> = store.all().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "tests",
                "lint",
                "always_fail",
                "always_skip",
                "test_parametrize",
                "non_default_session",
                "echo_args",
                "docs"
            ]
        );
        assert!(!options.fail_fast);
        assert_eq!(options.jobs, None);
        assert_eq!(expand_all(&store).len(), 3 + 1 + 3 + 1 + 12 + 1 + 1 + 1);
    }

    #[test]
    fn parse_minimal_file() {
        let file = SessionFile::parse("sessions:\n  - name: lint\n").unwrap();
        assert_eq!(file.options, FileOptions::default());
        assert!(file.sessions[0].steps.is_empty());
        assert!(file.sessions[0].default);
    }

    #[test]
    fn python_scalar_and_numbers() {
        let yaml = r#"
sessions:
  - name: one
    python: "3.12"
  - name: nums
    python: ["3.10", 3]
    parametrize:
      - name: n
        values: [1, true, x]
"#;
        let (store, _) = SessionFile::parse(yaml).unwrap().into_store().unwrap();
        assert_eq!(store.get("one").unwrap().interpreters, vec!["3.12"]);
        assert_eq!(store.get("nums").unwrap().interpreters, vec!["3.10", "3"]);
        assert_eq!(
            store.get("nums").unwrap().axes[0].values,
            vec!["1", "true", "x"]
        );
    }

    #[test]
    fn unquoted_decimal_python_is_rejected() {
        let yaml = "sessions:\n  - name: t\n    python: [3.10, 3.11]\n";
        let err = SessionFile::parse(yaml).unwrap().into_store().unwrap_err();
        match err {
            Error::Config(ConfigError::UnquotedNumber {
                session,
                field,
                value,
            }) => {
                assert_eq!(session, "t");
                assert_eq!(field, "python");
                assert_eq!(value, "3.1");
            }
            other => panic!("expected UnquotedNumber, got {:?}", other),
        }
    }

    #[test]
    fn unquoted_decimal_axis_value_is_rejected() {
        let yaml = r#"
sessions:
  - name: t
    parametrize:
      - name: ratio
        values: [0.5]
"#;
        let err = SessionFile::parse(yaml).unwrap().into_store().unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnquotedNumber { ref field, .. }) if field == "ratio"
        ));
    }

    #[test]
    fn duplicate_session_in_file_fails() {
        let yaml = "sessions:\n  - name: a\n  - name: a\n";
        let err = SessionFile::parse(yaml).unwrap().into_store().unwrap_err();
        assert!(matches!(
            err,
            Error::Definition(DefinitionError::DuplicateName(ref n)) if n == "a"
        ));
    }

    #[test]
    fn invalid_step_in_file_fails() {
        let yaml = "sessions:\n  - name: a\n    steps:\n      - run: []\n";
        let err = SessionFile::parse(yaml).unwrap().into_store().unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidStep { .. })));
    }

    #[test]
    fn parse_missing_name_fails() {
        let result = SessionFile::parse("sessions:\n  - tags: [x]\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn unknown_step_kind_fails() {
        let result = SessionFile::parse("sessions:\n  - name: a\n    steps:\n      - explode: now\n");
        assert!(result.is_err());
    }

    #[test]
    fn load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_SESSIONS.as_bytes()).unwrap();
        let loaded = SessionFile::load(file.path()).unwrap();
        assert_eq!(loaded.sessions.len(), 8);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = SessionFile::load(&dir.path().join(DEFAULT_SESSION_FILE)).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
