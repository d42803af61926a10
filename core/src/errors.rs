use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

/// Process exit code when every selected instance succeeded (or skipped).
pub const EXIT_SUCCESS: i32 = 0;
/// Process exit code when at least one selected instance failed.
pub const EXIT_FAILURE: i32 = 1;
/// Process exit code for invocation mistakes caught before anything runs.
pub const EXIT_USAGE: i32 = 2;

// ---------------------------------------------------------------------------
// Definition errors
// ---------------------------------------------------------------------------

/// Raised while registering session definitions into a store.
#[derive(Debug, Error, PartialEq)]
pub enum DefinitionError {
    /// A session with this name is already registered.
    #[error("session '{0}' is already defined")]
    DuplicateName(String),
    /// Session names must be non-empty.
    #[error("session name must not be empty")]
    EmptyName,
    /// Two parametrize axes of one session share a name.
    #[error("session '{session}' declares axis '{axis}' more than once")]
    DuplicateAxis { session: String, axis: String },
    /// An instance id or session name of this definition is already taken
    /// by another session's name or instance id.
    #[error("session '{session}' would reuse the id '{id}'")]
    DuplicateId { session: String, id: String },
    /// An axis with no values would expand to zero instances.
    #[error("session '{session}' axis '{axis}' has no values")]
    EmptyAxis { session: String, axis: String },
}

// ---------------------------------------------------------------------------
// Selection errors
// ---------------------------------------------------------------------------

/// Raised by the selector before any instance is executed.
#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    /// One or more explicitly requested names matched nothing.
    #[error("unknown session(s): {}", .0.join(", "))]
    UnknownSession(Vec<String>),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Raised while reading a session file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The session file could not be read.
    #[error("cannot read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The session file is not valid YAML for the expected schema.
    #[error("invalid session file: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// An unquoted decimal such as `3.10` loses its text when parsed as YAML.
    #[error("session '{session}': {field} value {value} was read as a decimal; quote it to keep the text as written")]
    UnquotedNumber {
        session: String,
        field: String,
        value: String,
    },
    /// A step is well-formed YAML but cannot be executed.
    #[error("session '{session}': invalid step {index}: {reason}")]
    InvalidStep {
        session: String,
        index: usize,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Any error that aborts a run before execution begins.
///
/// Execution failures are never represented here; they are recorded as
/// `Failed` results in the report.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Exit code the CLI should use for this error.
    pub fn exit_code(&self) -> i32 {
        EXIT_USAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_session_lists_all_names() {
        let err = SelectionError::UnknownSession(vec!["nope".into(), "gone".into()]);
        assert_eq!(err.to_string(), "unknown session(s): nope, gone");
    }

    #[test]
    fn definition_errors_display() {
        assert_eq!(
            DefinitionError::DuplicateName("tests".into()).to_string(),
            "session 'tests' is already defined"
        );
        let err = DefinitionError::EmptyAxis {
            session: "t".into(),
            axis: "p".into(),
        };
        assert!(err.to_string().contains("axis 'p' has no values"));
    }

    #[test]
    fn pre_execution_errors_use_usage_exit_code() {
        let err: Error = DefinitionError::EmptyName.into();
        assert_eq!(err.exit_code(), EXIT_USAGE);
        let err: Error = SelectionError::UnknownSession(vec!["x".into()]).into();
        assert_eq!(err.exit_code(), EXIT_USAGE);
        assert_ne!(EXIT_USAGE, EXIT_FAILURE);
    }

    #[test]
    fn config_io_error_names_path() {
        let err = ConfigError::Io {
            path: PathBuf::from("/nowhere/sessions.yaml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/nowhere/sessions.yaml"));
    }

    #[test]
    fn unquoted_number_asks_for_quotes() {
        let err = ConfigError::UnquotedNumber {
            session: "tests".into(),
            field: "python".into(),
            value: "3.1".into(),
        };
        assert_eq!(
            err.to_string(),
            "session 'tests': python value 3.1 was read as a decimal; quote it to keep the text as written"
        );
    }
}
