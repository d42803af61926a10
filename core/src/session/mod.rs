//! Session model: declared definitions and their concrete instances.
//!
//! A `SessionDefinition` is a named template (interpreter matrix, parametrize
//! axes, tags, default flag, body). The expander turns each definition into
//! `SessionInstance`s; the selector filters them. Neither type is mutated
//! after it is built.

pub mod expand;
pub mod select;
pub mod store;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::execution::context::{Session, Signal};

/// Resolved parameter binding of one instance, in axis declaration order.
pub type Params = IndexMap<String, String>;

/// Separator between the segments of a display id.
pub const ID_DELIMITER: char = '-';

// ---------------------------------------------------------------------------
// Axis
// ---------------------------------------------------------------------------

/// One parametrize dimension: a name and its ordered values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Axis {
    pub name: String,
    pub values: Vec<String>,
}

impl Axis {
    pub fn new<I, S>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Axis {
            name: name.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionBody
// ---------------------------------------------------------------------------

type BodyFn = dyn Fn(&mut Session<'_>) -> Result<(), Signal> + Send + Sync;

/// The work a session performs. Shared by every instance of a definition.
#[derive(Clone)]
pub struct SessionBody(Arc<BodyFn>);

impl SessionBody {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Session<'_>) -> Result<(), Signal> + Send + Sync + 'static,
    {
        SessionBody(Arc::new(f))
    }

    /// A body that does nothing and succeeds.
    pub fn noop() -> Self {
        SessionBody::new(|_| Ok(()))
    }

    pub fn call(&self, session: &mut Session<'_>) -> Result<(), Signal> {
        (self.0)(session)
    }
}

impl fmt::Debug for SessionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionBody(..)")
    }
}

// ---------------------------------------------------------------------------
// SessionDefinition
// ---------------------------------------------------------------------------

/// A named, possibly parametrized unit of declared work.
#[derive(Debug, Clone)]
pub struct SessionDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Interpreter versions; empty means no matrix axis.
    pub interpreters: Vec<String>,
    pub tags: BTreeSet<String>,
    /// Parametrize axes in declaration order.
    pub axes: Vec<Axis>,
    pub is_default: bool,
    pub body: SessionBody,
}

impl SessionDefinition {
    /// A default session with no matrix, no axes and no tags.
    pub fn new(name: &str, body: SessionBody) -> Self {
        SessionDefinition {
            name: name.to_string(),
            description: None,
            interpreters: Vec::new(),
            tags: BTreeSet::new(),
            axes: Vec::new(),
            is_default: true,
            body,
        }
    }

    pub fn python<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interpreters = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Append an axis. Later axes vary faster during expansion.
    pub fn parametrize<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.axes.push(Axis::new(name, values));
        self
    }

    pub fn default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// SessionInstance
// ---------------------------------------------------------------------------

/// One concrete expansion of a definition: fixed interpreter and parameters.
#[derive(Debug, Clone)]
pub struct SessionInstance {
    pub definition_name: String,
    pub interpreter: Option<String>,
    pub params: Params,
    /// Stable identifier used for reporting and re-invocation.
    pub display_id: String,
    pub tags: BTreeSet<String>,
    pub is_default: bool,
    pub description: Option<String>,
    pub body: SessionBody,
}

impl SessionInstance {
    pub fn has_any_tag(&self, tags: &BTreeSet<String>) -> bool {
        !self.tags.is_disjoint(tags)
    }
}

/// Build the display id for a definition name, interpreter and parameters.
///
/// `name`, then the interpreter tag, then one `axis=value` segment per axis,
/// joined by [`ID_DELIMITER`].
pub fn display_id(name: &str, interpreter: Option<&str>, params: &Params) -> String {
    let mut id = name.to_string();
    if let Some(python) = interpreter {
        id.push(ID_DELIMITER);
        id.push_str(python);
    }
    for (axis, value) in params {
        id.push(ID_DELIMITER);
        id.push_str(axis);
        id.push('=');
        id.push_str(value);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_builder_defaults() {
        let def = SessionDefinition::new("lint", SessionBody::noop());
        assert_eq!(def.name, "lint");
        assert!(def.is_default);
        assert!(def.interpreters.is_empty());
        assert!(def.axes.is_empty());
        assert!(def.tags.is_empty());
    }

    #[test]
    fn definition_builder_chain() {
        let def = SessionDefinition::new("tests", SessionBody::noop())
            .python(["3.11", "3.12"])
            .tags(["test", "ci"])
            .parametrize("db", ["pg", "sqlite"])
            .default(false)
            .description("Run the suite.");
        assert_eq!(def.interpreters, vec!["3.11", "3.12"]);
        assert!(def.tags.contains("ci"));
        assert_eq!(def.axes, vec![Axis::new("db", ["pg", "sqlite"])]);
        assert!(!def.is_default);
        assert_eq!(def.description.as_deref(), Some("Run the suite."));
    }

    #[test]
    fn display_id_plain_name() {
        assert_eq!(display_id("lint", None, &Params::new()), "lint");
    }

    #[test]
    fn display_id_with_interpreter_and_params() {
        let mut params = Params::new();
        params.insert("param1".into(), "value1".into());
        params.insert("param2".into(), "optionA".into());
        assert_eq!(
            display_id("test_parametrize", Some("3.11"), &params),
            "test_parametrize-3.11-param1=value1-param2=optionA"
        );
    }

    #[test]
    fn axis_serde_round_trip() {
        let axis = Axis::new("param1", ["value1", "value2"]);
        let json = serde_json::to_string(&axis).unwrap();
        let back: Axis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, axis);
    }
}
