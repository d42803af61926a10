//! Selector: narrows the expanded instance set to the run-set.
//!
//! Policy, evaluated per instance in expander order:
//!
//! 1. Explicit names given: match on definition name or display id. Default
//!    and tag filtering are bypassed.
//! 2. Else tags given: match when the instance carries any requested tag and
//!    is a default session (or non-default sessions are included).
//! 3. Else: match default sessions.
//!
//! An interpreter filter, when present, is applied after the policy.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::SessionInstance;
use crate::errors::SelectionError;

/// Invoker-supplied selection criteria.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Criteria {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub include_non_default: bool,
    /// Keep only instances with one of these interpreters. Empty disables.
    #[serde(default)]
    pub interpreters: Vec<String>,
}

impl Criteria {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Criteria {
            names: names.into_iter().map(Into::into).collect(),
            ..Criteria::default()
        }
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Criteria {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Criteria::default()
        }
    }

    /// Whether the invoker asked for anything beyond the default set.
    pub fn is_explicit(&self) -> bool {
        !self.names.is_empty() || !self.tags.is_empty()
    }
}

/// Filter `instances` down to the run-set, preserving their order.
///
/// Fails before anything runs if an explicit name matches no instance.
pub fn select(
    instances: &[SessionInstance],
    criteria: &Criteria,
) -> Result<Vec<SessionInstance>, SelectionError> {
    if !criteria.names.is_empty() {
        let unknown: Vec<String> = criteria
            .names
            .iter()
            .filter(|name| !instances.iter().any(|i| matches_name(i, name)))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(SelectionError::UnknownSession(unknown));
        }
    }

    let tags: BTreeSet<String> = criteria.tags.iter().cloned().collect();

    let selected = instances
        .iter()
        .filter(|inst| {
            if !criteria.names.is_empty() {
                criteria.names.iter().any(|name| matches_name(inst, name))
            } else if !tags.is_empty() {
                inst.has_any_tag(&tags) && (inst.is_default || criteria.include_non_default)
            } else {
                inst.is_default
            }
        })
        .filter(|inst| {
            criteria.interpreters.is_empty()
                || inst
                    .interpreter
                    .as_ref()
                    .is_some_and(|p| criteria.interpreters.contains(p))
        })
        .cloned()
        .collect();

    Ok(selected)
}

fn matches_name(instance: &SessionInstance, name: &str) -> bool {
    instance.definition_name == name || instance.display_id == name
}
