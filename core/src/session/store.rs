//! Session store: the registry of declared definitions.
//!
//! Populated once at start-up and read-only afterwards. The store is passed
//! explicitly through expansion, selection and execution; there is no global
//! registry.

use std::collections::HashSet;

use tracing::debug;

use super::expand::expand;
use super::SessionDefinition;
use crate::errors::DefinitionError;

/// Registered session definitions, in registration order.
///
/// Every session name and every instance id is unique across the store, so
/// an explicit selection name never refers to two unrelated instances.
#[derive(Debug, Default)]
pub struct SessionStore {
    definitions: Vec<SessionDefinition>,
    ids: HashSet<String>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore::default()
    }

    /// Register a definition. Names are unique across the store.
    pub fn register(&mut self, definition: SessionDefinition) -> Result<(), DefinitionError> {
        if definition.name.is_empty() {
            return Err(DefinitionError::EmptyName);
        }
        if self.get(&definition.name).is_some() {
            return Err(DefinitionError::DuplicateName(definition.name));
        }

        let mut seen = HashSet::new();
        for axis in &definition.axes {
            if !seen.insert(axis.name.as_str()) {
                return Err(DefinitionError::DuplicateAxis {
                    session: definition.name.clone(),
                    axis: axis.name.clone(),
                });
            }
            if axis.values.is_empty() {
                return Err(DefinitionError::EmptyAxis {
                    session: definition.name.clone(),
                    axis: axis.name.clone(),
                });
            }
        }

        let mut keys = vec![definition.name.clone()];
        for instance in expand(&definition) {
            if instance.display_id != definition.name {
                keys.push(instance.display_id);
            }
        }
        let mut fresh = HashSet::new();
        for key in &keys {
            if self.ids.contains(key) || !fresh.insert(key.as_str()) {
                return Err(DefinitionError::DuplicateId {
                    session: definition.name.clone(),
                    id: key.clone(),
                });
            }
        }

        debug!(session = %definition.name, instances = keys.len(), "registered session");
        self.ids.extend(keys);
        self.definitions.push(definition);
        Ok(())
    }

    /// All definitions in registration order.
    pub fn all(&self) -> &[SessionDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&SessionDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionBody;

    fn def(name: &str) -> SessionDefinition {
        SessionDefinition::new(name, SessionBody::noop())
    }

    #[test]
    fn register_and_get() {
        let mut store = SessionStore::new();
        store.register(def("tests")).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("tests").is_some());
        assert!(store.get("lint").is_none());
    }

    #[test]
    fn register_duplicate_fails() {
        let mut store = SessionStore::new();
        store.register(def("tests")).unwrap();
        let err = store.register(def("tests")).unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateName("tests".into()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn register_empty_name_fails() {
        let mut store = SessionStore::new();
        assert_eq!(store.register(def("")), Err(DefinitionError::EmptyName));
        assert!(store.is_empty());
    }

    #[test]
    fn register_duplicate_axis_fails() {
        let mut store = SessionStore::new();
        let d = def("p").parametrize("x", ["1"]).parametrize("x", ["2"]);
        assert!(matches!(
            store.register(d),
            Err(DefinitionError::DuplicateAxis { .. })
        ));
    }

    #[test]
    fn register_empty_axis_fails() {
        let mut store = SessionStore::new();
        let d = def("p").parametrize("x", Vec::<String>::new());
        assert!(matches!(
            store.register(d),
            Err(DefinitionError::EmptyAxis { .. })
        ));
    }

    #[test]
    fn instance_id_colliding_with_session_name_fails() {
        let mut store = SessionStore::new();
        store.register(def("lint").python(["3.12"])).unwrap();
        assert_eq!(
            store.register(def("lint-3.12")),
            Err(DefinitionError::DuplicateId {
                session: "lint-3.12".into(),
                id: "lint-3.12".into(),
            })
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn session_name_colliding_with_later_instance_id_fails() {
        let mut store = SessionStore::new();
        store.register(def("lint-3.12")).unwrap();
        let err = store.register(def("lint").python(["3.11", "3.12"])).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::DuplicateId {
                session: "lint".into(),
                id: "lint-3.12".into(),
            }
        );
        assert!(store.get("lint").is_none());
    }

    #[test]
    fn repeated_interpreter_fails() {
        let mut store = SessionStore::new();
        let err = store.register(def("tests").python(["3.12", "3.12"])).unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateId { ref id, .. } if id == "tests-3.12"));
    }

    #[test]
    fn failed_registration_reserves_no_ids() {
        let mut store = SessionStore::new();
        store.register(def("a")).unwrap();
        assert!(store.register(def("b").python(["1", "1"])).is_err());
        assert!(store.register(def("b").python(["1"])).is_ok());
    }

    #[test]
    fn all_preserves_registration_order() {
        let mut store = SessionStore::new();
        for name in ["tests", "lint", "docs", "a_first_alphabetically"] {
            store.register(def(name)).unwrap();
        }
        let names: Vec<&str> = store.all().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["tests", "lint", "docs", "a_first_alphabetically"]);
    }
}
