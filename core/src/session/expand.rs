//! Parametrization expander.
//!
//! The interpreter list is an implicit leading axis (a single `None` value
//! when the list is empty). The Cartesian product runs over all axes in
//! declaration order: the interpreter varies slowest, the last declared axis
//! varies fastest. Expansion is pure and total over registered definitions.

use tracing::debug;

use super::store::SessionStore;
use super::{display_id, Params, SessionDefinition, SessionInstance};

/// Expand one definition into its instances, in matrix order.
pub fn expand(definition: &SessionDefinition) -> Vec<SessionInstance> {
    let interpreters: Vec<Option<&str>> = if definition.interpreters.is_empty() {
        vec![None]
    } else {
        definition.interpreters.iter().map(|p| Some(p.as_str())).collect()
    };

    let combinations = param_product(definition);
    let mut instances = Vec::with_capacity(interpreters.len() * combinations.len());

    for interpreter in &interpreters {
        for params in &combinations {
            instances.push(SessionInstance {
                definition_name: definition.name.clone(),
                interpreter: interpreter.map(str::to_string),
                params: params.clone(),
                display_id: display_id(&definition.name, *interpreter, params),
                tags: definition.tags.clone(),
                is_default: definition.is_default,
                description: definition.description.clone(),
                body: definition.body.clone(),
            });
        }
    }

    debug!(
        session = %definition.name,
        instances = instances.len(),
        "expanded session"
    );
    instances
}

/// Expand every definition of the store, in registration order.
pub fn expand_all(store: &SessionStore) -> Vec<SessionInstance> {
    store.all().iter().flat_map(expand).collect()
}

/// Cartesian product of the parametrize axes, last axis fastest.
///
/// No axes yields a single empty binding.
fn param_product(definition: &SessionDefinition) -> Vec<Params> {
    let mut product = vec![Params::new()];
    for axis in &definition.axes {
        let mut next = Vec::with_capacity(product.len() * axis.values.len());
        for prefix in &product {
            for value in &axis.values {
                let mut params = prefix.clone();
                params.insert(axis.name.clone(), value.clone());
                next.push(params);
            }
        }
        product = next;
    }
    product
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::session::SessionBody;

    fn matrix_def() -> SessionDefinition {
        SessionDefinition::new("test_parametrize", SessionBody::noop())
            .python(["3.11", "3.12", "3.13"])
            .tags(["test", "matrix"])
            .parametrize("param1", ["value1", "value2"])
            .parametrize("param2", ["optionA", "optionB"])
    }

    #[test]
    fn no_axes_no_interpreters_yields_one_instance() {
        let def = SessionDefinition::new("lint", SessionBody::noop());
        let instances = expand(&def);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].interpreter, None);
        assert!(instances[0].params.is_empty());
        assert_eq!(instances[0].display_id, "lint");
    }

    #[test]
    fn interpreter_only_matrix() {
        let def = SessionDefinition::new("tests", SessionBody::noop()).python(["3.11", "3.12"]);
        let ids: Vec<String> = expand(&def).into_iter().map(|i| i.display_id).collect();
        assert_eq!(ids, vec!["tests-3.11", "tests-3.12"]);
    }

    #[test]
    fn full_matrix_count_and_order() {
        let instances = expand(&matrix_def());
        assert_eq!(instances.len(), 3 * 2 * 2);

        let ids: Vec<&str> = instances.iter().map(|i| i.display_id.as_str()).collect();
        assert_eq!(
            &ids[..4],
            &[
                "test_parametrize-3.11-param1=value1-param2=optionA",
                "test_parametrize-3.11-param1=value1-param2=optionB",
                "test_parametrize-3.11-param1=value2-param2=optionA",
                "test_parametrize-3.11-param1=value2-param2=optionB",
            ]
        );
        assert_eq!(ids[4], "test_parametrize-3.12-param1=value1-param2=optionA");
        assert_eq!(ids[11], "test_parametrize-3.13-param1=value2-param2=optionB");
    }

    #[test]
    fn ids_derivable_from_axis_values() {
        let def = matrix_def();
        let instances = expand(&def);
        let mut expected = Vec::new();
        for py in &def.interpreters {
            for p1 in &def.axes[0].values {
                for p2 in &def.axes[1].values {
                    expected.push(format!("test_parametrize-{py}-param1={p1}-param2={p2}"));
                }
            }
        }
        let ids: Vec<String> = instances.into_iter().map(|i| i.display_id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn bindings_are_unique() {
        let instances = expand(&matrix_def());
        let tuples: HashSet<(Option<String>, Vec<(String, String)>)> = instances
            .iter()
            .map(|i| {
                (
                    i.interpreter.clone(),
                    i.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                )
            })
            .collect();
        assert_eq!(tuples.len(), instances.len());
    }

    #[test]
    fn count_matches_product_for_various_shapes() {
        let shapes: Vec<(usize, Vec<usize>)> = vec![
            (0, vec![]),
            (0, vec![3]),
            (2, vec![]),
            (1, vec![2, 3]),
            (4, vec![1, 2, 5]),
        ];
        for (interpreters, axes) in shapes {
            let mut def = SessionDefinition::new("s", SessionBody::noop())
                .python((0..interpreters).map(|i| format!("3.{}", i)));
            for (n, size) in axes.iter().enumerate() {
                def = def.parametrize(&format!("a{}", n), (0..*size).map(|v| v.to_string()));
            }
            let expected = interpreters.max(1) * axes.iter().product::<usize>();
            assert_eq!(expand(&def).len(), expected, "shape {:?}", (interpreters, &axes));
        }
    }

    #[test]
    fn expansion_is_reproducible() {
        let def = matrix_def();
        let a: Vec<String> = expand(&def).into_iter().map(|i| i.display_id).collect();
        let b: Vec<String> = expand(&def).into_iter().map(|i| i.display_id).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn instances_inherit_tags_and_default() {
        let def = matrix_def().default(false);
        for inst in expand(&def) {
            assert!(inst.tags.contains("matrix"));
            assert!(!inst.is_default);
            assert_eq!(inst.definition_name, "test_parametrize");
            assert_eq!(inst.params.keys().collect::<Vec<_>>(), vec!["param1", "param2"]);
        }
    }

    #[test]
    fn expand_all_follows_registration_order() {
        let mut store = SessionStore::new();
        store
            .register(SessionDefinition::new("b", SessionBody::noop()).python(["3.12"]))
            .unwrap();
        store.register(SessionDefinition::new("a", SessionBody::noop())).unwrap();
        let ids: Vec<String> = expand_all(&store).into_iter().map(|i| i.display_id).collect();
        assert_eq!(ids, vec!["b-3.12", "a"]);
    }
}
