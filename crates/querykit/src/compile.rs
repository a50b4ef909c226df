//! Parameter compiler: search objects → fragments + ordered values.
//!
//! Compilation is pure. It does not know about placeholders, cursors or
//! dialects; [`crate::render`] turns the result into SQL text.

use crate::error::{DbError, DbResult};
use crate::ident::validate_field;
use crate::operator::{Operator, validate_sign};
use crate::search::{Condition, FieldFilter, Operands, OperatorObject, SearchSpec};
use crate::value::Value;

/// One compiled condition: a field, an operator and (for `$custom`) its sign.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub key: String,
    pub operator: Operator,
    pub sign: Option<String>,
}

impl Fragment {
    fn new(key: &str, operator: Operator) -> Self {
        Self {
            key: key.to_string(),
            operator,
            sign: None,
        }
    }
}

/// The fragments of one OR alternative, ANDed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrGroup {
    pub query: Vec<Fragment>,
}

/// Output of [`compare_fields`].
///
/// `values` holds the main fragments' values first, then each OR alternative's
/// values in order, matching the order the renderer emits placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledGroup {
    pub query_array: Vec<Fragment>,
    pub query_or_array: Vec<OrGroup>,
    pub values: Vec<Value>,
}

impl CompiledGroup {
    pub fn is_empty(&self) -> bool {
        self.query_array.is_empty() && self.query_or_array.is_empty()
    }

    /// Total number of placeholders the group will render.
    pub fn placeholder_count(&self) -> usize {
        self.query_array
            .iter()
            .chain(self.query_or_array.iter().flat_map(|g| g.query.iter()))
            .map(|f| f.operator.arity())
            .sum()
    }
}

/// Compile a search object and optional OR alternatives.
pub fn compare_fields(
    params: &SearchSpec,
    params_or: Option<&[SearchSpec]>,
) -> DbResult<CompiledGroup> {
    let mut values = Vec::new();
    let query_array = compile_spec(params, &mut values)?;

    let mut query_or_array = Vec::new();
    if let Some(alternatives) = params_or {
        if alternatives.len() < 2 {
            return Err(DbError::validation(format!(
                "OR requires at least 2 alternatives, got {}",
                alternatives.len()
            )));
        }
        for (idx, alternative) in alternatives.iter().enumerate() {
            let query = compile_spec(alternative, &mut values)?;
            if query.is_empty() {
                return Err(DbError::validation(format!(
                    "OR alternative #{idx} has no conditions"
                )));
            }
            query_or_array.push(OrGroup { query });
        }
    }

    Ok(CompiledGroup {
        query_array,
        query_or_array,
        values,
    })
}

fn compile_spec(spec: &SearchSpec, values: &mut Vec<Value>) -> DbResult<Vec<Fragment>> {
    let mut fragments = Vec::with_capacity(spec.len());
    for (key, filter) in spec.iter() {
        validate_field(key)?;
        match filter {
            FieldFilter::Value(Value::Null) => fragments.push(Fragment::new(key, Operator::IsNull)),
            FieldFilter::Value(value) => {
                fragments.push(Fragment::new(key, Operator::Eq));
                values.push(value.clone());
            }
            FieldFilter::Object(object) => compile_object(key, object, &mut fragments, values)?,
            FieldFilter::Objects(objects) => {
                if objects.is_empty() {
                    return Err(DbError::validation(format!(
                        "field `{key}`: empty list of operator objects"
                    )));
                }
                for object in objects {
                    compile_object(key, object, &mut fragments, values)?;
                }
            }
        }
    }
    Ok(fragments)
}

fn compile_object(
    key: &str,
    object: &OperatorObject,
    fragments: &mut Vec<Fragment>,
    values: &mut Vec<Value>,
) -> DbResult<()> {
    if object.is_empty() {
        return Err(DbError::validation(format!("field `{key}`: empty operator object")));
    }
    for condition in object.conditions() {
        compile_condition(key, condition, fragments, values)?;
    }
    Ok(())
}

fn compile_condition(
    key: &str,
    condition: &Condition,
    fragments: &mut Vec<Fragment>,
    values: &mut Vec<Value>,
) -> DbResult<()> {
    let operator = condition.operator();
    match condition.operands() {
        Operands::One(Value::Null) => {
            let null_check = match operator {
                Operator::Eq => Operator::IsNull,
                Operator::Ne => Operator::IsNotNull,
                _ => {
                    return Err(DbError::validation(format!(
                        "field `{key}`: `{}` cannot take a null operand",
                        operator.tag()
                    )));
                }
            };
            fragments.push(Fragment::new(key, null_check));
        }
        Operands::One(value) => {
            let mut fragment = Fragment::new(key, operator);
            if operator == Operator::Custom {
                let sign = condition.sign().ok_or_else(|| {
                    DbError::validation(format!("field `{key}`: `$custom` requires a sign"))
                })?;
                validate_sign(key, sign)?;
                fragment.sign = Some(sign.to_string());
            }
            fragments.push(fragment);
            values.push(value.clone());
        }
        Operands::Two(from, to) => {
            if from.is_null() || to.is_null() {
                return Err(DbError::validation(format!(
                    "field `{key}`: `{}` bounds cannot be null",
                    operator.tag()
                )));
            }
            fragments.push(Fragment::new(key, operator));
            values.push(from.clone());
            values.push(to.clone());
        }
        Operands::None => fragments.push(Fragment::new(key, operator)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ops(group: &[Fragment]) -> Vec<(&str, Operator)> {
        group.iter().map(|f| (f.key.as_str(), f.operator)).collect()
    }

    #[test]
    fn scalar_and_null_entries() {
        let spec = SearchSpec::new().value("status", "active").is_null("deleted_at");
        let group = compare_fields(&spec, None).unwrap();
        assert_eq!(
            ops(&group.query_array),
            vec![("status", Operator::Eq), ("deleted_at", Operator::IsNull)]
        );
        assert_eq!(group.values, vec![Value::Text("active".into())]);
    }

    #[test]
    fn eq_null_and_ne_null() {
        let spec = SearchSpec::new()
            .op("a", Condition::eq(Value::Null))
            .op("b", Condition::ne(Value::Null));
        let group = compare_fields(&spec, None).unwrap();
        assert_eq!(
            ops(&group.query_array),
            vec![("a", Operator::IsNull), ("b", Operator::IsNotNull)]
        );
        assert!(group.values.is_empty());
    }

    #[test]
    fn null_operand_rejected_elsewhere() {
        let spec = SearchSpec::new().op("a", Condition::gt(Value::Null));
        assert!(compare_fields(&spec, None).unwrap_err().is_validation());
    }

    #[test]
    fn between_pushes_two_values() {
        let spec = SearchSpec::new().op("age", Condition::between(18, 65)).value("x", 1);
        let group = compare_fields(&spec, None).unwrap();
        assert_eq!(group.values, vec![Value::Int(18), Value::Int(65), Value::Int(1)]);
        assert_eq!(group.placeholder_count(), 3);
    }

    #[test]
    fn array_of_objects_in_order() {
        let spec = SearchSpec::new().ops("age", [Condition::gte(18), Condition::lt(65)]);
        let group = compare_fields(&spec, None).unwrap();
        assert_eq!(
            ops(&group.query_array),
            vec![("age", Operator::Gte), ("age", Operator::Lt)]
        );
        assert_eq!(group.values, vec![Value::Int(18), Value::Int(65)]);
    }

    #[test]
    fn fragment_order_matches_value_order() {
        let spec = SearchSpec::from_json(&json!({
            "c": 3,
            "a": {"$in": [1, 2]},
            "b": null,
            "d": {"$like": "x%"},
        }))
        .unwrap();
        let group = compare_fields(&spec, None).unwrap();
        assert_eq!(
            ops(&group.query_array),
            vec![
                ("c", Operator::Eq),
                ("a", Operator::In),
                ("b", Operator::IsNull),
                ("d", Operator::Like)
            ]
        );
        assert_eq!(
            group.values,
            vec![
                Value::Int(3),
                Value::Array(vec![Value::Int(1), Value::Int(2)]),
                Value::Text("x%".into())
            ]
        );
    }

    #[test]
    fn or_values_follow_main_values() {
        let main = SearchSpec::new().value("tenant", 7);
        let alts = vec![SearchSpec::new().value("a", 1), SearchSpec::new().value("b", 2)];
        let group = compare_fields(&main, Some(&alts)).unwrap();
        assert_eq!(group.query_or_array.len(), 2);
        assert_eq!(group.values, vec![Value::Int(7), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn or_needs_two_alternatives() {
        let alts = vec![SearchSpec::new().value("a", 1)];
        let err = compare_fields(&SearchSpec::new(), Some(&alts)).unwrap_err();
        assert!(err.is_validation());
        assert!(compare_fields(&SearchSpec::new(), Some(&[])).is_err());
    }

    #[test]
    fn or_member_without_conditions() {
        let alts = vec![SearchSpec::new().value("a", 1), SearchSpec::new()];
        assert!(compare_fields(&SearchSpec::new(), Some(&alts)).is_err());
    }

    #[test]
    fn empty_operator_object() {
        let spec = SearchSpec::new().object("a", OperatorObject::new());
        assert!(compare_fields(&spec, None).is_err());
    }

    #[test]
    fn custom_sign_is_validated() {
        let ok = SearchSpec::new().op("ip", Condition::custom("<<", "10.0.0.0/8"));
        let group = compare_fields(&ok, None).unwrap();
        assert_eq!(group.query_array[0].sign.as_deref(), Some("<<"));

        let bad = SearchSpec::new().op("ip", Condition::custom("; DROP", 1));
        assert!(compare_fields(&bad, None).is_err());
    }

    #[test]
    fn field_names_must_be_identifiers() {
        let spec = SearchSpec::new().value("id = 1 OR 1", 1);
        assert!(compare_fields(&spec, None).unwrap_err().is_validation());
        let dotted = SearchSpec::new().value("u.id", 1);
        assert!(compare_fields(&dotted, None).is_ok());
    }

    #[test]
    fn empty_spec_compiles_to_nothing() {
        let group = compare_fields(&SearchSpec::new(), None).unwrap();
        assert!(group.is_empty());
        assert!(group.values.is_empty());
    }
}
