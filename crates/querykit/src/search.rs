//! Search objects: the structured input of the parameter compiler.
//!
//! A [`SearchSpec`] maps field names to filters. It can be built fluently:
//!
//! ```ignore
//! use querykit::{Condition, SearchSpec};
//!
//! let spec = SearchSpec::new()
//!     .value("status", "active")
//!     .is_null("deleted_at")
//!     .ops("age", [Condition::gte(18), Condition::lt(65)])
//!     .value_opt("team_id", team_id); // skipped when `None`
//! ```
//!
//! or parsed from the JSON object form used by HTTP handlers:
//!
//! ```ignore
//! let spec = SearchSpec::from_json(&serde_json::json!({
//!     "status": "active",
//!     "deleted_at": null,
//!     "age": [{ "$gte": 18 }, { "$lt": 65 }],
//! }))?;
//! ```

use crate::error::{DbError, DbResult};
use crate::operator::Operator;
use crate::value::Value;
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Operand(s) of a [`Condition`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operands {
    None,
    One(Value),
    Two(Value, Value),
}

/// One operator applied to a field, with its operand(s).
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    operator: Operator,
    sign: Option<String>,
    operands: Operands,
}

impl Condition {
    fn one(operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            operator,
            sign: None,
            operands: Operands::One(value.into()),
        }
    }

    /// Build a condition from an operator and a list of operands.
    ///
    /// The operand count must match the operator's arity.
    pub fn from_parts(operator: Operator, mut values: Vec<Value>) -> DbResult<Self> {
        if values.len() != operator.arity() {
            return Err(DbError::validation(format!(
                "`{}` expects {} operand(s), got {}",
                operator.tag(),
                operator.arity(),
                values.len()
            )));
        }
        let operands = match values.len() {
            0 => Operands::None,
            1 => Operands::One(values.remove(0)),
            _ => {
                let second = values.remove(1);
                Operands::Two(values.remove(0), second)
            }
        };
        Ok(Self {
            operator,
            sign: None,
            operands,
        })
    }

    /// column = value (`null` becomes IS NULL)
    pub fn eq(value: impl Into<Value>) -> Self {
        Self::one(Operator::Eq, value)
    }

    /// column != value (`null` becomes IS NOT NULL)
    pub fn ne(value: impl Into<Value>) -> Self {
        Self::one(Operator::Ne, value)
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Self::one(Operator::Gt, value)
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Self::one(Operator::Gte, value)
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self::one(Operator::Lt, value)
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        Self::one(Operator::Lte, value)
    }

    /// column <sign> value, for operators outside the table.
    pub fn custom(sign: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            operator: Operator::Custom,
            sign: Some(sign.into()),
            operands: Operands::One(value.into()),
        }
    }

    pub fn between(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self {
            operator: Operator::Between,
            sign: None,
            operands: Operands::Two(from.into(), to.into()),
        }
    }

    pub fn not_between(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self {
            operator: Operator::NotBetween,
            sign: None,
            operands: Operands::Two(from.into(), to.into()),
        }
    }

    /// column IN (list); the list is bound as a single array value.
    pub fn in_list<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self::one(Operator::In, Value::Array(values))
    }

    /// column NOT IN (list); the list is bound as a single array value.
    pub fn not_in<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self::one(Operator::NotIn, Value::Array(values))
    }

    pub fn like(pattern: impl Into<Value>) -> Self {
        Self::one(Operator::Like, pattern)
    }

    pub fn ilike(pattern: impl Into<Value>) -> Self {
        Self::one(Operator::ILike, pattern)
    }

    pub fn not_like(pattern: impl Into<Value>) -> Self {
        Self::one(Operator::NotLike, pattern)
    }

    pub fn not_ilike(pattern: impl Into<Value>) -> Self {
        Self::one(Operator::NotILike, pattern)
    }

    pub fn is_null() -> Self {
        Self {
            operator: Operator::IsNull,
            sign: None,
            operands: Operands::None,
        }
    }

    pub fn is_not_null() -> Self {
        Self {
            operator: Operator::IsNotNull,
            sign: None,
            operands: Operands::None,
        }
    }

    /// column @> value
    pub fn contains(value: impl Into<Value>) -> Self {
        Self::one(Operator::Contains, value)
    }

    /// column <@ value
    pub fn contained_by(value: impl Into<Value>) -> Self {
        Self::one(Operator::ContainedBy, value)
    }

    /// column && value
    pub fn overlap(value: impl Into<Value>) -> Self {
        Self::one(Operator::Overlap, value)
    }

    /// column ~ pattern
    pub fn regex(pattern: impl Into<Value>) -> Self {
        Self::one(Operator::Regex, pattern)
    }

    /// column ~* pattern
    pub fn iregex(pattern: impl Into<Value>) -> Self {
        Self::one(Operator::IRegex, pattern)
    }

    /// column !~ pattern
    pub fn not_regex(pattern: impl Into<Value>) -> Self {
        Self::one(Operator::NotRegex, pattern)
    }

    /// column !~* pattern
    pub fn not_iregex(pattern: impl Into<Value>) -> Self {
        Self::one(Operator::NotIRegex, pattern)
    }

    /// column @? jsonpath
    pub fn json_path(path: impl Into<Value>) -> Self {
        Self::one(Operator::JsonPath, path)
    }

    /// column @@ jsonpath predicate
    pub fn json_path_match(path: impl Into<Value>) -> Self {
        Self::one(Operator::JsonPathMatch, path)
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn sign(&self) -> Option<&str> {
        self.sign.as_deref()
    }

    pub fn operands(&self) -> &Operands {
        &self.operands
    }

    /// Parse one `"$tag": operand` pair.
    fn from_json(tag: &str, operand: &JsonValue) -> DbResult<Self> {
        let operator = Operator::from_tag(tag)?;
        match operator {
            Operator::Between | Operator::NotBetween => match operand.as_array() {
                Some(pair) if pair.len() == 2 => Condition::from_parts(
                    operator,
                    vec![Value::from_json(&pair[0]), Value::from_json(&pair[1])],
                ),
                _ => Err(DbError::validation(format!(
                    "`{tag}` expects a two-element array"
                ))),
            },
            Operator::In | Operator::NotIn => match operand {
                JsonValue::Array(_) => {
                    Condition::from_parts(operator, vec![Value::from_json(operand)])
                }
                _ => Err(DbError::validation(format!("`{tag}` expects an array"))),
            },
            Operator::Custom => {
                let (sign, value) = match operand {
                    JsonValue::Object(map) => (map.get("sign"), map.get("value")),
                    JsonValue::Array(items) if items.len() == 2 => (items.first(), items.get(1)),
                    _ => (None, None),
                };
                match (sign.and_then(JsonValue::as_str), value) {
                    (Some(sign), Some(value)) => {
                        Ok(Condition::custom(sign, Value::from_json(value)))
                    }
                    _ => Err(DbError::validation(
                        "`$custom` expects {\"sign\": ..., \"value\": ...} or [sign, value]",
                    )),
                }
            }
            Operator::IsNull | Operator::IsNotNull => match operand.as_bool() {
                Some(true) => Condition::from_parts(operator, Vec::new()),
                Some(false) if operator == Operator::IsNull => Ok(Condition::is_not_null()),
                Some(false) => Ok(Condition::is_null()),
                None => Err(DbError::validation(format!("`{tag}` expects a boolean"))),
            },
            _ => Condition::from_parts(operator, vec![Value::from_json(operand)]),
        }
    }
}

/// An operator-object: one or more conditions on the same field, ANDed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorObject(Vec<Condition>);

impl OperatorObject {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a condition.
    pub fn with(mut self, condition: Condition) -> Self {
        self.0.push(condition);
        self
    }

    pub fn push(&mut self, condition: Condition) {
        self.0.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn from_json(field: &str, map: &serde_json::Map<String, JsonValue>) -> DbResult<Self> {
        map.iter()
            .map(|(tag, operand)| {
                Condition::from_json(tag, operand)
                    .map_err(|e| DbError::validation(format!("field `{field}`: {}", strip(&e))))
            })
            .collect::<DbResult<Vec<_>>>()
            .map(OperatorObject)
    }
}

impl From<Condition> for OperatorObject {
    fn from(condition: Condition) -> Self {
        Self(vec![condition])
    }
}

/// The filter attached to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldFilter {
    /// Plain equality; `Value::Null` means IS NULL.
    Value(Value),
    /// One operator-object.
    Object(OperatorObject),
    /// Several operator-objects on the same field, all ANDed.
    Objects(Vec<OperatorObject>),
}

/// Field → filter mapping, ordered by insertion.
///
/// Entry order determines fragment order and value order in the compiled output.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct SearchSpec {
    entries: Vec<(String, FieldFilter)>,
}

impl SearchSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter for `key`. An existing entry is replaced in place.
    pub fn insert(&mut self, key: impl Into<String>, filter: FieldFilter) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = filter,
            None => self.entries.push((key, filter)),
        }
    }

    /// key = value (or IS NULL for a null value)
    pub fn value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, FieldFilter::Value(value.into()));
        self
    }

    /// Like [`SearchSpec::value`], but `None` leaves the field out entirely.
    pub fn value_opt<T: Into<Value>>(self, key: impl Into<String>, value: Option<T>) -> Self {
        match value {
            Some(v) => self.value(key, v),
            None => self,
        }
    }

    /// key IS NULL
    pub fn is_null(self, key: impl Into<String>) -> Self {
        self.value(key, Value::Null)
    }

    /// Apply a single operator to `key`.
    pub fn op(mut self, key: impl Into<String>, condition: Condition) -> Self {
        self.insert(key, FieldFilter::Object(condition.into()));
        self
    }

    /// Like [`SearchSpec::op`], but `None` leaves the field out entirely.
    pub fn op_opt(self, key: impl Into<String>, condition: Option<Condition>) -> Self {
        match condition {
            Some(c) => self.op(key, c),
            None => self,
        }
    }

    /// Apply several operators to `key`, ANDed (e.g. a `$gte` + `$lt` range).
    pub fn ops(
        mut self,
        key: impl Into<String>,
        conditions: impl IntoIterator<Item = Condition>,
    ) -> Self {
        let objects = conditions.into_iter().map(OperatorObject::from).collect();
        self.insert(key, FieldFilter::Objects(objects));
        self
    }

    /// Attach a prepared operator-object to `key`.
    pub fn object(mut self, key: impl Into<String>, object: OperatorObject) -> Self {
        self.insert(key, FieldFilter::Object(object));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldFilter)> {
        self.entries.iter().map(|(k, f)| (k.as_str(), f))
    }

    pub fn get(&self, key: &str) -> Option<&FieldFilter> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the JSON object form.
    ///
    /// - `null` → IS NULL
    /// - scalar → equality
    /// - `{ "$op": operand, ... }` → operator-object (unknown `$op` is an error)
    /// - `[ {..}, {..} ]` → several operator-objects on the same field
    pub fn from_json(json: &JsonValue) -> DbResult<Self> {
        let map = json
            .as_object()
            .ok_or_else(|| DbError::validation("search object must be a JSON object"))?;

        let mut spec = SearchSpec::new();
        for (field, raw) in map {
            let filter = match raw {
                JsonValue::Object(ops) => {
                    FieldFilter::Object(OperatorObject::from_json(field, ops)?)
                }
                JsonValue::Array(items) => {
                    let objects = items
                        .iter()
                        .map(|item| match item {
                            JsonValue::Object(ops) => OperatorObject::from_json(field, ops),
                            _ => Err(DbError::validation(format!(
                                "field `{field}`: array entries must be operator objects"
                            ))),
                        })
                        .collect::<DbResult<Vec<_>>>()?;
                    FieldFilter::Objects(objects)
                }
                scalar => FieldFilter::Value(Value::from_json(scalar)),
            };
            spec.insert(field.clone(), filter);
        }
        Ok(spec)
    }

    /// Parse a JSON array of search objects (OR alternatives).
    pub fn from_json_list(json: &JsonValue) -> DbResult<Vec<Self>> {
        json.as_array()
            .ok_or_else(|| DbError::validation("OR alternatives must be a JSON array"))?
            .iter()
            .map(SearchSpec::from_json)
            .collect()
    }
}

impl TryFrom<JsonValue> for SearchSpec {
    type Error = DbError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        SearchSpec::from_json(&value)
    }
}

/// A main search object plus optional OR alternatives.
///
/// The alternatives are each ANDed internally, ORed together, and the whole
/// cluster is ANDed with the main object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchGroup {
    pub search: SearchSpec,
    pub alternatives: Option<Vec<SearchSpec>>,
}

impl SearchGroup {
    pub fn new(search: SearchSpec) -> Self {
        Self {
            search,
            alternatives: None,
        }
    }

    /// Attach OR alternatives (at least two are required at compile time).
    pub fn or(mut self, alternatives: Vec<SearchSpec>) -> Self {
        self.alternatives = Some(alternatives);
        self
    }
}

impl From<SearchSpec> for SearchGroup {
    fn from(search: SearchSpec) -> Self {
        SearchGroup::new(search)
    }
}

fn strip(err: &DbError) -> String {
    match err {
        DbError::Validation(msg) => msg.clone(),
        other => other.to_string(),
    }
}
