//! Placeholder renderer: compiled fragments → SQL clause text.
//!
//! The cursor is explicit: every function takes the number of placeholders
//! already emitted and returns the new count. The numbered dialect uses it to
//! pick `$n`; the unnumbered dialect still advances it so that mixed callers
//! keep an accurate count.

use crate::compile::{CompiledGroup, Fragment};
use crate::config::QueryConfig;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::ident::validate_ident;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Tautology used when a group has no conditions.
pub const TAUTOLOGY: &str = "1=1";

/// Render the group's conditions (without the `WHERE` keyword).
///
/// - empty group → `1=1`
/// - main fragments joined with `AND`
/// - OR cluster appended as `AND ((<alt1>) OR (<alt2>) ...)`
pub fn render_conditions(
    group: &CompiledGroup,
    dialect: Dialect,
    cursor: usize,
) -> DbResult<(String, usize)> {
    if group.is_empty() {
        return Ok((TAUTOLOGY.to_string(), cursor));
    }

    let (mut sql, mut cursor) = render_and(&group.query_array, dialect, cursor)?;
    if sql.is_empty() {
        sql.push_str(TAUTOLOGY);
    }

    if !group.query_or_array.is_empty() {
        let mut alternatives = Vec::with_capacity(group.query_or_array.len());
        for alt in &group.query_or_array {
            let (text, next) = render_and(&alt.query, dialect, cursor)?;
            cursor = next;
            alternatives.push(format!("({text})"));
        }
        sql.push_str(" AND (");
        sql.push_str(&alternatives.join(" OR "));
        sql.push(')');
    }

    Ok((sql, cursor))
}

fn render_and(
    fragments: &[Fragment],
    dialect: Dialect,
    mut cursor: usize,
) -> DbResult<(String, usize)> {
    let mut parts = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let (text, next) = fragment
            .operator
            .render(&fragment.key, fragment.sign.as_deref(), cursor, dialect)?;
        cursor = next;
        parts.push(text);
    }
    Ok((parts.join(" AND "), cursor))
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            Err(DbError::validation(format!(
                "invalid ordering `{s}`; expected ASC or DESC"
            )))
        }
    }
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One `ORDER BY` item. Deserializes from `{"orderBy": "name", "ordering": "desc"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderBy {
    #[serde(rename = "orderBy")]
    pub field: String,
    #[serde(rename = "ordering", default)]
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }

    /// Build from a field and an untrusted ordering token.
    pub fn parse(field: impl Into<String>, ordering: &str) -> DbResult<Self> {
        Ok(Self::new(field, ordering.parse()?))
    }
}

/// A single order-by item or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OrderSpec {
    One(OrderBy),
    Many(Vec<OrderBy>),
}

impl OrderSpec {
    pub fn items(&self) -> &[OrderBy] {
        match self {
            OrderSpec::One(item) => std::slice::from_ref(item),
            OrderSpec::Many(items) => items,
        }
    }
}

impl From<OrderBy> for OrderSpec {
    fn from(item: OrderBy) -> Self {
        OrderSpec::One(item)
    }
}

impl From<Vec<OrderBy>> for OrderSpec {
    fn from(items: Vec<OrderBy>) -> Self {
        OrderSpec::Many(items)
    }
}

/// Allow-list of fields that may appear in `ORDER BY`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortableFields {
    fields: Vec<String>,
}

impl SortableFields {
    /// Start from the table's core fields.
    pub fn new<S: Into<String>>(core: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: core.into_iter().map(Into::into).collect(),
        }
    }

    /// Add extra sortable fields (computed columns, joined columns, ...).
    pub fn with_extra<S: Into<String>>(mut self, extra: impl IntoIterator<Item = S>) -> Self {
        self.fields.extend(extra.into_iter().map(Into::into));
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// Render `ORDER BY a ASC, b DESC`. An empty list renders nothing.
pub fn render_order_by(order: &OrderSpec, sortable: Option<&SortableFields>) -> DbResult<String> {
    let items = order.items();
    if items.is_empty() {
        return Ok(String::new());
    }

    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        match sortable {
            Some(allowed) if !allowed.contains(&item.field) => {
                return Err(DbError::validation(format!(
                    "`{}` is not a sortable field",
                    item.field
                )));
            }
            Some(_) => {}
            None => validate_ident(&item.field)?,
        }
        parts.push(format!("{} {}", item.field, item.direction));
    }
    Ok(format!("ORDER BY {}", parts.join(", ")))
}

/// Requested page. Missing fields fall back to [`QueryConfig`] defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "JsonValue")]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Read `{"limit": .., "offset": ..}`.
    ///
    /// Values that are not non-negative integers (or integer strings) are
    /// treated as missing.
    pub fn from_json(json: &JsonValue) -> Self {
        let field = |name: &str| json.get(name).and_then(non_negative);
        Self {
            limit: field("limit"),
            offset: field("offset"),
        }
    }

    /// Effective `(limit, offset)` under `config`.
    pub fn resolve(&self, config: &QueryConfig) -> (i64, i64) {
        let limit = self.limit.filter(|n| *n >= 0).unwrap_or(config.default_limit);
        let offset = self.offset.filter(|n| *n >= 0).unwrap_or(config.default_offset);
        (config.clamp_limit(limit), offset)
    }
}

impl From<JsonValue> for Pagination {
    fn from(json: JsonValue) -> Self {
        Pagination::from_json(&json)
    }
}

fn non_negative(value: &JsonValue) -> Option<i64> {
    let n = match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    (n >= 0).then_some(n)
}

/// Render `LIMIT n OFFSET m`.
pub fn render_pagination(pagination: &Pagination, config: &QueryConfig) -> String {
    let (limit, offset) = pagination.resolve(config);
    format!("LIMIT {limit} OFFSET {offset}")
}

/// Render the select list; `*` when empty.
pub fn render_selected<S: AsRef<str>>(columns: &[S]) -> String {
    if columns.is_empty() {
        return "*".to_string();
    }
    columns.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
}

/// Input of [`get_fields_to_search`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderRequest<'a> {
    pub selected: &'a [String],
    pub pagination: Option<&'a Pagination>,
    pub order: Option<&'a OrderSpec>,
    pub sortable: Option<&'a SortableFields>,
    pub dialect: Dialect,
    pub cursor: usize,
    pub config: QueryConfig,
}

impl<'a> RenderRequest<'a> {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    pub fn selected(mut self, columns: &'a [String]) -> Self {
        self.selected = columns;
        self
    }

    pub fn pagination(mut self, pagination: &'a Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn order(mut self, order: &'a OrderSpec) -> Self {
        self.order = Some(order);
        self
    }

    pub fn sortable(mut self, sortable: &'a SortableFields) -> Self {
        self.sortable = Some(sortable);
        self
    }

    pub fn cursor(mut self, cursor: usize) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }
}

/// Output of [`get_fields_to_search`]; each field is ready to concatenate.
///
/// `order_by_fields` and `pagination_fields` are empty when not requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedClauses {
    pub selected_fields: String,
    pub search_fields: String,
    pub order_by_fields: String,
    pub pagination_fields: String,
    pub end_cursor: usize,
}

/// Render every clause of a hand-written query from one compiled group.
///
/// ```ignore
/// let group = compare_fields(&spec, None)?;
/// let clauses = get_fields_to_search(&group, &RenderRequest::new(Dialect::Numbered))?;
/// let sql = format!(
///     "SELECT {} FROM users {} {}",
///     clauses.selected_fields, clauses.search_fields, clauses.pagination_fields
/// );
/// ```
pub fn get_fields_to_search(
    group: &CompiledGroup,
    request: &RenderRequest<'_>,
) -> DbResult<RenderedClauses> {
    let (conditions, end_cursor) = render_conditions(group, request.dialect, request.cursor)?;

    let order_by_fields = match request.order {
        Some(order) => render_order_by(order, request.sortable)?,
        None => String::new(),
    };
    let pagination_fields = request
        .pagination
        .map(|p| render_pagination(p, &request.config))
        .unwrap_or_default();

    Ok(RenderedClauses {
        selected_fields: render_selected(request.selected),
        search_fields: format!("WHERE {conditions}"),
        order_by_fields,
        pagination_fields,
        end_cursor,
    })
}
