use super::join::{Join, JoinKind};
use super::subquery::{FromSource, SubQuery};
use crate::compile::compare_fields;
use crate::config::QueryConfig;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::executor::{CompiledQuery, Executor};
use crate::ident::validate_alias;
use crate::render::{
    OrderSpec, Pagination, SortableFields, TAUTOLOGY, render_conditions, render_order_by,
    render_pagination, render_selected,
};
use crate::search::SearchGroup;
use crate::value::Value;

/// Clause a bound value belongs to, in SQL text order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Slot {
    From,
    Where,
    Having,
}

#[derive(Debug, Clone)]
struct Bound {
    slot: Slot,
    value: Value,
}

/// SELECT builder driven by search objects.
///
/// WHERE and HAVING share one placeholder cursor, so numbering never repeats
/// within a statement no matter in which order clauses are added. Cloning
/// yields an independent copy, which is how a list query and its count query
/// are branched from one filtered prefix.
#[derive(Clone)]
pub struct QueryBuilder<E> {
    executor: E,
    dialect: Dialect,
    config: QueryConfig,
    /// SELECT columns (empty means `*`)
    select_cols: Vec<String>,
    /// Table or `(subquery) AS alias`
    from_expr: String,
    /// Number of values bound by the FROM source
    from_params: usize,
    join_clauses: Vec<String>,
    where_conditions: Vec<String>,
    group_by: Vec<String>,
    having_conditions: Vec<String>,
    order: Option<OrderSpec>,
    sortable: Option<SortableFields>,
    pagination: Option<Pagination>,
    values: Vec<Bound>,
    /// Placeholders emitted so far
    cursor: usize,
    /// First validation error; reported by `build()`
    build_error: Option<String>,
}

impl<E: Executor> QueryBuilder<E> {
    /// Create a builder selecting from `source`, using the executor's dialect.
    pub fn new(source: impl Into<FromSource>, executor: E) -> Self {
        let dialect = executor.dialect();
        let mut qb = Self {
            executor,
            dialect,
            config: QueryConfig::default(),
            select_cols: Vec::new(),
            from_expr: String::new(),
            from_params: 0,
            join_clauses: Vec::new(),
            where_conditions: Vec::new(),
            group_by: Vec::new(),
            having_conditions: Vec::new(),
            order: None,
            sortable: None,
            pagination: None,
            values: Vec::new(),
            cursor: 0,
            build_error: None,
        };
        qb.set_from(source.into());
        qb
    }

    /// Branch a `SELECT COUNT(*)` query from the current state.
    ///
    /// ORDER BY and pagination are dropped. Grouped queries are wrapped:
    /// `SELECT COUNT(*) FROM (<grouped query>) AS t`.
    pub fn into_count(mut self) -> Self {
        self.order = None;
        self.pagination = None;

        if self.group_by.is_empty() && self.having_conditions.is_empty() {
            self.select_cols = vec!["COUNT(*)".to_string()];
            return self;
        }

        match self.to_subquery("t") {
            Ok(sub) => {
                let config = self.config;
                let mut outer = QueryBuilder::new(sub, self.executor).with_config(config);
                outer.select_cols = vec!["COUNT(*)".to_string()];
                outer
            }
            Err(err) => {
                self.record_error(err);
                self
            }
        }
    }

    /// Build and run the query, returning the executor's rows unmodified.
    pub async fn execute(&self) -> DbResult<Vec<E::Row>> {
        let query = self.build()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            target: "querykit.sql",
            dialect = %self.dialect,
            param_count = query.values.len(),
            sql = %query.sql,
            "executing query"
        );

        self.executor.execute(&query).await
    }
}

impl<E> QueryBuilder<E> {
    fn record_error(&mut self, err: DbError) {
        if self.build_error.is_none() {
            self.build_error = Some(match err {
                DbError::Validation(msg) => msg,
                other => other.to_string(),
            });
        }
    }

    fn validate(&self) -> DbResult<()> {
        match &self.build_error {
            Some(msg) => Err(DbError::Validation(msg.clone())),
            None => Ok(()),
        }
    }

    fn set_from(&mut self, source: FromSource) {
        if self.from_params > 0 {
            let numbered_after = self.values.iter().any(|b| b.slot != Slot::From);
            if numbered_after && self.dialect.is_numbered() {
                self.record_error(DbError::validation(
                    "cannot replace a parameterized FROM after WHERE/HAVING values were bound",
                ));
                return;
            }
            self.values.retain(|b| b.slot != Slot::From);
            self.cursor -= self.from_params;
            self.from_params = 0;
        }

        match source {
            FromSource::Table(table) => self.from_expr = table,
            FromSource::SubQuery(sub) => {
                if let Err(err) = self.splice_subquery(sub) {
                    self.record_error(err);
                }
            }
        }
    }

    fn splice_subquery(&mut self, sub: SubQuery) -> DbResult<()> {
        if sub.dialect != self.dialect {
            return Err(DbError::validation(format!(
                "subquery `{}` was built for the {} dialect, outer query uses {}",
                sub.alias, sub.dialect, self.dialect
            )));
        }
        validate_alias(&sub.alias)?;

        let inner = self.dialect.shift_placeholders(&sub.sql, self.cursor);
        self.from_expr = format!("({inner}) AS {}", sub.alias);
        self.from_params = sub.values.len();
        self.cursor += sub.values.len();
        self.values
            .extend(sub.values.into_iter().map(|value| Bound { slot: Slot::From, value }));
        Ok(())
    }

    fn push_group(&mut self, group: SearchGroup, slot: Slot) -> DbResult<String> {
        let compiled = compare_fields(&group.search, group.alternatives.as_deref())?;
        let (sql, next) = render_conditions(&compiled, self.dialect, self.cursor)?;
        self.cursor = next;
        self.values
            .extend(compiled.values.into_iter().map(|value| Bound { slot, value }));
        Ok(sql)
    }

    // ==================== Clauses ====================

    /// Set SELECT columns (replaces any previous list).
    pub fn select(mut self, cols: &[&str]) -> Self {
        self.select_cols = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Replace the FROM source with a table expression or a [`SubQuery`].
    pub fn from(mut self, source: impl Into<FromSource>) -> Self {
        self.set_from(source.into());
        self
    }

    fn join(mut self, kind: JoinKind, join: Join) -> Self {
        match join.render(kind) {
            Ok(sql) => self.join_clauses.push(sql),
            Err(err) => self.record_error(err),
        }
        self
    }

    pub fn inner_join(self, join: Join) -> Self {
        self.join(JoinKind::Inner, join)
    }

    pub fn left_join(self, join: Join) -> Self {
        self.join(JoinKind::Left, join)
    }

    pub fn right_join(self, join: Join) -> Self {
        self.join(JoinKind::Right, join)
    }

    pub fn full_outer_join(self, join: Join) -> Self {
        self.join(JoinKind::FullOuter, join)
    }

    /// Add WHERE conditions. Repeated calls are ANDed.
    pub fn filter(mut self, group: impl Into<SearchGroup>) -> Self {
        match self.push_group(group.into(), Slot::Where) {
            Ok(sql) => self.where_conditions.push(sql),
            Err(err) => self.record_error(err),
        }
        self
    }

    /// Append GROUP BY columns.
    pub fn group_by(mut self, cols: &[&str]) -> Self {
        self.group_by.extend(cols.iter().map(|s| s.to_string()));
        self
    }

    /// Add HAVING conditions. Numbering continues from the WHERE clause.
    pub fn having(mut self, group: impl Into<SearchGroup>) -> Self {
        match self.push_group(group.into(), Slot::Having) {
            Ok(sql) => self.having_conditions.push(sql),
            Err(err) => self.record_error(err),
        }
        self
    }

    /// Set ORDER BY (replaces any previous ordering).
    pub fn order_by(mut self, order: impl Into<OrderSpec>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Restrict ORDER BY fields to an allow-list.
    pub fn sortable(mut self, fields: SortableFields) -> Self {
        self.sortable = Some(fields);
        self
    }

    /// Set LIMIT/OFFSET.
    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    // ==================== Build ====================

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Placeholders emitted so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Freeze the current query so another builder can select from it.
    pub fn to_subquery(&self, alias: &str) -> DbResult<SubQuery> {
        validate_alias(alias)?;
        let query = self.build()?;
        Ok(SubQuery {
            sql: query.sql,
            values: query.values,
            alias: alias.to_string(),
            dialect: self.dialect,
        })
    }

    /// Render the final SQL and its values in binding order.
    pub fn build(&self) -> DbResult<CompiledQuery> {
        self.validate()?;

        let mut sql = format!(
            "SELECT {} FROM {}",
            render_selected(&self.select_cols),
            self.from_expr
        );

        for join in &self.join_clauses {
            sql.push(' ');
            sql.push_str(join);
        }

        if !self.where_conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&and_all(&self.where_conditions));
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if !self.having_conditions.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&and_all(&self.having_conditions));
        }

        if let Some(order) = &self.order {
            let order_sql = render_order_by(order, self.sortable.as_ref())?;
            if !order_sql.is_empty() {
                sql.push(' ');
                sql.push_str(&order_sql);
            }
        }

        if let Some(pagination) = &self.pagination {
            sql.push(' ');
            sql.push_str(&render_pagination(pagination, &self.config));
        }

        Ok(CompiledQuery::new(sql, self.ordered_values()))
    }

    /// Numbered placeholders bind in push order (which is numbering order);
    /// unnumbered ones bind in text order, i.e. by clause.
    fn ordered_values(&self) -> Vec<Value> {
        let mut bound: Vec<&Bound> = self.values.iter().collect();
        if !self.dialect.is_numbered() {
            bound.sort_by_key(|b| b.slot);
        }
        bound.into_iter().map(|b| b.value.clone()).collect()
    }
}

/// Join clause conditions with AND, dropping redundant tautologies.
fn and_all(conditions: &[String]) -> String {
    let parts: Vec<&str> = conditions
        .iter()
        .map(String::as_str)
        .filter(|c| *c != TAUTOLOGY)
        .collect();
    if parts.is_empty() {
        TAUTOLOGY.to_string()
    } else {
        parts.join(" AND ")
    }
}
