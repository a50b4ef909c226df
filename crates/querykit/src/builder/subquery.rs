use crate::dialect::Dialect;
use crate::value::Value;

/// A frozen builder: compiled text plus its values, ready to be used as a
/// FROM source by another builder.
///
/// The text is numbered from `$1`; the consuming builder shifts it to its own
/// cursor when splicing it in.
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    pub(crate) sql: String,
    pub(crate) values: Vec<Value>,
    pub(crate) alias: String,
    pub(crate) dialect: Dialect,
}

impl SubQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

/// What a builder selects from.
#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    /// Table expression, e.g. `users` or `users u`.
    Table(String),
    SubQuery(SubQuery),
}

impl From<&str> for FromSource {
    fn from(table: &str) -> Self {
        FromSource::Table(table.to_string())
    }
}

impl From<String> for FromSource {
    fn from(table: String) -> Self {
        FromSource::Table(table)
    }
}

impl From<SubQuery> for FromSource {
    fn from(sub: SubQuery) -> Self {
        FromSource::SubQuery(sub)
    }
}
