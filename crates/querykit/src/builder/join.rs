use crate::error::DbResult;
use crate::ident::{validate_alias, validate_ident};

/// JOIN flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    FullOuter,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
        }
    }
}

/// An equi-join: `<target> [AS alias] ON <target|alias>.<target_field> = <source>.<source_field>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    target: String,
    target_field: String,
    source: String,
    source_field: String,
    alias: Option<String>,
}

impl Join {
    pub fn new(
        target: impl Into<String>,
        target_field: impl Into<String>,
        source: impl Into<String>,
        source_field: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            target_field: target_field.into(),
            source: source.into(),
            source_field: source_field.into(),
            alias: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub(crate) fn render(&self, kind: JoinKind) -> DbResult<String> {
        validate_ident(&self.target)?;
        validate_ident(&self.target_field)?;
        validate_ident(&self.source)?;
        validate_ident(&self.source_field)?;

        let mut sql = format!("{} {}", kind.as_sql(), self.target);
        let qualifier = match &self.alias {
            Some(alias) => {
                validate_alias(alias)?;
                sql.push_str(" AS ");
                sql.push_str(alias);
                alias.as_str()
            }
            None => self.target.as_str(),
        };
        sql.push_str(&format!(
            " ON {qualifier}.{} = {}.{}",
            self.target_field, self.source, self.source_field
        ));
        Ok(sql)
    }
}
