//! Operator table.
//!
//! Every comparison the compiler can emit is one [`Operator`] variant. Each variant
//! declares how many placeholders it consumes ([`Operator::arity`]) and how it is
//! written in SQL ([`Operator::render`]). The set is closed: the only place an
//! unknown operator can appear is when parsing a `$tag` from JSON, which
//! [`Operator::from_tag`] rejects.

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};

/// Comparison operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Caller-supplied operator sign, e.g. `>>` or `%`.
    Custom,
    Between,
    NotBetween,
    In,
    NotIn,
    Like,
    ILike,
    NotLike,
    NotILike,
    IsNull,
    IsNotNull,
    // PostgreSQL-only
    Contains,
    ContainedBy,
    Overlap,
    Regex,
    IRegex,
    NotRegex,
    NotIRegex,
    JsonPath,
    JsonPathMatch,
}

impl Operator {
    /// Every operator, in tag-table order.
    pub const ALL: [Operator; 26] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Custom,
        Operator::Between,
        Operator::NotBetween,
        Operator::In,
        Operator::NotIn,
        Operator::Like,
        Operator::ILike,
        Operator::NotLike,
        Operator::NotILike,
        Operator::IsNull,
        Operator::IsNotNull,
        Operator::Contains,
        Operator::ContainedBy,
        Operator::Overlap,
        Operator::Regex,
        Operator::IRegex,
        Operator::NotRegex,
        Operator::NotIRegex,
        Operator::JsonPath,
        Operator::JsonPathMatch,
    ];

    /// Number of placeholders (and bound values) this operator consumes.
    ///
    /// `In`/`NotIn` bind the whole list as a single array value.
    pub fn arity(self) -> usize {
        match self {
            Operator::IsNull | Operator::IsNotNull => 0,
            Operator::Between | Operator::NotBetween => 2,
            _ => 1,
        }
    }

    /// The `$tag` used in JSON search objects.
    ///
    /// Null checks are usually written as a `null` value, `$eq: null` or
    /// `$ne: null`; `$isNull`/`$isNotNull` take a boolean.
    pub fn tag(self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Custom => "$custom",
            Operator::Between => "$between",
            Operator::NotBetween => "$notBetween",
            Operator::In => "$in",
            Operator::NotIn => "$nin",
            Operator::Like => "$like",
            Operator::ILike => "$ilike",
            Operator::NotLike => "$notLike",
            Operator::NotILike => "$notIlike",
            Operator::IsNull => "$isNull",
            Operator::IsNotNull => "$isNotNull",
            Operator::Contains => "$contains",
            Operator::ContainedBy => "$containedBy",
            Operator::Overlap => "$overlap",
            Operator::Regex => "$regex",
            Operator::IRegex => "$iregex",
            Operator::NotRegex => "$notRegex",
            Operator::NotIRegex => "$notIregex",
            Operator::JsonPath => "$jsonPath",
            Operator::JsonPathMatch => "$jsonPathMatch",
        }
    }

    /// Look up an operator by its `$tag`.
    ///
    /// Unknown tags fail with a validation error listing the accepted tags.
    pub fn from_tag(tag: &str) -> DbResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.tag() == tag)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|op| op.tag()).collect();
                DbError::validation(format!(
                    "unknown operator `{tag}`; expected one of: {}",
                    valid.join(", ")
                ))
            })
    }

    /// Whether the operator only exists in PostgreSQL.
    pub fn is_postgres_only(self) -> bool {
        matches!(
            self,
            Operator::Contains
                | Operator::ContainedBy
                | Operator::Overlap
                | Operator::Regex
                | Operator::IRegex
                | Operator::NotRegex
                | Operator::NotIRegex
                | Operator::JsonPath
                | Operator::JsonPathMatch
        )
    }

    /// Render `key <op> <placeholders>` starting after `cursor`.
    ///
    /// Returns the SQL text and the cursor advanced by [`Operator::arity`]. The
    /// cursor is advanced for the unnumbered dialect too, so later clauses keep an
    /// accurate count.
    pub fn render(
        self,
        key: &str,
        sign: Option<&str>,
        cursor: usize,
        dialect: Dialect,
    ) -> DbResult<(String, usize)> {
        if self.is_postgres_only() && !dialect.is_numbered() {
            return Err(DbError::validation(format!(
                "operator `{}` on `{key}` is not supported by the {dialect} dialect",
                self.tag()
            )));
        }

        let p1 = dialect.placeholder(cursor + 1);
        let next = cursor + self.arity();

        let sql = match self {
            Operator::Eq => format!("{key} = {p1}"),
            Operator::Ne => format!("{key} != {p1}"),
            Operator::Gt => format!("{key} > {p1}"),
            Operator::Gte => format!("{key} >= {p1}"),
            Operator::Lt => format!("{key} < {p1}"),
            Operator::Lte => format!("{key} <= {p1}"),
            Operator::Custom => {
                let sign = sign.ok_or_else(|| {
                    DbError::validation(format!("`$custom` on `{key}` requires a sign"))
                })?;
                // A `?` in the sign would read as an extra placeholder.
                if !dialect.is_numbered() && sign.contains('?') {
                    return Err(DbError::validation(format!(
                        "`$custom` sign `{sign}` on `{key}` contains `?`, which the {dialect} \
                         dialect uses as its placeholder"
                    )));
                }
                format!("{key} {sign} {p1}")
            }
            Operator::Between | Operator::NotBetween => {
                let p2 = dialect.placeholder(cursor + 2);
                let op = if self == Operator::Between {
                    "BETWEEN"
                } else {
                    "NOT BETWEEN"
                };
                format!("{key} {op} {p1} AND {p2}")
            }
            Operator::In => match dialect {
                Dialect::Numbered => format!("{key} = ANY({p1})"),
                Dialect::Unnumbered => format!("{key} IN ({p1})"),
            },
            Operator::NotIn => match dialect {
                Dialect::Numbered => format!("NOT ({key} = ANY({p1}))"),
                Dialect::Unnumbered => format!("{key} NOT IN ({p1})"),
            },
            Operator::Like => format!("{key} LIKE {p1}"),
            Operator::NotLike => format!("{key} NOT LIKE {p1}"),
            Operator::ILike => match dialect {
                Dialect::Numbered => format!("{key} ILIKE {p1}"),
                Dialect::Unnumbered => format!("LOWER({key}) LIKE LOWER({p1})"),
            },
            Operator::NotILike => match dialect {
                Dialect::Numbered => format!("{key} NOT ILIKE {p1}"),
                Dialect::Unnumbered => format!("LOWER({key}) NOT LIKE LOWER({p1})"),
            },
            Operator::IsNull => format!("{key} IS NULL"),
            Operator::IsNotNull => format!("{key} IS NOT NULL"),
            Operator::Contains => format!("{key} @> {p1}"),
            Operator::ContainedBy => format!("{key} <@ {p1}"),
            Operator::Overlap => format!("{key} && {p1}"),
            Operator::Regex => format!("{key} ~ {p1}"),
            Operator::IRegex => format!("{key} ~* {p1}"),
            Operator::NotRegex => format!("{key} !~ {p1}"),
            Operator::NotIRegex => format!("{key} !~* {p1}"),
            Operator::JsonPath => format!("{key} @? {p1}"),
            Operator::JsonPathMatch => format!("{key} @@ {p1}"),
        };

        Ok((sql, next))
    }
}

/// Characters a `$custom` sign may be made of.
const SIGN_CHARS: &str = "+-*/<>=~!@#%^&|?";

/// Validate a `$custom` operator sign.
pub(crate) fn validate_sign(key: &str, sign: &str) -> DbResult<()> {
    if sign.is_empty() || !sign.chars().all(|c| SIGN_CHARS.contains(c)) {
        return Err(DbError::validation(format!(
            "invalid `$custom` sign `{sign}` on `{key}`; allowed characters: {SIGN_CHARS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_table() {
        assert_eq!(Operator::IsNull.arity(), 0);
        assert_eq!(Operator::IsNotNull.arity(), 0);
        assert_eq!(Operator::Between.arity(), 2);
        assert_eq!(Operator::NotBetween.arity(), 2);
        assert_eq!(Operator::In.arity(), 1);
        assert_eq!(Operator::Eq.arity(), 1);
    }

    #[test]
    fn tags_round_trip() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_tag(op.tag()).unwrap(), op);
        }
    }

    #[test]
    fn unknown_tag_lists_valid_set() {
        let err = Operator::from_tag("$approx").unwrap_err();
        let msg = err.to_string();
        assert!(err.is_validation());
        assert!(msg.contains("$approx"));
        assert!(msg.contains("$between"));
        assert!(msg.contains("$nin"));
    }

    #[test]
    fn between_numbered() {
        let (sql, next) = Operator::Between.render("a", None, 0, Dialect::Numbered).unwrap();
        assert_eq!(sql, "a BETWEEN $1 AND $2");
        assert_eq!(next, 2);
    }

    #[test]
    fn null_check_has_no_placeholder() {
        let (sql, next) = Operator::IsNull
            .render("deleted_at", None, 4, Dialect::Numbered)
            .unwrap();
        assert_eq!(sql, "deleted_at IS NULL");
        assert_eq!(next, 4);
    }

    #[test]
    fn in_list_binds_one_array() {
        let (sql, next) = Operator::In.render("id", None, 2, Dialect::Numbered).unwrap();
        assert_eq!(sql, "id = ANY($3)");
        assert_eq!(next, 3);

        let (sql, next) = Operator::NotIn.render("id", None, 2, Dialect::Unnumbered).unwrap();
        assert_eq!(sql, "id NOT IN (?)");
        assert_eq!(next, 3);
    }

    #[test]
    fn unnumbered_still_counts() {
        let (sql, next) = Operator::Gte.render("age", None, 7, Dialect::Unnumbered).unwrap();
        assert_eq!(sql, "age >= ?");
        assert_eq!(next, 8);
    }

    #[test]
    fn custom_sign() {
        let (sql, _) = Operator::Custom
            .render("ip", Some("<<="), 0, Dialect::Numbered)
            .unwrap();
        assert_eq!(sql, "ip <<= $1");
        assert!(validate_sign("ip", "<<=").is_ok());
        assert!(validate_sign("ip", "= 1; DROP TABLE x; --").is_err());
        assert!(validate_sign("ip", "").is_err());
    }

    #[test]
    fn question_mark_sign_only_for_numbered() {
        let (sql, next) = Operator::Custom
            .render("meta", Some("?|"), 0, Dialect::Numbered)
            .unwrap();
        assert_eq!(sql, "meta ?| $1");
        assert_eq!(next, 1);

        let err = Operator::Custom
            .render("meta", Some("?|"), 0, Dialect::Unnumbered)
            .unwrap_err();
        assert!(err.is_validation());
        assert!(Operator::Custom.render("meta", Some("?"), 0, Dialect::Unnumbered).is_err());
        assert!(Operator::Custom.render("n", Some("<=>"), 0, Dialect::Unnumbered).is_ok());
    }

    #[test]
    fn postgres_only_rejected_for_unnumbered() {
        let err = Operator::Contains
            .render("tags", None, 0, Dialect::Unnumbered)
            .unwrap_err();
        assert!(err.is_validation());
        assert!(Operator::Contains.render("tags", None, 0, Dialect::Numbered).is_ok());
    }
}
