//! Placeholder dialects.

use serde::Deserialize;
use std::fmt;

/// Placeholder style of the target client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `$1, $2, ...` (PostgreSQL)
    #[default]
    Numbered,
    /// A repeated `?`; binding order is occurrence order (MySQL-style clients).
    Unnumbered,
}

impl Dialect {
    /// Placeholder text for the given 1-based parameter index.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Numbered => format!("${index}"),
            Dialect::Unnumbered => "?".to_string(),
        }
    }

    /// Whether placeholder text encodes its position.
    pub fn is_numbered(self) -> bool {
        matches!(self, Dialect::Numbered)
    }

    /// Shift every `$n` in `sql` by `offset`.
    ///
    /// Used when precompiled text (a frozen subquery) is spliced into a statement
    /// whose cursor has already advanced. A no-op for the unnumbered dialect.
    /// Quoted literals and identifiers are copied untouched, and so is a `$`
    /// that continues a bare identifier (`price$1`).
    pub fn shift_placeholders(self, sql: &str, offset: usize) -> String {
        if offset == 0 || !self.is_numbered() {
            return sql.to_string();
        }

        let mut result = String::with_capacity(sql.len() + 8);
        let mut chars = sql.chars().peekable();
        let mut quote: Option<char> = None;

        while let Some(ch) = chars.next() {
            if let Some(q) = quote {
                result.push(ch);
                if ch == q {
                    quote = None;
                }
                continue;
            }
            match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    result.push(ch);
                }
                '$' if result.chars().next_back().is_some_and(is_ident_char) => {
                    result.push(ch);
                }
                '$' => {
                    let mut num_str = String::new();
                    while let Some(next) = chars.peek().copied() {
                        if !next.is_ascii_digit() {
                            break;
                        }
                        num_str.push(next);
                        chars.next();
                    }
                    result.push('$');
                    match num_str.parse::<usize>() {
                        Ok(idx) => result.push_str(&(idx + offset).to_string()),
                        Err(_) => result.push_str(&num_str),
                    }
                }
                _ => result.push(ch),
            }
        }

        result
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Numbered => f.write_str("numbered"),
            Dialect::Unnumbered => f.write_str("unnumbered"),
        }
    }
}
