//! Identifier checks for caller-supplied names that end up in SQL text
//! unparameterized (search fields, order-by fields, join targets, subquery
//! aliases).
//!
//! Accepted: dotted paths of parts, where each part is either
//! `[A-Za-z_][A-Za-z0-9_$]*` or a `"quoted"` name (`""` escapes a quote).
//! Search fields may also be a single-argument function call over such a
//! path, so HAVING can filter on aggregates: `COUNT(*)`, `SUM(o.total)`,
//! `COUNT(DISTINCT user_id)`.

use crate::error::{DbError, DbResult};

/// Check that `name` is a plain or dotted SQL identifier.
pub fn validate_ident(name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::validation("identifier cannot be empty"));
    }
    if name.contains('\0') {
        return Err(DbError::validation("identifier cannot contain NUL"));
    }

    let chars: Vec<char> = name.chars().collect();
    let mut pos = 0;
    loop {
        pos = if chars.get(pos) == Some(&'"') {
            quoted_part(name, &chars, pos)?
        } else {
            bare_part(name, &chars, pos)?
        };

        match chars.get(pos) {
            None => return Ok(()),
            Some('.') if pos + 1 < chars.len() => pos += 1,
            Some('.') => {
                return Err(DbError::validation(format!("trailing `.` in identifier `{name}`")));
            }
            Some(c) => {
                return Err(DbError::validation(format!(
                    "unexpected `{c}` in identifier `{name}`"
                )));
            }
        }
    }
}

/// Check a single-part identifier (no dots), e.g. an alias.
pub fn validate_alias(alias: &str) -> DbResult<()> {
    validate_ident(alias)?;
    let chars: Vec<char> = alias.chars().collect();
    let end = if chars.first() == Some(&'"') {
        quoted_part(alias, &chars, 0)?
    } else {
        bare_part(alias, &chars, 0)?
    };
    if end != chars.len() {
        return Err(DbError::validation(format!("alias `{alias}` cannot be dotted")));
    }
    Ok(())
}

/// Check a search field: an identifier or `func(*)` / `func([DISTINCT ]ident)`.
pub fn validate_field(field: &str) -> DbResult<()> {
    let Some(open) = field.find('(') else {
        return validate_ident(field);
    };
    let invalid = || DbError::validation(format!("invalid field expression `{field}`"));

    let func = &field[..open];
    let chars: Vec<char> = func.chars().collect();
    if chars.is_empty() || bare_part(field, &chars, 0)? != chars.len() {
        return Err(invalid());
    }
    let arg = field[open + 1..].strip_suffix(')').ok_or_else(invalid)?.trim();
    if arg == "*" {
        return Ok(());
    }
    let arg = match arg.get(..9) {
        Some(prefix) if prefix.eq_ignore_ascii_case("DISTINCT ") => arg[9..].trim_start(),
        _ => arg,
    };
    validate_ident(arg).map_err(|_| invalid())
}

fn bare_part(name: &str, chars: &[char], start: usize) -> DbResult<usize> {
    match chars.get(start) {
        Some(c) if *c == '_' || c.is_ascii_alphabetic() => {}
        Some(c) => {
            return Err(DbError::validation(format!(
                "identifier `{name}` has a part starting with `{c}`"
            )));
        }
        None => return Err(DbError::validation(format!("empty part in identifier `{name}`"))),
    }
    let len = chars[start..]
        .iter()
        .take_while(|c| **c == '_' || **c == '$' || c.is_ascii_alphanumeric())
        .count();
    Ok(start + len)
}

fn quoted_part(name: &str, chars: &[char], start: usize) -> DbResult<usize> {
    let mut pos = start + 1;
    let mut empty = true;
    loop {
        match chars.get(pos) {
            Some('"') if chars.get(pos + 1) == Some(&'"') => {
                empty = false;
                pos += 2;
            }
            Some('"') if empty => {
                return Err(DbError::validation(format!("empty quoted part in `{name}`")));
            }
            Some('"') => return Ok(pos + 1),
            Some(_) => {
                empty = false;
                pos += 1;
            }
            None => return Err(DbError::validation(format!("unclosed quote in `{name}`"))),
        }
    }
}
