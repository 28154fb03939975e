use std::sync::LazyLock;

use regex::Regex;

use super::{QueryError, QueryResult};

/// Names made only of ASCII word characters and dots are left unquoted.
static SIMPLE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.]+$").unwrap());

/// `<expression> AS <alias>` inside a select list.
static ALIASED_EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(.+?)\s+AS\s+(\S+)$").unwrap());

/// Make a caller-supplied name safe to interpolate as a single SQL identifier.
///
/// Simple names (`users`, `public.items`) come back unchanged. Anything else is
/// wrapped in double quotes with embedded quotes doubled, so even
/// `users; DROP TABLE users; --` becomes one identifier token.
pub fn escape_identifier(name: &str) -> QueryResult<String> {
    if name.is_empty() {
        return Err(QueryError::InvalidIdentifier(
            "identifier cannot be empty".into(),
        ));
    }
    if name.contains('\0') {
        return Err(QueryError::InvalidIdentifier(
            "identifier cannot contain NUL characters".into(),
        ));
    }
    if SIMPLE_IDENTIFIER.is_match(name) {
        return Ok(name.to_string());
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Escape a comma-separated projection list.
///
/// `None`, empty and `*` yield `*`. Plain column names are escaped, the alias
/// of `expr AS alias` is escaped, and any other expression (function calls,
/// casts, arithmetic) is passed through as written. Telling a hostile
/// expression from a legitimate one would need a full SQL parser, so
/// expressions are the caller's responsibility.
pub fn escape_select_clause(clause: Option<&str>) -> QueryResult<String> {
    let clause = match clause.map(str::trim) {
        None | Some("") | Some("*") => return Ok("*".to_string()),
        Some(clause) => clause,
    };

    let parts = clause
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(escape_select_part)
        .collect::<QueryResult<Vec<_>>>()?;

    if parts.is_empty() {
        return Ok("*".to_string());
    }
    Ok(parts.join(", "))
}

fn escape_select_part(part: &str) -> QueryResult<String> {
    if part == "*" {
        return Ok(part.to_string());
    }
    if let Some(caps) = ALIASED_EXPRESSION.captures(part) {
        let alias = escape_identifier(&caps[2])?;
        return Ok(format!("{} AS {}", caps[1].trim(), alias));
    }
    if SIMPLE_IDENTIFIER.is_match(part) {
        return escape_identifier(part);
    }
    Ok(part.to_string())
}
