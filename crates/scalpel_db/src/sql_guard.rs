//! Read-only SQL guard.
//!
//! Ad-hoc queries from the path mapper are checked here before they reach a
//! connection. Comments and quoted text are blanked out first so keywords
//! inside them never count.

use thiserror::Error;

const ALLOWED_PREFIXES: &[&str] = &["SELECT", "WITH", "EXPLAIN"];
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "ATTACH", "DETACH",
    "PRAGMA", "VACUUM", "REINDEX",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlGuardError {
    #[error("Query is empty")]
    Empty,
    #[error("Multiple statements are not allowed")]
    MultipleStatements,
    #[error("Query must start with SELECT, WITH, or EXPLAIN (found {0})")]
    NotAQuery(String),
    #[error("Query contains forbidden keyword: {0}")]
    Forbidden(String),
}

/// Validate that `sql` is a single read-only statement.
pub fn validate_read_only(sql: &str) -> Result<(), SqlGuardError> {
    let sanitized = sanitize_sql(sql);
    if sanitized.trim().is_empty() {
        return Err(SqlGuardError::Empty);
    }

    validate_single_statement(&sanitized)?;

    let tokens = tokens_upper(&sanitized);
    match tokens.first() {
        Some(first) if ALLOWED_PREFIXES.contains(&first.as_str()) => {}
        Some(first) => return Err(SqlGuardError::NotAQuery(first.clone())),
        None => return Err(SqlGuardError::NotAQuery("nothing".to_string())),
    }

    if let Some(bad) = tokens
        .iter()
        .find(|t| FORBIDDEN_KEYWORDS.contains(&t.as_str()))
    {
        return Err(SqlGuardError::Forbidden(bad.clone()));
    }

    Ok(())
}

/// Drop a single trailing `;` so the statement can be wrapped or prepared.
pub fn strip_trailing_semicolon(sql: &str) -> &str {
    let trimmed = sql.trim();
    match trimmed.strip_suffix(';') {
        Some(stripped) => stripped.trim_end(),
        None => trimmed,
    }
}

fn validate_single_statement(sanitized: &str) -> Result<(), SqlGuardError> {
    let body = strip_trailing_semicolon(sanitized);
    if body.contains(';') {
        return Err(SqlGuardError::MultipleStatements);
    }
    Ok(())
}

fn tokens_upper(sql: &str) -> Vec<String> {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_uppercase())
        .collect()
}

/// Replace comments and quoted text with spaces, keeping byte offsets stable.
fn sanitize_sql(sql: &str) -> String {
    #[derive(Clone, Copy)]
    enum State {
        Code,
        Single,
        Double,
        Bracket,
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut state = State::Code;

    while let Some(ch) = chars.next() {
        match state {
            State::LineComment => {
                if ch == '\n' {
                    state = State::Code;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Code;
                    out.push(' ');
                }
                out.push(' ');
            }
            State::Single => {
                if ch == '\'' {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        out.push(' ');
                    } else {
                        state = State::Code;
                    }
                }
                out.push(' ');
            }
            State::Double => {
                if ch == '"' {
                    state = State::Code;
                }
                out.push(' ');
            }
            State::Bracket => {
                if ch == ']' {
                    state = State::Code;
                }
                out.push(' ');
            }
            State::Code => match ch {
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                    out.push_str("  ");
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                    out.push_str("  ");
                }
                '\'' => {
                    state = State::Single;
                    out.push(' ');
                }
                '"' => {
                    state = State::Double;
                    out.push(' ');
                }
                '[' => {
                    state = State::Bracket;
                    out.push(' ');
                }
                _ => out.push(ch),
            },
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_read_only_basic() {
        assert!(validate_read_only("SELECT * FROM mp4_status").is_ok());
        assert!(validate_read_only("with m AS (SELECT 1) SELECT * FROM m").is_ok());
        assert!(validate_read_only("EXPLAIN SELECT * FROM mp4_status").is_ok());
        assert!(validate_read_only("INSERT INTO mp4_status VALUES (1)").is_err());
        assert!(validate_read_only("DELETE FROM mp4_status").is_err());
        assert!(validate_read_only("DROP TABLE mp4_status").is_err());
        assert!(validate_read_only("UPDATE mp4_status SET value = 1").is_err());
        assert_eq!(
            validate_read_only("PRAGMA table_info(x)"),
            Err(SqlGuardError::NotAQuery("PRAGMA".to_string()))
        );
    }

    #[test]
    fn test_empty_and_comment_only() {
        assert_eq!(validate_read_only("   "), Err(SqlGuardError::Empty));
        assert_eq!(validate_read_only("-- nothing"), Err(SqlGuardError::Empty));
    }

    #[test]
    fn test_keywords_inside_comments_and_literals_are_ignored() {
        assert!(validate_read_only("SELECT 1 -- DELETE FROM mp4_status").is_ok());
        assert!(validate_read_only("SELECT 1 /* DROP */ FROM mp4_status").is_ok());
        assert!(validate_read_only("SELECT * FROM mp4_status WHERE comments = 'drop; it'").is_ok());
        assert!(validate_read_only("SELECT \"update\" FROM t").is_ok());
    }

    #[test]
    fn test_multiple_statements() {
        assert_eq!(
            validate_read_only("SELECT 1; DROP TABLE mp4_status"),
            Err(SqlGuardError::MultipleStatements)
        );
        assert!(validate_read_only("SELECT 1;\nSELECT 2").is_err());
        assert!(validate_read_only("SELECT 1; ").is_ok());
    }

    #[test]
    fn test_nested_mutation_rejected() {
        assert_eq!(
            validate_read_only("WITH x AS (DELETE FROM t RETURNING *) SELECT * FROM x"),
            Err(SqlGuardError::Forbidden("DELETE".to_string()))
        );
    }

    #[test]
    fn test_strip_trailing_semicolon() {
        assert_eq!(strip_trailing_semicolon(" SELECT 1 ; "), "SELECT 1");
        assert_eq!(strip_trailing_semicolon("SELECT 1"), "SELECT 1");
    }
}
