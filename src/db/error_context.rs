//! Structured context for Postgres execution errors.
//!
//! Pulled from `PgDatabaseError` fields, never parsed out of the display
//! string. Used wherever SQL is executed: migration apply, declared-schema
//! apply, diff apply, seeding.

use sqlx::postgres::{PgDatabaseError, PgErrorPosition};

#[derive(Debug, Clone)]
pub struct PgErrorContext {
    pub message: String,
    /// Line within the statement, derived from the server-reported position
    pub line: Option<usize>,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// e.g. PL/pgSQL frame information
    pub where_: Option<String>,
    pub code: Option<String>,
}

impl PgErrorContext {
    pub fn from_sqlx_error(error: &sqlx::Error, sql: &str) -> Self {
        if let Some(db_error) = error.as_database_error()
            && let Some(pg_error) = db_error.try_downcast_ref::<PgDatabaseError>()
        {
            let position = pg_error.position().map(|pos| match pos {
                PgErrorPosition::Original(p) => p,
                PgErrorPosition::Internal { position, .. } => position,
            });

            return Self {
                message: pg_error.message().to_string(),
                line: position.map(|p| position_to_line(sql, p)),
                detail: pg_error.detail().map(|s| s.to_string()),
                hint: pg_error.hint().map(|s| s.to_string()),
                where_: pg_error.r#where().map(|s| s.to_string()),
                code: Some(pg_error.code().to_string()),
            };
        }

        Self {
            message: error.to_string(),
            line: None,
            detail: None,
            hint: None,
            where_: None,
            code: None,
        }
    }

    /// Render for the user, prefixed with where the statement came from
    /// ("statement 3/7", "migrations/0001_init.sql", ...).
    pub fn format(&self, source: &str) -> String {
        let mut msg = format!("{source}: {}", self.message);

        if let Some(line) = self.line {
            msg.push_str(&format!(" (line {line})"));
        }
        if let Some(detail) = &self.detail {
            msg.push_str(&format!("\n  Detail: {detail}"));
        }
        if let Some(hint) = &self.hint {
            msg.push_str(&format!("\n  Hint: {hint}"));
        }
        if let Some(where_) = &self.where_ {
            msg.push_str(&format!("\n  Context: {where_}"));
        }
        msg
    }
}

/// Postgres reports a 1-indexed character position (not a byte offset);
/// count newlines character-wise so non-ASCII content cannot skew the line
/// or split a UTF-8 sequence.
fn position_to_line(sql: &str, position: usize) -> usize {
    sql.chars()
        .take(position.saturating_sub(1))
        .filter(|c| *c == '\n')
        .count()
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_to_line() {
        let sql = "CREATE TABLE a (\n  id int\n);";
        assert_eq!(position_to_line(sql, 1), 1);
        assert_eq!(position_to_line(sql, 18), 2);
        assert_eq!(position_to_line(sql, 10_000), 3);
    }

    #[test]
    fn test_position_to_line_counts_characters_not_bytes() {
        // "é" is two bytes but one character; the reported position is
        // character-based
        let sql = "-- café\nSELECT x;";
        // Position 9 is the 'S' right after the newline
        assert_eq!(position_to_line(sql, 9), 2);
        // A position landing inside the multi-byte character must not panic
        assert_eq!(position_to_line(sql, 7), 1);
    }

    #[test]
    fn test_format_includes_extras() {
        let ctx = PgErrorContext {
            message: "relation \"t\" does not exist".to_string(),
            line: Some(2),
            detail: None,
            hint: Some("Perhaps you meant \"ts\".".to_string()),
            where_: None,
            code: Some("42P01".to_string()),
        };
        let rendered = ctx.format("statement 1/3");
        assert!(rendered.starts_with("statement 1/3: relation"));
        assert!(rendered.contains("(line 2)"));
        assert!(rendered.contains("Hint:"));
    }
}
