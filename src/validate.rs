//! Syntax validation of declared schema files.
//!
//! Every declared file is parsed with a Postgres-grammar parser before the
//! shadow or the live database is touched; the first failure aborts the
//! reconcile with a file/line/column diagnostic. Validation never mutates
//! anything.

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Tokenizer;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file.display(),
            self.line,
            self.column,
            self.message
        )
    }
}

impl std::error::Error for ValidationError {}

/// Validate one declared schema file. Empty (after trim) is valid.
pub fn validate_schema_sql(file: &Path, content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Ok(());
    }

    let dialect = PostgreSqlDialect {};

    // Tokenize first: tokenizer failures carry a structured location, which
    // beats scraping it out of an error message.
    let tokens = match Tokenizer::new(&dialect, content).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            let (line, column) = (e.location.line.max(1) as usize, e.location.column.max(1) as usize);
            return Err(ValidationError {
                file: file.to_path_buf(),
                line,
                column,
                message: e.message,
            });
        }
    };

    match Parser::new(&dialect).with_tokens(tokens).parse_statements() {
        Ok(_) => Ok(()),
        Err(e) => {
            let message = e.to_string();
            let (line, column) = location_from_message(&message).unwrap_or((1, 1));
            Err(ValidationError {
                file: file.to_path_buf(),
                line,
                column,
                message,
            })
        }
    }
}

/// Parser errors report their position as an `at Line: N, Column: M` suffix;
/// recover it. Tolerates the colon-less `Column M` spelling older releases
/// used.
fn location_from_message(message: &str) -> Option<(usize, usize)> {
    let idx = message.rfind(" at Line: ")?;
    let rest = &message[idx + " at Line: ".len()..];
    let (line_str, rest) = rest.split_once(',')?;
    let line: usize = line_str.trim().parse().ok()?;

    let rest = rest.trim_start();
    let rest = rest.strip_prefix("Column")?;
    let rest = rest.trim_start_matches(':').trim_start();
    let column: usize = rest
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()?;

    Some((line, column))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> PathBuf {
        PathBuf::from("schemas/a.sql")
    }

    #[test]
    fn test_valid_sql() {
        assert!(validate_schema_sql(&file(), "CREATE TABLE t (id int);").is_ok());
    }

    #[test]
    fn test_empty_file_is_valid() {
        assert!(validate_schema_sql(&file(), "").is_ok());
        assert!(validate_schema_sql(&file(), "  \n\t ").is_ok());
    }

    #[test]
    fn test_multi_statement_file() {
        let sql = "CREATE TABLE a (id int);\nCREATE INDEX a_idx ON a (id);";
        assert!(validate_schema_sql(&file(), sql).is_ok());
    }

    #[test]
    fn test_misspelled_keyword_is_rejected() {
        let err = validate_schema_sql(&file(), "CREATE TABL t();").unwrap_err();
        assert_eq!(err.file, file());
        assert!(err.message.contains("Expected"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_unterminated_string_reports_location() {
        let err = validate_schema_sql(&file(), "CREATE TABLE t (id int);\nSELECT 'oops;").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_error_display_includes_position() {
        let err = ValidationError {
            file: file(),
            line: 3,
            column: 7,
            message: "Expected something".to_string(),
        };
        assert_eq!(err.to_string(), "schemas/a.sql:3:7: Expected something");
    }

    #[test]
    fn test_location_from_message() {
        assert_eq!(
            location_from_message("Expected: foo, found: bar at Line: 2, Column: 14"),
            Some((2, 14))
        );
        assert_eq!(
            location_from_message("Expected: foo, found: bar at Line: 2, Column 14"),
            Some((2, 14))
        );
        assert_eq!(location_from_message("no location here"), None);
    }
}
