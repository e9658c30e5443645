//! External differ invocation and output classification.
//!
//! The hard SQL comparison is delegated to a one-shot differ container that
//! reads both databases and prints the migration script. Its exit-code
//! contract: 0 = no changes (or, defensively, a script on stdout anyway),
//! 2 = changes detected with the script on stdout, anything else = failure
//! with diagnostics on stderr.

use anyhow::{Result, anyhow};
use std::time::Instant;
use tracing::debug;

use crate::constants::DIFF_IMAGE;
use crate::docker::DockerManager;
use crate::sql_split::{leading_keyword, split_sql};

/// Outcome of one diff run. Constructed per reconcile, consumed immediately.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub sql: String,
    pub has_drops: bool,
    pub drops: Vec<String>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

/// Diff the live database (source) against the shadow (target), returning
/// the SQL that would bring the live database to the shadow's state.
pub async fn run_differ(
    docker: &DockerManager,
    source_url: &str,
    target_url: &str,
) -> Result<DiffResult> {
    let started = Instant::now();
    let output = docker
        .run_once(
            DIFF_IMAGE,
            vec![
                "migra".to_string(),
                "--unsafe".to_string(),
                "--with-privileges".to_string(),
                source_url.to_string(),
                target_url.to_string(),
            ],
        )
        .await?;
    debug!(target: "dev::timing", "Differ finished in {:?}", started.elapsed());

    let sql = classify_output(output.exit_code, &output.stdout, &output.stderr)?;
    Ok(from_sql(sql))
}

/// Map the differ's exit code and streams to the diff SQL.
fn classify_output(exit_code: i64, stdout: &str, stderr: &str) -> Result<String> {
    match exit_code {
        0 => {
            let trimmed = stdout.trim();
            if trimmed.is_empty() || trimmed.to_lowercase().contains("no changes") {
                Ok(String::new())
            } else {
                // Unexpected but usable: treat stdout as the script
                Ok(stdout.to_string())
            }
        }
        2 => Ok(stdout.to_string()),
        code => Err(anyhow!(
            "Differ failed with exit code {}:\n{}",
            code,
            if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            }
        )),
    }
}

/// Build the result, scanning statements for leading `DROP` keywords.
fn from_sql(sql: String) -> DiffResult {
    let drops: Vec<String> = split_sql(&sql)
        .into_iter()
        .filter(|stmt| leading_keyword(stmt).as_deref() == Some("DROP"))
        .collect();

    DiffResult {
        has_drops: !drops.is_empty(),
        drops,
        sql,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_zero_empty_stdout() {
        let sql = classify_output(0, "", "").unwrap();
        assert!(sql.is_empty());
    }

    #[test]
    fn test_exit_zero_no_changes_message() {
        let sql = classify_output(0, "No Changes Detected\n", "").unwrap();
        assert!(sql.is_empty());
    }

    #[test]
    fn test_exit_zero_with_output_is_kept() {
        let sql = classify_output(0, "ALTER TABLE t ADD COLUMN x int;\n", "").unwrap();
        assert!(sql.contains("ALTER TABLE"));
    }

    #[test]
    fn test_exit_two_is_success() {
        let sql = classify_output(2, "CREATE TABLE t (id integer);\n", "").unwrap();
        assert!(sql.contains("CREATE TABLE"));
    }

    #[test]
    fn test_other_exit_codes_fail_with_stderr() {
        let err = classify_output(1, "", "connection refused").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_drop_detection() {
        let result = from_sql(
            "ALTER TABLE t ADD COLUMN y int;\nDROP TABLE old_stuff;\ndrop index old_idx;\n"
                .to_string(),
        );
        assert!(result.has_drops);
        assert_eq!(result.drops.len(), 2);
        assert_eq!(result.drops[0], "DROP TABLE old_stuff");
        assert_eq!(result.drops[1], "drop index old_idx");
    }

    #[test]
    fn test_drop_inside_comment_not_counted() {
        let result = from_sql("-- DROP nothing\nALTER TABLE t ADD COLUMN y int;\n".to_string());
        assert!(!result.has_drops);
        assert!(result.drops.is_empty());
    }

    #[test]
    fn test_empty_diff() {
        let result = from_sql(String::new());
        assert!(result.is_empty());
        assert!(!result.has_drops);
    }
}
