//! Applying diff SQL to the live local database.
//!
//! Statements run in order on one dedicated connection, with no entry in the
//! migration history — dev-loop changes are uncommitted by definition. A
//! failure surfaces the statement index and text and stops; whatever the
//! server already applied stays applied.

use anyhow::{Result, anyhow};
use console::style;
use tracing::debug;

use crate::db::{PgErrorContext, connect_once};
use crate::differ::DiffResult;
use crate::sql_split::split_sql;

/// Surface destructive statements before they run. Warns and proceeds;
/// destructive operations are what a declarative workflow asked for.
pub fn warn_destructive(diff: &DiffResult) {
    if !diff.has_drops {
        return;
    }

    eprintln!(
        "{}",
        style(format!(
            "Destructive operation{} detected:",
            if diff.drops.len() == 1 { "" } else { "s" }
        ))
        .yellow()
        .bold()
    );
    for drop in &diff.drops {
        eprintln!("  {}", style(drop).yellow());
    }
}

/// Execute the diff SQL against the live database. Returns the number of
/// statements applied.
pub async fn apply_diff(live_url: &str, sql: &str) -> Result<usize> {
    let statements = split_sql(sql);
    if statements.is_empty() {
        return Ok(0);
    }

    let mut conn = connect_once(live_url).await?;
    let total = statements.len();

    for (index, statement) in statements.iter().enumerate() {
        debug!(target: "dev::sql", "Applying statement {}/{}: {}", index + 1, total, statement);
        sqlx::raw_sql(statement)
            .execute(&mut conn)
            .await
            .map_err(|e| {
                let ctx = PgErrorContext::from_sqlx_error(&e, statement);
                anyhow!(
                    "{}\n  Statement: {}",
                    ctx.format(&format!("statement {}/{}", index + 1, total)),
                    statement
                )
            })?;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::DiffResult;

    #[test]
    fn test_warn_destructive_noop_without_drops() {
        // Must not panic or print for a clean diff
        warn_destructive(&DiffResult::default());
    }

    #[tokio::test]
    async fn test_apply_empty_diff_makes_no_connection() {
        // An unreachable URL proves no connection is attempted for an empty
        // script
        let applied = apply_diff("postgres://postgres@127.0.0.1:1/none", "  \n-- only comments\n")
            .await
            .unwrap();
        assert_eq!(applied, 0);
    }
}
