//! Committed-migration execution against the shadow database.
//!
//! The shadow's working database must contain exactly the state produced by
//! the committed history before declared schemas are applied on top. Each
//! `migrations/*.sql` runs in filename order and is recorded in the shadow's
//! tracking table; the live database's history is never touched here.

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tracing::debug;

use crate::constants::{MIGRATIONS_DIR, SCHEMA_MIGRATIONS_TABLE, TRACKING_SCHEMA};
use crate::db::{PgErrorContext, connect_once};
use crate::hasher::migration_files;

/// Apply every committed migration to the database at `url`, in filename
/// order, recording each version in the tracking table.
pub async fn apply_migrations(url: &str, root: &Path) -> Result<usize> {
    let files = migration_files(&root.join(MIGRATIONS_DIR))?;
    let mut conn = connect_once(url).await?;

    sqlx::raw_sql(&format!(
        "CREATE SCHEMA IF NOT EXISTS {TRACKING_SCHEMA};\n\
         CREATE TABLE IF NOT EXISTS {TRACKING_SCHEMA}.{SCHEMA_MIGRATIONS_TABLE} (\n\
             version TEXT PRIMARY KEY,\n\
             name TEXT,\n\
             applied_at TIMESTAMPTZ NOT NULL DEFAULT now()\n\
         );"
    ))
    .execute(&mut conn)
    .await
    .context("Failed to create migration tracking table")?;

    let mut applied = 0;
    for path in &files {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !filename.ends_with(".sql") {
            continue;
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read migration: {}", path.display()))?;

        debug!(target: "dev::sql", "Applying migration {}", filename);
        sqlx::raw_sql(&content)
            .execute(&mut conn)
            .await
            .map_err(|e| {
                anyhow!(
                    "{}",
                    PgErrorContext::from_sqlx_error(&e, &content)
                        .format(&format!("{MIGRATIONS_DIR}/{filename}"))
                )
            })?;

        sqlx::query(&format!(
            "INSERT INTO {TRACKING_SCHEMA}.{SCHEMA_MIGRATIONS_TABLE} (version, name) \
             VALUES ($1, $2) ON CONFLICT (version) DO NOTHING"
        ))
        .bind(version_of(&filename))
        .bind(&filename)
        .execute(&mut conn)
        .await
        .with_context(|| format!("Failed to record migration {filename}"))?;

        applied += 1;
    }

    Ok(applied)
}

/// Committed migrations are named `<timestamp>_<name>.sql`; the version is
/// the prefix before the first underscore.
pub fn version_of(filename: &str) -> &str {
    let stem = filename.strip_suffix(".sql").unwrap_or(filename);
    stem.split_once('_').map_or(stem, |(version, _)| version)
}
