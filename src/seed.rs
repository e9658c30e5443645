//! Seed execution against the live database.
//!
//! Dev-mode seeding always re-executes: schema resets would otherwise lose
//! seeded data, so idempotence is the seed author's concern, not ours. The
//! `seed_files` table records `(path, hash)` per file — the upsert rides in
//! the same transaction as the seed statements.

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Config;
use crate::constants::{SEED_FILES_TABLE, TRACKING_SCHEMA};
use crate::db::{PgErrorContext, connect_once};
use crate::hasher::file_digest;

/// Run seeding: the configured shell command when present, the internal
/// runner otherwise. A no-op when seeding is disabled.
pub async fn run_seeds(config: &Config, root: &Path) -> Result<()> {
    if !config.seed_enabled {
        debug!("Seeding disabled, skipping");
        return Ok(());
    }

    if let Some(command) = &config.seed_on_change {
        return run_seed_command(command, root).await;
    }

    run_internal_seeds(config).await
}

/// Delegate seeding to the user's command, run from the project root with
/// stdio forwarded.
async fn run_seed_command(command: &str, root: &Path) -> Result<()> {
    println!("Running seed command: {command}");
    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(root)
        .status()
        .await
        .with_context(|| format!("Failed to run seed command: {command}"))?;

    if !status.success() {
        return Err(anyhow!("Seed command exited with {status}"));
    }
    Ok(())
}

async fn run_internal_seeds(config: &Config) -> Result<()> {
    let files = resolve_seed_files(&config.seed_globs)?;
    if files.is_empty() {
        println!("No seed files found");
        return Ok(());
    }

    let mut conn = connect_once(&config.database.url()).await?;

    sqlx::raw_sql(&format!(
        "CREATE SCHEMA IF NOT EXISTS {TRACKING_SCHEMA};\n\
         CREATE TABLE IF NOT EXISTS {TRACKING_SCHEMA}.{SEED_FILES_TABLE} (\n\
             path TEXT PRIMARY KEY,\n\
             hash TEXT NOT NULL\n\
         );"
    ))
    .execute(&mut conn)
    .await
    .context("Failed to create seed tracking table")?;

    for path in &files {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
        let hash = file_digest(path)?;
        let display_path = path.to_string_lossy();

        debug!(target: "dev::sql", "Seeding {}", display_path);

        // Statements and the hash upsert commit together
        let mut tx = sqlx::Connection::begin(&mut conn)
            .await
            .context("Failed to begin seed transaction")?;

        sqlx::raw_sql(&content)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                anyhow!("{}", PgErrorContext::from_sqlx_error(&e, &content).format(&display_path))
            })?;

        sqlx::query(&format!(
            "INSERT INTO {TRACKING_SCHEMA}.{SEED_FILES_TABLE} (path, hash) VALUES ($1, $2) \
             ON CONFLICT (path) DO UPDATE SET hash = EXCLUDED.hash"
        ))
        .bind(display_path.as_ref())
        .bind(&hash)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to record seed file {display_path}"))?;

        tx.commit().await.context("Failed to commit seed")?;
        println!("Seeded {display_path}");
    }

    Ok(())
}

/// Resolve the configured seed globs to concrete files, deduplicated and
/// sorted.
pub fn resolve_seed_files(seed_globs: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in seed_globs {
        let paths = glob::glob(pattern)
            .with_context(|| format!("Invalid seed glob: {pattern}"))?;
        for path in paths {
            let path = path.with_context(|| format!("Failed to resolve seed glob: {pattern}"))?;
            if path.is_file() {
                files.push(path);
            }
        }
    }
    Ok(files.into_iter().sorted().dedup().collect())
}
