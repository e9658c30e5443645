//! End-to-end watcher behaviour against a real temp tree.
//!
//! Timing windows are generous on the positive side (waiting for a tick)
//! and short on the negative side (asserting silence), to stay stable on
//! loaded CI machines.

use anyhow::Result;
use pgdev::config::{Config, ConfigBuilder};
use pgdev::watcher::SchemaWatcher;
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

const TICK_WAIT: Duration = Duration::from_secs(5);
const SILENCE_WAIT: Duration = Duration::from_millis(1200);
// Give the OS watches a moment to register before mutating the tree
const SETTLE: Duration = Duration::from_millis(250);

fn project(dir: &TempDir) -> Result<(Config, std::path::PathBuf)> {
    // Canonicalize so event paths (which the OS reports resolved) stay
    // inside the configured root
    let root = dir.path().canonicalize()?;
    fs::create_dir_all(root.join("schemas"))?;
    fs::create_dir_all(root.join("migrations"))?;
    let config = ConfigBuilder::new().resolve(&root)?;
    Ok((config, root))
}

async fn expect_tick(ticks: &mut UnboundedReceiver<Instant>) {
    tokio::time::timeout(TICK_WAIT, ticks.recv())
        .await
        .expect("expected a tick, watcher stayed silent")
        .expect("tick channel closed");
}

async fn expect_silence(ticks: &mut UnboundedReceiver<Instant>) {
    if let Ok(tick) = tokio::time::timeout(SILENCE_WAIT, ticks.recv()).await {
        panic!("expected no tick, got {tick:?}");
    }
}

#[tokio::test]
async fn test_schema_change_ticks_without_flags() -> Result<()> {
    let dir = TempDir::new()?;
    let (config, root) = project(&dir)?;

    let mut watcher = SchemaWatcher::start(&root, &config)?;
    tokio::time::sleep(SETTLE).await;

    fs::write(root.join("schemas/users.sql"), "CREATE TABLE users (id int);")?;

    expect_tick(&mut watcher.ticks).await;
    assert!(!watcher.handle.migrations_changed());
    assert!(!watcher.handle.seeds_changed());
    Ok(())
}

#[tokio::test]
async fn test_migration_change_sets_sticky_flag() -> Result<()> {
    let dir = TempDir::new()?;
    let (config, root) = project(&dir)?;

    let mut watcher = SchemaWatcher::start(&root, &config)?;
    tokio::time::sleep(SETTLE).await;

    fs::write(
        root.join("migrations/20240101000000_init.sql"),
        "CREATE TABLE t (id int);",
    )?;

    expect_tick(&mut watcher.ticks).await;
    // Read-and-clear: first read observes the flag, second does not
    assert!(watcher.handle.migrations_changed());
    assert!(!watcher.handle.migrations_changed());
    Ok(())
}

#[tokio::test]
async fn test_seed_change_sets_seed_flag() -> Result<()> {
    let dir = TempDir::new()?;
    let (config, root) = project(&dir)?;

    let mut watcher = SchemaWatcher::start(&root, &config)?;
    tokio::time::sleep(SETTLE).await;

    // The default seed glob is <root>/seed.sql
    fs::write(root.join("seed.sql"), "INSERT INTO t VALUES (1);")?;

    expect_tick(&mut watcher.ticks).await;
    assert!(watcher.handle.seeds_changed());
    assert!(!watcher.handle.migrations_changed());
    Ok(())
}

#[tokio::test]
async fn test_backup_and_temp_names_stay_silent() -> Result<()> {
    let dir = TempDir::new()?;
    let (config, root) = project(&dir)?;

    let mut watcher = SchemaWatcher::start(&root, &config)?;
    tokio::time::sleep(SETTLE).await;

    fs::write(root.join("schemas/users.sql~"), "CREATE TABLE users (id int);")?;
    fs::write(root.join("schemas/.users.sql.swp"), "vim swap")?;
    fs::write(root.join("schemas/upload.tmp"), "partial")?;
    fs::write(root.join("schemas/.#users.sql"), "lock")?;

    expect_silence(&mut watcher.ticks).await;
    Ok(())
}

#[tokio::test]
async fn test_empty_file_stays_silent() -> Result<()> {
    let dir = TempDir::new()?;
    let (config, root) = project(&dir)?;

    let mut watcher = SchemaWatcher::start(&root, &config)?;
    tokio::time::sleep(SETTLE).await;

    fs::write(root.join("schemas/half_written.sql"), "   \n\t\n")?;

    expect_silence(&mut watcher.ticks).await;
    Ok(())
}

#[tokio::test]
async fn test_unmatched_extension_stays_silent() -> Result<()> {
    let dir = TempDir::new()?;
    let (config, root) = project(&dir)?;

    let mut watcher = SchemaWatcher::start(&root, &config)?;
    tokio::time::sleep(SETTLE).await;

    fs::write(root.join("schemas/notes.md"), "# not sql")?;

    expect_silence(&mut watcher.ticks).await;
    Ok(())
}

#[tokio::test]
async fn test_new_subdirectory_is_picked_up() -> Result<()> {
    let dir = TempDir::new()?;
    let (config, root) = project(&dir)?;

    let mut watcher = SchemaWatcher::start(&root, &config)?;
    tokio::time::sleep(SETTLE).await;

    fs::create_dir(root.join("schemas/auth"))?;
    // Let the watcher register the new directory
    tokio::time::sleep(SETTLE).await;
    fs::write(root.join("schemas/auth/users.sql"), "CREATE TABLE users (id int);")?;

    expect_tick(&mut watcher.ticks).await;
    Ok(())
}

#[tokio::test]
async fn test_burst_coalesces_into_at_most_two_ticks() -> Result<()> {
    let dir = TempDir::new()?;
    let (config, root) = project(&dir)?;

    let mut watcher = SchemaWatcher::start(&root, &config)?;
    tokio::time::sleep(SETTLE).await;

    // Three writes inside one debounce window
    fs::write(root.join("schemas/a.sql"), "CREATE TABLE a (id int);")?;
    tokio::time::sleep(Duration::from_millis(40)).await;
    fs::write(root.join("schemas/b.sql"), "CREATE TABLE b (id int);")?;
    tokio::time::sleep(Duration::from_millis(40)).await;
    fs::write(root.join("schemas/c.sql"), "CREATE TABLE c (id int);")?;

    // Leading tick, plus at most one trailing tick
    expect_tick(&mut watcher.ticks).await;
    let _ = tokio::time::timeout(Duration::from_secs(1), watcher.ticks.recv()).await;
    expect_silence(&mut watcher.ticks).await;
    Ok(())
}
