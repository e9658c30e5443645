//! The dev session: a long-running reconcile loop.
//!
//! Startup does one full sync, then the loop selects over shutdown signals,
//! watcher ticks, and watcher errors. Every reconcile is a catch-point —
//! failures are reported and swallowed so the next edit gets a fresh chance;
//! only fatal watcher errors and shutdown end the session.

use anyhow::{Context, Result, anyhow};
use console::style;
use sqlx::PgPool;
use std::path::Path;
use std::time::Instant;
use tokio::signal;
use tracing::debug;

use crate::apply::{apply_diff, warn_destructive};
use crate::config::Config;
use crate::constants::SCHEMAS_DIR;
use crate::db;
use crate::differ::run_differ;
use crate::schema_files::load_declared_schemas;
use crate::seed::run_seeds;
use crate::shadow::ShadowManager;
use crate::typegen::generate_types;
use crate::validate::validate_schema_sql;
use crate::watcher::{SchemaWatcher, WatcherHandle};

pub async fn run_dev_session(config: &Config, root: &Path) -> Result<()> {
    println!("Starting pgdev in watch mode");
    println!("Press Ctrl+C to stop");

    let live_pool = db::connect_with_retry(&config.database.url())
        .await
        .context("Local database must be running before starting a dev session")?;

    let schemas_dir = root.join(SCHEMAS_DIR);
    std::fs::create_dir_all(&schemas_dir)
        .with_context(|| format!("Failed to create {}", schemas_dir.display()))?;

    let SchemaWatcher {
        mut ticks,
        mut errors,
        handle: watcher,
    } = SchemaWatcher::start(root, config)?;
    let mut shadow = ShadowManager::new(config, root);
    let mut dirty = false;

    // Initial sync so the database matches the files as they are now
    if let Err(e) = apply_schema_changes(config, root, &live_pool, &mut shadow, &mut dirty).await {
        report_error(&e);
    }
    if config.seed_enabled
        && let Err(e) = run_seeds(config, root).await
    {
        report_error(&e);
    }

    println!("Watching {} for changes", schemas_dir.display());

    // Registered once so a signal arriving mid-reconcile is not dropped
    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => {
                println!("Shutting down...");
                break Ok(());
            }
            tick = ticks.recv() => {
                let Some(fired_at) = tick else {
                    break Err(anyhow!("Watcher tick channel closed unexpectedly"));
                };
                debug!(target: "dev::timing", "Tick ({:?} since fire)", fired_at.elapsed());
                handle_tick(config, root, &live_pool, &watcher, &mut shadow, &mut dirty).await;
            }
            err = errors.recv() => {
                let e = err.unwrap_or_else(|| anyhow!("Watcher error channel closed unexpectedly"));
                if let Err(cleanup_err) = shadow.cleanup().await {
                    report_error(&cleanup_err);
                }
                return Err(e.context("Fatal watcher error"));
            }
        }
    };

    if let Err(e) = shadow.cleanup().await {
        report_error(&e);
    }
    if dirty {
        warn_dirty();
    }
    outcome
}

/// Dispatch one debounced tick. Classification flags are read-and-clear, so
/// a flag set during a running reconcile is delivered with the next tick.
async fn handle_tick(
    config: &Config,
    root: &Path,
    live_pool: &PgPool,
    watcher: &WatcherHandle,
    shadow: &mut ShadowManager,
    dirty: &mut bool,
) {
    if watcher.seeds_changed() {
        println!("Seed change detected, reseeding...");
        if let Err(e) = run_seeds(config, root).await {
            report_error(&e);
        }
    } else if watcher.migrations_changed() {
        shadow.invalidate_template();
        println!(
            "Migration files changed. Apply them with your migration tooling; \
             the shadow template will be rebuilt on the next schema change."
        );
    } else {
        println!("Schema change detected, reconciling...");
        if let Err(e) = apply_schema_changes(config, root, live_pool, shadow, dirty).await {
            report_error(&e);
        }
    }
}

/// One reconcile: validate -> ensure shadow -> diff -> apply.
async fn apply_schema_changes(
    config: &Config,
    root: &Path,
    live_pool: &PgPool,
    shadow: &mut ShadowManager,
    dirty: &mut bool,
) -> Result<()> {
    let started = Instant::now();
    db::assert_alive(live_pool).await?;

    // A configured command replaces the whole internal pipeline
    if let Some(command) = &config.schema_on_change {
        run_schema_command(command, root).await?;
        *dirty = true;
        maybe_generate_types(config, shadow).await;
        return Ok(());
    }

    let schemas = load_declared_schemas(root)?;
    if schemas.is_empty() {
        println!("No declared schema files found in {SCHEMAS_DIR}/");
        return Ok(());
    }

    // Reject syntax errors before anything touches a database
    for schema in &schemas {
        validate_schema_sql(&schema.relative_path, &schema.content).map_err(anyhow::Error::new)?;
    }

    let shadow_url = shadow.ensure_ready().await?;
    shadow.apply_declared_schemas(&schemas).await?;

    let live_url = config.database.url();
    let diff = run_differ(shadow.docker().await?, &live_url, &shadow_url).await?;

    if diff.is_empty() {
        println!("No schema changes detected");
        debug!(target: "dev::timing", "Reconcile finished in {:?}", started.elapsed());
        return Ok(());
    }

    warn_destructive(&diff);
    let applied = apply_diff(&live_url, &diff.sql).await?;
    *dirty = true;
    println!(
        "Applied {} statement{} at {}",
        applied,
        if applied == 1 { "" } else { "s" },
        chrono::Local::now().format("%H:%M:%S")
    );

    maybe_generate_types(config, shadow).await;
    debug!(target: "dev::timing", "Reconcile finished in {:?}", started.elapsed());
    Ok(())
}

async fn run_schema_command(command: &str, root: &Path) -> Result<()> {
    println!("Running schema command: {command}");
    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(root)
        .status()
        .await
        .with_context(|| format!("Failed to run schema command: {command}"))?;

    if !status.success() {
        return Err(anyhow!("Schema command exited with {status}"));
    }
    Ok(())
}

/// Regenerate types when configured. Best-effort: a failure never fails the
/// reconcile that triggered it.
async fn maybe_generate_types(config: &Config, shadow: &mut ShadowManager) {
    let Some(output_path) = &config.types_output_path else {
        return;
    };

    let result = match shadow.docker().await {
        Ok(docker) => generate_types(docker, &config.database.url(), output_path).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => println!("Regenerated types at {}", output_path.display()),
        Err(e) => report_error(&e.context("Type generation failed")),
    }
}

fn report_error(error: &anyhow::Error) {
    eprintln!("{} {error:#}", style("[dev] Error:").red().bold());
}

fn warn_dirty() {
    eprintln!();
    eprintln!(
        "{}",
        style("You have uncommitted schema changes from this session.")
            .red()
            .bold()
    );
    eprintln!("The local database was modified without writing migration files.");
    eprintln!("Persist the accumulated changes (e.g. generate a migration) or they will drift.");
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
