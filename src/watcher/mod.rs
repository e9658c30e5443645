//! Debounced, classified filesystem watching.
//!
//! One OS watch per directory (non-recursive), covering every subdirectory
//! of each glob's base plus the migrations directory. A dedicated thread
//! drains raw events, filters noise, classifies survivors, and coalesces
//! them into ticks. Classification travels out of band: the migration/seed
//! flags are sticky and read-and-clear, so a flag set before a tick fired is
//! observable on the flag-read that follows the tick.

pub mod classify;
pub mod debounce;

pub use classify::{ChangeKind, Classifier};
pub use debounce::Coalesce;

use anyhow::{Context, Result, anyhow};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Instant;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::constants::{MIGRATIONS_DIR, WATCH_DEBOUNCE_DURATION, WATCH_POLL_TIMEOUT};

#[derive(Default)]
struct ChangeFlags {
    migrations: AtomicBool,
    seeds: AtomicBool,
}

/// Read-and-clear access to the classification flags, plus shutdown of the
/// watcher thread when dropped.
pub struct WatcherHandle {
    flags: Arc<ChangeFlags>,
    shutdown: Arc<AtomicBool>,
}

impl WatcherHandle {
    /// Read and clear the migrations-changed flag.
    pub fn migrations_changed(&self) -> bool {
        self.flags.migrations.swap(false, Ordering::SeqCst)
    }

    /// Read and clear the seeds-changed flag.
    pub fn seeds_changed(&self) -> bool {
        self.flags.seeds.swap(false, Ordering::SeqCst)
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Watches the project tree and emits debounced reconcile ticks.
///
/// Destructure freely: the receivers and the handle have independent
/// lifetimes, the watcher thread stops when the handle drops.
pub struct SchemaWatcher {
    /// Tick timestamps; the session controller is the sole reader
    pub ticks: tokio_mpsc::UnboundedReceiver<Instant>,
    /// Fatal watcher errors; any message here ends the session
    pub errors: tokio_mpsc::UnboundedReceiver<anyhow::Error>,
    pub handle: WatcherHandle,
}

impl SchemaWatcher {
    pub fn start(root: &Path, config: &Config) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::channel();
        let (tick_tx, tick_rx) = tokio_mpsc::unbounded_channel();
        let (err_tx, err_rx) = tokio_mpsc::unbounded_channel();

        let mut watcher: RecommendedWatcher = notify::recommended_watcher(
            move |result: notify::Result<Event>| {
                let _ = raw_tx.send(result);
            },
        )
        .context("Failed to create filesystem watcher")?;

        for dir in watch_roots(root, config) {
            add_watches_recursive(&mut watcher, &dir)?;
        }

        let classifier = Classifier::new(root, &config.watch_globs, &config.seed_globs)?;
        let flags = Arc::new(ChangeFlags::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_flags = flags.clone();
        let thread_shutdown = shutdown.clone();
        std::thread::Builder::new()
            .name("pgdev-watcher".to_string())
            .spawn(move || {
                event_loop(
                    watcher,
                    raw_rx,
                    classifier,
                    thread_flags,
                    tick_tx,
                    err_tx,
                    thread_shutdown,
                );
            })
            .context("Failed to spawn watcher thread")?;

        Ok(Self {
            ticks: tick_rx,
            errors: err_rx,
            handle: WatcherHandle { flags, shutdown },
        })
    }
}

/// Base directories to watch: each watch glob's base, each seed glob's base,
/// and the migrations directory. Missing directories are skipped; the
/// schemas directory is created by the session before the watcher starts.
fn watch_roots(root: &Path, config: &Config) -> BTreeSet<PathBuf> {
    let mut roots = BTreeSet::new();

    for pattern in &config.watch_globs {
        if let Some(dir) = containing_dir(root.join(classify::glob_base(pattern))) {
            roots.insert(dir);
        }
    }
    for pattern in &config.seed_globs {
        if let Some(dir) = containing_dir(classify::glob_base(pattern)) {
            roots.insert(dir);
        }
    }
    if root.join(MIGRATIONS_DIR).is_dir() {
        roots.insert(root.join(MIGRATIONS_DIR));
    }

    roots
}

/// A glob base with no metacharacters may name a plain file (`seed.sql`);
/// watch its directory instead.
fn containing_dir(base: PathBuf) -> Option<PathBuf> {
    if base.is_dir() {
        return Some(base);
    }
    match base.parent() {
        Some(parent) if parent.is_dir() => Some(parent.to_path_buf()),
        _ => None,
    }
}

fn add_watches_recursive(watcher: &mut RecommendedWatcher, dir: &Path) -> Result<()> {
    if let Some(name) = dir.file_name().and_then(|n| n.to_str())
        && classify::is_skipped_dir(name)
    {
        return Ok(());
    }

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch directory: {}", dir.display()))?;
    debug!(target: "dev::watcher", "Watching {}", dir.display());

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            add_watches_recursive(watcher, &path)?;
        }
    }
    Ok(())
}

fn event_loop(
    mut watcher: RecommendedWatcher,
    raw_rx: mpsc::Receiver<notify::Result<Event>>,
    classifier: Classifier,
    flags: Arc<ChangeFlags>,
    tick_tx: tokio_mpsc::UnboundedSender<Instant>,
    err_tx: tokio_mpsc::UnboundedSender<anyhow::Error>,
    shutdown: Arc<AtomicBool>,
) {
    let mut coalesce = Coalesce::new(WATCH_DEBOUNCE_DURATION);

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let timeout = coalesce
            .deadline()
            .map(|deadline| {
                deadline
                    .saturating_duration_since(Instant::now())
                    .min(WATCH_POLL_TIMEOUT)
            })
            .unwrap_or(WATCH_POLL_TIMEOUT);

        match raw_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                if handle_event(&event, &mut watcher, &classifier, &flags) {
                    let now = Instant::now();
                    if coalesce.poke(now) && tick_tx.send(now).is_err() {
                        break;
                    }
                }
            }
            Ok(Err(e)) => {
                let _ = err_tx.send(anyhow!("Filesystem watcher failed: {}", e));
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        if coalesce.due(now) && tick_tx.send(now).is_err() {
            break;
        }
    }
}

/// Filter, classify, and record one raw event. Returns true when it should
/// poke the debounce timer.
fn handle_event(
    event: &Event,
    watcher: &mut RecommendedWatcher,
    classifier: &Classifier,
    flags: &ChangeFlags,
) -> bool {
    if !is_relevant_kind(&event.kind) {
        return false;
    }

    let mut qualifying = false;
    for path in &event.paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if is_dir_event(&event.kind) && path.is_dir() {
            if !classify::is_skipped_dir(name) {
                // New directory under a watched base: extend the watch set
                if let Err(e) = add_watches_recursive(watcher, path) {
                    warn!("Failed to watch new directory {}: {}", path.display(), e);
                }
            }
            continue;
        }

        if classify::is_ignored_name(name) {
            debug!(target: "dev::watcher", "Ignoring {}", path.display());
            continue;
        }

        // Half-written files show up empty; skip them, the completing write
        // will fire again
        if let Ok(content) = std::fs::read_to_string(path)
            && content.trim().is_empty()
        {
            debug!(target: "dev::watcher", "Skipping empty file {}", path.display());
            continue;
        }

        match classifier.classify(path) {
            Some(ChangeKind::Migration) => {
                debug!(target: "dev::watcher", "Migration change: {}", path.display());
                flags.migrations.store(true, Ordering::SeqCst);
                qualifying = true;
            }
            Some(ChangeKind::Seed) => {
                debug!(target: "dev::watcher", "Seed change: {}", path.display());
                flags.seeds.store(true, Ordering::SeqCst);
                qualifying = true;
            }
            Some(ChangeKind::Schema) => {
                debug!(target: "dev::watcher", "Schema change: {}", path.display());
                qualifying = true;
            }
            None => {
                debug!(target: "dev::watcher", "Unmatched path: {}", path.display());
            }
        }
    }
    qualifying
}

fn is_relevant_kind(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(modify) => !matches!(modify, ModifyKind::Metadata(_)),
        _ => false,
    }
}

fn is_dir_event(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_))
}
