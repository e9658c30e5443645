//! Digest over the shadow template's inputs.
//!
//! The shadow template database bakes in the committed migrations (and the
//! seed set that was current when it was built). A SHA-256 over those inputs
//! detects staleness: when the digest stored at template-build time no
//! longer matches, the template must be rebuilt instead of fast-reset.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Digest the migrations directory and the resolved seed files.
///
/// Files are folded in as `(filename, contents)` pairs, ordered by filename,
/// so renames and content edits both change the digest. A missing migrations
/// directory contributes nothing.
pub fn digest_dev_inputs(migrations_dir: &Path, seed_files: &[PathBuf]) -> Result<String> {
    let mut hasher = Sha256::new();

    for path in migration_files(migrations_dir)? {
        fold_file(&mut hasher, &path)?;
    }

    let mut seeds: Vec<&PathBuf> = seed_files.iter().collect();
    seeds.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));
    for path in seeds {
        fold_file(&mut hasher, path)?;
    }

    Ok(hex_digest(hasher))
}

/// Regular files of the migrations directory, sorted by filename. Missing
/// directory yields an empty list.
pub fn migration_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();

    files.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));
    Ok(files)
}

/// SHA-256 of a single file's contents, hex-encoded. Used by the seed runner
/// for the `seed_files` tracking table.
pub fn file_digest(path: &Path) -> Result<String> {
    let contents =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(hex_digest(hasher))
}

fn fold_file(hasher: &mut Sha256, path: &Path) -> Result<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let contents =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    hasher.update(name.as_bytes());
    hasher.update(&contents);
    Ok(())
}

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
