//! Path classification for watcher events.
//!
//! Declared-schema and migration globs are matched against paths relative to
//! the project root; seed globs are absolute (resolved by the config layer).
//! `**` crosses directory boundaries, `*` does not.

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};

use crate::constants::MIGRATIONS_GLOB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Schema,
    Migration,
    Seed,
}

/// Directory basenames never watched or descended into.
pub const SKIP_DIRS: [&str; 5] = [".git", "node_modules", ".vscode", ".idea", ".DS_Store"];

pub fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name)
}

/// Editor backup and temp-file names that never count as changes.
pub fn is_ignored_name(name: &str) -> bool {
    name.ends_with('~')
        || name.ends_with(".tmp")
        || name.starts_with(".#")
        || (name.starts_with('.') && (name.ends_with(".swp") || name.ends_with(".swx")))
}

pub struct Classifier {
    root: PathBuf,
    watch: Vec<Pattern>,
    seed: Vec<Pattern>,
    migrations: Pattern,
}

impl Classifier {
    pub fn new(root: &Path, watch_globs: &[String], seed_globs: &[String]) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            watch: compile(watch_globs)?,
            seed: compile(seed_globs)?,
            migrations: Pattern::new(MIGRATIONS_GLOB)
                .context("Invalid migrations glob")?,
        })
    }

    /// Classify an event path; `None` means the path matches no configured
    /// glob and the event is dropped.
    pub fn classify(&self, path: &Path) -> Option<ChangeKind> {
        let options = match_options();
        let relative = path.strip_prefix(&self.root).ok();

        if let Some(relative) = relative
            && self.migrations.matches_path_with(relative, options)
        {
            return Some(ChangeKind::Migration);
        }

        if self
            .seed
            .iter()
            .any(|pattern| pattern.matches_path_with(path, options))
        {
            return Some(ChangeKind::Seed);
        }

        if let Some(relative) = relative
            && self
                .watch
                .iter()
                .any(|pattern| pattern.matches_path_with(relative, options))
        {
            return Some(ChangeKind::Schema);
        }

        None
    }
}

/// The base directory of a glob: the path prefix up to the first component
/// containing a metacharacter (`* ? [ {`).
pub fn glob_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '[', '{']) {
            break;
        }
        base.push(component);
    }
    base
}

fn compile(globs: &[String]) -> Result<Vec<Pattern>> {
    globs
        .iter()
        .map(|g| Pattern::new(g).with_context(|| format!("Invalid glob pattern: {g}")))
        .collect()
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        // `*` stays within one path component; only `**` descends
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn classifier() -> Classifier {
        Classifier::new(
            Path::new("/proj"),
            &["schemas/**/*.sql".to_string()],
            &["/proj/seeds/*.sql".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_schema_classification() {
        let c = classifier();
        assert_eq!(
            c.classify(Path::new("/proj/schemas/a.sql")),
            Some(ChangeKind::Schema)
        );
        assert_eq!(
            c.classify(Path::new("/proj/schemas/auth/users.sql")),
            Some(ChangeKind::Schema)
        );
    }

    #[test]
    fn test_migration_classification() {
        let c = classifier();
        assert_eq!(
            c.classify(Path::new("/proj/migrations/0001_init.sql")),
            Some(ChangeKind::Migration)
        );
    }

    #[test]
    fn test_migration_glob_does_not_descend() {
        let c = classifier();
        assert_eq!(c.classify(Path::new("/proj/migrations/sub/0001.sql")), None);
    }

    #[test]
    fn test_seed_classification_is_absolute() {
        let c = classifier();
        assert_eq!(
            c.classify(Path::new("/proj/seeds/users.sql")),
            Some(ChangeKind::Seed)
        );
    }

    #[test]
    fn test_unmatched_paths_dropped() {
        let c = classifier();
        assert_eq!(c.classify(Path::new("/proj/README.md")), None);
        assert_eq!(c.classify(Path::new("/proj/schemas/notes.txt")), None);
        assert_eq!(c.classify(Path::new("/elsewhere/schemas/a.sql")), None);
    }

    #[rstest]
    #[case("backup.sql~")]
    #[case("file.tmp")]
    #[case(".#lockfile.sql")]
    #[case(".users.sql.swp")]
    #[case(".users.sql.swx")]
    fn test_ignored_names(#[case] name: &str) {
        assert!(is_ignored_name(name));
    }

    #[rstest]
    #[case("users.sql")]
    #[case("swp.sql")]
    #[case("users.sql.swp")] // no leading dot: not a vim swap name
    fn test_regular_names_not_ignored(#[case] name: &str) {
        assert!(!is_ignored_name(name));
    }

    #[rstest]
    #[case("schemas/**/*.sql", "schemas")]
    #[case("schemas/tables/*.sql", "schemas/tables")]
    #[case("/abs/seeds/**/*.sql", "/abs/seeds")]
    #[case("*.sql", "")]
    fn test_glob_base(#[case] pattern: &str, #[case] expected: &str) {
        assert_eq!(glob_base(pattern), PathBuf::from(expected));
    }

    #[test]
    fn test_skip_dirs() {
        assert!(is_skipped_dir(".git"));
        assert!(is_skipped_dir("node_modules"));
        assert!(!is_skipped_dir("schemas"));
    }
}
