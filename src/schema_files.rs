//! Discovery and loading of declared schema files.
//!
//! Declared schemas live under `<root>/schemas/` and are applied to the
//! shadow database in path order; there is no dependency analysis here, the
//! user orders files by naming them.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::SCHEMAS_DIR;

/// A declared schema file with its content.
#[derive(Debug, Clone)]
pub struct SchemaFile {
    /// Path relative to the project root, e.g. `schemas/auth/users.sql`
    pub relative_path: PathBuf,
    pub path: PathBuf,
    pub content: String,
}

/// Load every `.sql` file under the schemas directory, sorted by path for
/// deterministic apply order. A missing directory yields an empty list.
pub fn load_declared_schemas(root: &Path) -> Result<Vec<SchemaFile>> {
    let schemas_dir = root.join(SCHEMAS_DIR);
    let mut paths = Vec::new();
    discover_sql_files(&schemas_dir, &mut paths)?;
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            let relative_path = path
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.clone());
            Ok(SchemaFile {
                relative_path,
                path,
                content,
            })
        })
        .collect()
}

fn discover_sql_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            discover_sql_files(&path, files)?;
        } else if path.extension().and_then(|s| s.to_str()) == Some("sql") {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_directory_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        assert!(load_declared_schemas(dir.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_loads_sorted_recursive() -> Result<()> {
        let dir = TempDir::new()?;
        let schemas = dir.path().join("schemas");
        fs::create_dir_all(schemas.join("auth"))?;
        fs::write(schemas.join("b_tables.sql"), "CREATE TABLE b();")?;
        fs::write(schemas.join("a_tables.sql"), "CREATE TABLE a();")?;
        fs::write(schemas.join("auth/users.sql"), "CREATE TABLE users();")?;
        fs::write(schemas.join("notes.md"), "not sql")?;

        let files = load_declared_schemas(dir.path())?;
        let names: Vec<_> = files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "schemas/a_tables.sql",
                "schemas/auth/users.sql",
                "schemas/b_tables.sql"
            ]
        );
        assert_eq!(files[0].content, "CREATE TABLE a();");
        Ok(())
    }
}
