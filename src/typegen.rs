//! TypeScript type generation for the live database.
//!
//! Delegated to a one-shot container that introspects the database and
//! prints the type text; the core only writes the bytes out. Generation is
//! best-effort: a failure is reported but never fails the reconcile that
//! triggered it.

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tracing::debug;

use crate::constants::TYPEGEN_IMAGE;
use crate::docker::DockerManager;

pub async fn generate_types(
    docker: &DockerManager,
    db_url: &str,
    output_path: &Path,
) -> Result<()> {
    let output = docker
        .run_once(
            TYPEGEN_IMAGE,
            vec![
                "node".to_string(),
                "dist/server/server.js".to_string(),
                "gen".to_string(),
                "types".to_string(),
                "typescript".to_string(),
                format!("--db-url={db_url}"),
            ],
        )
        .await?;

    if output.exit_code != 0 {
        return Err(anyhow!(
            "Type generation failed with exit code {}:\n{}",
            output.exit_code,
            output.stderr.trim()
        ));
    }

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(output_path, output.stdout.as_bytes())
        .with_context(|| format!("Failed to write types to {}", output_path.display()))?;

    debug!("Wrote generated types to {}", output_path.display());
    Ok(())
}
