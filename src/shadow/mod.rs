//! Shadow database lifecycle.
//!
//! The shadow is a throwaway Postgres container whose working database
//! (`contrib_regression`) always reflects the committed migration history,
//! ready to take the declared schemas on top. A template database built
//! right after migrations makes resets cheap: `CREATE DATABASE ... TEMPLATE
//! shadow_template` instead of replaying history.
//!
//! State machine per reconcile:
//! - no container           -> cold start
//! - alive, template stale  -> rebuild template (history inputs changed)
//! - alive, template fresh  -> fast reset from template

use anyhow::{Context, Result, anyhow};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

use crate::config::{Config, ShadowConfig};
use crate::constants::{
    ADMIN_DB_NAME, CLEANUP_TIMEOUT, MIGRATIONS_DIR, SHADOW_DB_NAME, TEMPLATE_DB_NAME,
};
use crate::db::{PgErrorContext, connect_once};
use crate::docker::{DockerManager, PostgresContainer};
use crate::hasher::digest_dev_inputs;
use crate::migrations::apply_migrations;
use crate::schema_files::SchemaFile;
use crate::seed::resolve_seed_files;

/// Mutable shadow state. Owned by the session and touched only from the
/// session task.
#[derive(Debug, Default)]
struct ShadowState {
    /// Container id of the running shadow; empty when none
    container_id: String,
    /// Roles present right after migrations, before any declared schema.
    /// Roles outside this set are dropped on every fast reset.
    baseline_roles: BTreeSet<String>,
    template_ready: bool,
    /// Digest of migrations + seeds the template was built from
    migrations_hash: String,
}

pub struct ShadowManager {
    shadow: ShadowConfig,
    seed_globs: Vec<String>,
    root: PathBuf,
    docker: Option<DockerManager>,
    state: ShadowState,
}

impl ShadowManager {
    pub fn new(config: &Config, root: &Path) -> Self {
        Self {
            shadow: config.shadow.clone(),
            seed_globs: config.seed_globs.clone(),
            root: root.to_path_buf(),
            docker: None,
            state: ShadowState::default(),
        }
    }

    /// Guarantee a healthy shadow whose working database holds exactly the
    /// committed-migration state, and return its connection URL.
    ///
    /// Any failure here clears `template_ready`, forcing a rebuild on the
    /// next reconcile.
    pub async fn ensure_ready(&mut self) -> Result<String> {
        let started = Instant::now();
        let result = self.ensure_ready_inner().await;
        if result.is_err() {
            self.state.template_ready = false;
        } else {
            debug!(target: "dev::timing", "Shadow ready in {:?}", started.elapsed());
        }
        result
    }

    async fn ensure_ready_inner(&mut self) -> Result<String> {
        let hash = self.current_hash()?;

        let alive = !self.state.container_id.is_empty() && {
            let container_id = self.state.container_id.clone();
            self.docker().await?.is_running(&container_id).await
        };

        if !alive {
            self.cold_start().await?;
        } else if !self.state.template_ready || self.state.migrations_hash != hash {
            self.rebuild_template().await?;
        } else {
            self.fast_reset().await?;
        }

        Ok(self.shadow.url(SHADOW_DB_NAME))
    }

    /// Apply declared schema files to the working database, in order, over a
    /// fresh connection. On failure the shadow is left dirty; the next fast
    /// reset restores it, so no rollback is attempted and the template stays
    /// valid.
    pub async fn apply_declared_schemas(&self, schemas: &[SchemaFile]) -> Result<()> {
        let mut conn = connect_once(&self.shadow.url(SHADOW_DB_NAME)).await?;

        for schema in schemas {
            debug!(target: "dev::sql", "Applying {}", schema.relative_path.display());
            if schema.content.trim().is_empty() {
                continue;
            }
            sqlx::raw_sql(&schema.content)
                .execute(&mut conn)
                .await
                .map_err(|e| {
                    anyhow!(
                        "{}",
                        PgErrorContext::from_sqlx_error(&e, &schema.content)
                            .format(&schema.relative_path.display().to_string())
                    )
                })?;
        }
        Ok(())
    }

    /// Mark the template stale without touching the container. Used when
    /// committed migrations change under a running session.
    pub fn invalidate_template(&mut self) {
        self.state.template_ready = false;
        self.state.migrations_hash.clear();
    }

    pub fn template_ready(&self) -> bool {
        self.state.template_ready
    }

    pub fn migrations_hash(&self) -> &str {
        &self.state.migrations_hash
    }

    /// Force-remove the shadow container under a fresh deadline, independent
    /// of any cancelled session context, so Ctrl-C always completes.
    pub async fn cleanup(&mut self) -> Result<()> {
        if self.state.container_id.is_empty() {
            return Ok(());
        }
        let container_id = std::mem::take(&mut self.state.container_id);
        self.state.template_ready = false;

        let removal = async {
            if self.docker.is_none() {
                self.docker = Some(DockerManager::new().await?);
            }
            self.docker.as_ref().unwrap().remove_container(&container_id).await
        };

        tokio::time::timeout(CLEANUP_TIMEOUT, removal)
            .await
            .map_err(|_| anyhow!("Shadow cleanup timed out after {:?}", CLEANUP_TIMEOUT))?
    }

    /// Lazily-connected Docker manager, shared with the differ and the
    /// types generator.
    pub async fn docker(&mut self) -> Result<&DockerManager> {
        if self.docker.is_none() {
            self.docker = Some(DockerManager::new().await?);
        }
        Ok(self.docker.as_ref().unwrap())
    }

    /// Cold start: take ownership of the deterministic container name,
    /// start Postgres with the working database, and build the template.
    async fn cold_start(&mut self) -> Result<()> {
        println!("Starting shadow database...");
        let spec = PostgresContainer {
            name: self.shadow.container_name(),
            image: self.shadow.image.clone(),
            host_port: self.shadow.port,
            database: SHADOW_DB_NAME.to_string(),
            user: self.shadow.user.clone(),
            password: self.shadow.password.clone(),
        };
        let health_timeout = self.shadow.health_timeout;
        let shadow_url = self.shadow.url(SHADOW_DB_NAME);

        let docker = self.docker().await?;
        let container_id = docker.start_postgres(&spec).await?;
        docker
            .wait_for_postgres(&container_id, &shadow_url, health_timeout)
            .await?;

        self.state.container_id = container_id;
        self.build_template().await
    }

    /// Rebuild the template on a live container: drop both databases,
    /// recreate the working database, and rebuild.
    async fn rebuild_template(&mut self) -> Result<()> {
        println!("Rebuilding shadow template...");
        let mut admin = connect_once(&self.shadow.url(ADMIN_DB_NAME)).await?;

        terminate_backends(&mut admin, TEMPLATE_DB_NAME).await?;
        terminate_backends(&mut admin, SHADOW_DB_NAME).await?;
        // One statement per exec: database DDL refuses to run inside the
        // implicit transaction a multi-statement batch gets
        sqlx::raw_sql(&format!("DROP DATABASE IF EXISTS {TEMPLATE_DB_NAME}"))
            .execute(&mut admin)
            .await
            .context("Failed to drop shadow template")?;
        sqlx::raw_sql(&format!("DROP DATABASE IF EXISTS {SHADOW_DB_NAME}"))
            .execute(&mut admin)
            .await
            .context("Failed to drop shadow database")?;
        sqlx::raw_sql(&format!("CREATE DATABASE {SHADOW_DB_NAME}"))
            .execute(&mut admin)
            .await
            .context("Failed to recreate shadow database")?;

        self.build_template().await
    }

    /// Migrations onward: shared tail of cold start and template rebuild.
    async fn build_template(&mut self) -> Result<()> {
        apply_migrations(&self.shadow.url(SHADOW_DB_NAME), &self.root)
            .await
            .context("Failed to apply migrations to shadow database")?;

        let mut admin = connect_once(&self.shadow.url(ADMIN_DB_NAME)).await?;
        self.state.baseline_roles = query_roles(&mut admin).await?;

        terminate_backends(&mut admin, SHADOW_DB_NAME).await?;
        sqlx::raw_sql(&format!(
            "CREATE DATABASE {TEMPLATE_DB_NAME} TEMPLATE {SHADOW_DB_NAME}"
        ))
        .execute(&mut admin)
        .await
        .context("Failed to create shadow template")?;

        self.state.migrations_hash = self.current_hash()?;
        self.state.template_ready = true;
        Ok(())
    }

    /// Reset the working database to the template. Roles are cluster-wide,
    /// not per-database, so roles the previous declared state created are
    /// dropped explicitly.
    async fn fast_reset(&mut self) -> Result<()> {
        let started = Instant::now();
        let mut admin = connect_once(&self.shadow.url(ADMIN_DB_NAME)).await?;

        let roles = query_roles(&mut admin).await?;
        for role in roles.difference(&self.state.baseline_roles) {
            debug!(target: "dev::sql", "Dropping role {}", role);
            sqlx::raw_sql(&format!("DROP ROLE IF EXISTS {}", quote_ident(role)))
                .execute(&mut admin)
                .await
                .with_context(|| format!("Failed to drop role {role}"))?;
        }

        terminate_backends(&mut admin, SHADOW_DB_NAME).await?;
        sqlx::raw_sql(&format!("DROP DATABASE IF EXISTS {SHADOW_DB_NAME}"))
            .execute(&mut admin)
            .await
            .context("Failed to drop shadow database")?;
        sqlx::raw_sql(&format!(
            "CREATE DATABASE {SHADOW_DB_NAME} TEMPLATE {TEMPLATE_DB_NAME}"
        ))
        .execute(&mut admin)
        .await
        .context("Failed to reset shadow database from template")?;

        debug!(target: "dev::timing", "Fast reset in {:?}", started.elapsed());
        Ok(())
    }

    fn current_hash(&self) -> Result<String> {
        let seeds = resolve_seed_files(&self.seed_globs)?;
        digest_dev_inputs(&self.root.join(MIGRATIONS_DIR), &seeds)
    }
}

async fn query_roles(conn: &mut sqlx::PgConnection) -> Result<BTreeSet<String>> {
    let roles: Vec<String> =
        sqlx::query_scalar("SELECT rolname FROM pg_roles WHERE rolname NOT LIKE 'pg_%'")
            .fetch_all(&mut *conn)
            .await
            .context("Failed to query roles")?;
    Ok(roles.into_iter().collect())
}

async fn terminate_backends(conn: &mut sqlx::PgConnection, database: &str) -> Result<()> {
    sqlx::query(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
         WHERE datname = $1 AND pid <> pg_backend_pid()",
    )
    .bind(database)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to terminate backends on {database}"))?;
    Ok(())
}

/// Quote a Postgres identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
