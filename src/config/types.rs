use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Raw configuration input - all fields optional for merging
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigInput {
    pub watch: Option<WatchInput>,
    pub database: Option<DatabaseInput>,
    pub shadow: Option<ShadowInput>,
    pub seed: Option<SeedInput>,
    pub types: Option<TypesInput>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WatchInput {
    /// Globs selecting declared schema files, relative to the project root
    pub globs: Option<Vec<String>>,
    /// Shell command run instead of the internal pipeline on schema changes
    pub schema_on_change: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseInput {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShadowInput {
    pub port: Option<u16>,
    pub image: Option<String>,
    pub project_id: Option<String>,
    pub health_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SeedInput {
    pub enabled: Option<bool>,
    /// Globs selecting seed files, relative to the project root
    pub globs: Option<Vec<String>>,
    /// Shell command run instead of the internal seed runner
    pub seed_on_change: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TypesInput {
    pub output_path: Option<PathBuf>,
}

/// Resolved configuration with all defaults applied. Read-only for the
/// lifetime of a session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Declared-schema globs, relative to the project root
    pub watch_globs: Vec<String>,
    pub schema_on_change: Option<String>,
    /// Seed globs, absolute (resolved against the project root at load time)
    pub seed_globs: Vec<String>,
    pub seed_on_change: Option<String>,
    pub seed_enabled: bool,
    pub types_output_path: Option<PathBuf>,
    pub database: DatabaseConfig,
    pub shadow: ShadowConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode=disable",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone)]
pub struct ShadowConfig {
    pub port: u16,
    pub image: String,
    pub project_id: String,
    pub user: String,
    pub password: String,
    pub health_timeout: Duration,
}

impl ShadowConfig {
    /// Deterministic container name; taking this name is taking ownership.
    pub fn container_name(&self) -> String {
        format!("supabase_db_{}_shadow", self.project_id)
    }

    pub fn url(&self, database: &str) -> String {
        format!(
            "postgres://{}:{}@127.0.0.1:{}/{}?sslmode=disable",
            self.user, self.password, self.port, database
        )
    }
}

// CLI argument overrides for the dev session
#[derive(Debug, Clone, Default, Args)]
pub struct DevArgs {
    #[arg(long, help = "Local database host")]
    pub db_host: Option<String>,

    #[arg(long, help = "Local database port")]
    pub db_port: Option<u16>,

    #[arg(long, help = "Local database user")]
    pub db_user: Option<String>,

    #[arg(long, help = "Local database password")]
    pub db_password: Option<String>,

    #[arg(long, help = "Local database name")]
    pub db_name: Option<String>,

    #[arg(long, help = "Host port for the shadow database container")]
    pub shadow_port: Option<u16>,

    #[arg(long, help = "Project identifier used in the shadow container name")]
    pub project_id: Option<String>,

    #[arg(long, help = "Write generated TypeScript types to this path")]
    pub types_output: Option<PathBuf>,

    #[arg(long, help = "Disable seeding")]
    pub no_seed: bool,
}

impl From<DevArgs> for ConfigInput {
    fn from(args: DevArgs) -> Self {
        let database = DatabaseInput {
            host: args.db_host,
            port: args.db_port,
            user: args.db_user,
            password: args.db_password,
            name: args.db_name,
        };
        let shadow = ShadowInput {
            port: args.shadow_port,
            project_id: args.project_id,
            image: None,
            health_timeout_secs: None,
        };
        let seed = if args.no_seed {
            Some(SeedInput {
                enabled: Some(false),
                globs: None,
                seed_on_change: None,
            })
        } else {
            None
        };
        let types = args.types_output.map(|path| TypesInput {
            output_path: Some(path),
        });

        Self {
            watch: None,
            database: Some(database),
            shadow: Some(shadow),
            seed,
            types,
        }
    }
}
