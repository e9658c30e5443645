use std::time::Duration;

// File watch timing constants
pub const WATCH_DEBOUNCE_DURATION: Duration = Duration::from_millis(500);
pub const WATCH_POLL_TIMEOUT: Duration = Duration::from_millis(100);

// Shadow database layout. The shadow container hosts two databases: the
// working copy that declared schemas are applied to, and the template it is
// cheaply re-cloned from.
pub const SHADOW_DB_NAME: &str = "contrib_regression";
pub const TEMPLATE_DB_NAME: &str = "shadow_template";
pub const ADMIN_DB_NAME: &str = "postgres";

// Tracking tables on the live/shadow databases
pub const TRACKING_SCHEMA: &str = "supabase_migrations";
pub const SCHEMA_MIGRATIONS_TABLE: &str = "schema_migrations";
pub const SEED_FILES_TABLE: &str = "seed_files";

// Container images for one-shot helpers
pub const DIFF_IMAGE: &str = "supabase/migra:3.0.1663481299";
pub const TYPEGEN_IMAGE: &str = "supabase/postgres-meta:v0.80.0";

// Shutdown always gets its own deadline, independent of the session context
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

// Project layout relative to the root
pub const SCHEMAS_DIR: &str = "schemas";
pub const MIGRATIONS_DIR: &str = "migrations";
pub const MIGRATIONS_GLOB: &str = "migrations/*.sql";

// Configuration file name
pub const CONFIG_FILENAME: &str = "pgdev.yaml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_constants() {
        assert!(WATCH_DEBOUNCE_DURATION > WATCH_POLL_TIMEOUT);
        assert!(CLEANUP_TIMEOUT > Duration::from_secs(0));
    }
}
