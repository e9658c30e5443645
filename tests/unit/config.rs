use anyhow::Result;
use pgdev::config::{ConfigBuilder, load_config};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_missing_config_file_resolves_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let config_path = dir.path().join("pgdev.yaml");

    let (input, root) = load_config(&config_path.to_string_lossy())?;
    assert_eq!(root, dir.path());

    let config = ConfigBuilder::new().with_file(input).resolve(&root)?;
    assert_eq!(config.watch_globs, vec!["schemas/**/*.sql"]);
    assert_eq!(config.database.host, "127.0.0.1");
    assert!(config.seed_enabled);
    assert!(config.schema_on_change.is_none());
    assert!(config.types_output_path.is_none());
    Ok(())
}

#[test]
fn test_config_file_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let config_path = dir.path().join("pgdev.yaml");
    fs::write(
        &config_path,
        r#"
watch:
  globs:
    - "schemas/**/*.sql"
    - "extra/**/*.sql"
database:
  port: 54322
  password: sekret
shadow:
  port: 54320
  project_id: acme
  health_timeout_secs: 30
seed:
  enabled: false
  globs:
    - "seeds/**/*.sql"
types:
  output_path: "types/database.ts"
"#,
    )?;

    let (input, root) = load_config(&config_path.to_string_lossy())?;
    let config = ConfigBuilder::new().with_file(input).resolve(&root)?;

    assert_eq!(config.watch_globs.len(), 2);
    assert_eq!(config.database.port, 54322);
    assert_eq!(config.database.password, "sekret");
    assert_eq!(config.shadow.port, 54320);
    assert_eq!(config.shadow.project_id, "acme");
    assert_eq!(config.shadow.health_timeout, Duration::from_secs(30));
    assert_eq!(config.shadow.container_name(), "supabase_db_acme_shadow");
    assert!(!config.seed_enabled);
    // Relative seed globs are anchored at the project root
    assert_eq!(
        config.seed_globs,
        vec![dir.path().join("seeds/**/*.sql").to_string_lossy().into_owned()]
    );
    assert_eq!(
        config.types_output_path.as_deref(),
        Some(std::path::Path::new("types/database.ts"))
    );
    Ok(())
}

#[test]
fn test_malformed_config_file_errors() -> Result<()> {
    let dir = TempDir::new()?;
    let config_path = dir.path().join("pgdev.yaml");
    fs::write(&config_path, "watch: [not, a, mapping]")?;

    assert!(load_config(&config_path.to_string_lossy()).is_err());
    Ok(())
}
