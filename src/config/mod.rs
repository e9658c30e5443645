pub mod builder;
pub mod types;

pub use builder::ConfigBuilder;
pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Load the raw config file, returning the input and the project root (the
/// directory containing the file). A missing file is an empty input: every
/// option has a default.
pub fn load_config(config_file: &str) -> Result<(ConfigInput, PathBuf)> {
    let path = Path::new(config_file);
    let root_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let config_input = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        ConfigInput::default()
    };

    Ok((config_input, root_dir))
}
