pub mod config;
pub mod log;
pub mod names;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use kosmos_core::pipeline::config::ReductionConfig;

/// Read a TOML reduction config.
pub fn load_config(path: &Path) -> Result<ReductionConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    ReductionConfig::from_toml(&contents)
        .with_context(|| format!("Invalid reduction config {}", path.display()))
}

/// Write `config` as TOML to `path`, or to stdout when `path` is `None`.
pub fn write_config(config: &ReductionConfig, path: Option<&Path>) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    if let Some(path) = path {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }
    Ok(())
}
