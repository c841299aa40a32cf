// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::EngineConfig;
use crate::errors::{OpQueueError, Result};

/// Read, parse and validate a configuration file.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_str(&contents)
}

/// Parse and validate a configuration document.
///
/// Missing sections and keys fall back to their defaults; unknown keys are
/// rejected.
pub fn parse_str(contents: &str) -> Result<EngineConfig> {
    let config: EngineConfig = toml::from_str(contents)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &EngineConfig) -> Result<()> {
    if let Some(name) = &config.queue.name {
        if name.trim().is_empty() {
            return Err(OpQueueError::Config(
                "[queue].name must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}
