//! Optional TOML configuration for the command-line front end

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Settings loaded from a `--config` TOML file
///
/// Every key is optional; command-line flags take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Write output files through a temporary file and rename
    pub atomic: Option<bool>,

    /// Re-read output files after writing
    pub verify: Option<bool>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
