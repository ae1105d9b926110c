pub mod plan;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use backup_core::{config, Config};
use clap::Args;

/// Where to read the configuration from.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArg {
    /// Path to the YAML config [default: ./config.yaml].
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ConfigArg {
    pub fn load(&self) -> Result<Config> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_FILE));
        config::load_at(&path).with_context(|| format!("failed to load config {}", path.display()))
    }
}
