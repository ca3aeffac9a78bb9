use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use dirs::home_dir;

use crate::factory::KeeperConfig;

pub const ENV_PREFIX: &str = "TRELLIS";

/// Loads a [`KeeperConfig`], layering defaults, then the TOML file at `path`
/// if it exists, then `TRELLIS__*` environment variables. Nested keys are
/// separated by `__`, e.g. `TRELLIS__PROVER__TIMEOUT_SECS`.
///
/// A `.env` file in the working directory is read first.
pub fn load_settings(path: Option<&str>) -> Result<KeeperConfig> {
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();
    if let Some(path) = path {
        let expanded = expand_tilde(path);
        builder = builder.add_source(File::new(&expanded, FileFormat::Toml).required(false));
    }
    let config: KeeperConfig = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .context("Failed to build keeper config")?
        .try_deserialize()
        .context("Failed to deserialize keeper config")?;

    debug!("keeper config:\n{}", toml::to_string_pretty(&config)?);
    Ok(config)
}

fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/")
        && let Some(home) = home_dir()
    {
        return path.replacen("~", &home.to_string_lossy(), 1);
    }
    path.to_string()
}
