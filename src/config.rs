use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::DEFAULT_SCAN_DEPTH;

/// Runtime settings, layered: defaults, then `vidlib.toml`, then `VIDLIB_*`
/// environment variables. Command-line flags are applied by the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Catalog file. Falls back to the per-user data directory.
    pub db_path: Option<PathBuf>,
    pub default_scan_depth: usize,
    /// `tracing` filter directive, e.g. `info` or `vidlib=debug`.
    pub log_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: None,
            default_scan_depth: DEFAULT_SCAN_DEPTH,
            log_level: None,
        }
    }
}

impl Settings {
    /// `<config dir>/vidlib.toml`, if the platform has a config dir.
    pub fn config_path() -> Option<PathBuf> {
        crate::db::project_dirs().map(|d| d.config_dir().join("vidlib.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::build(Self::config_path().as_deref(), env_source())
    }

    /// Load from an explicit file (which may be absent) plus the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(Some(path), env_source())
    }

    fn build(file: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(ConfigFile::from(path).required(false));
        }
        let settings: Settings = builder
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::InvalidArgument(format!("configuration: {e}")))?;

        if settings.default_scan_depth < 1 {
            return Err(Error::InvalidArgument(format!(
                "configuration: default_scan_depth must be at least 1, got {}",
                settings.default_scan_depth
            )));
        }
        Ok(settings)
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(crate::db::default_db_path)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("VIDLIB").try_parsing(true)
}
