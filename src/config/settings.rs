use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::paths;

/// Environment variable supplying the host directory for persistent service
/// data. Takes precedence over the settings file.
pub const DATA_DIR_ENV: &str = "STACKUP_DATA_DIR";

/// Global stackup settings stored in ~/.stackup/settings.yaml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Directory containing the compose files. Defaults to the current
    /// working directory when unset.
    pub stack_dir: Option<PathBuf>,

    /// Host directory bind-mounted for service data.
    pub data_dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from disk, creating a default file if none exists
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::get_settings_file()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let settings = Self::default();
            settings.save_to(path)?;
            return Ok(settings);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;

        serde_yaml::from_str(&content).context("Failed to parse settings file")
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Directory the compose files live in.
    pub fn resolved_stack_dir(&self) -> Result<PathBuf> {
        match &self.stack_dir {
            Some(dir) => Ok(dir.clone()),
            None => env::current_dir().context("Failed to get current directory"),
        }
    }

    /// Host data directory for the data layer, if any.
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        data_dir_from(env::var_os(DATA_DIR_ENV), self.data_dir.as_deref())
    }
}

fn data_dir_from(env_value: Option<OsString>, stored: Option<&Path>) -> Option<PathBuf> {
    env_value
        .map(PathBuf::from)
        .or_else(|| stored.map(Path::to_path_buf))
}
