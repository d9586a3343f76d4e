use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::Config;

/// Default config location: `~/.labreport/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".labreport").join("config.json"))
}

/// Load configuration.
///
/// An explicit path must exist. Without one, the default location is tried
/// and a missing file falls back to built-in defaults. Values are not
/// validated here; callers validate after applying command-line overrides.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let config = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            read_config_file(path)?
        }
        None => match default_config_path() {
            Some(path) if path.exists() => read_config_file(&path)?,
            _ => {
                log::debug!("No config file found, using defaults");
                Config::default()
            }
        },
    };

    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let config: Config =
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Reject values the generation loop cannot work with.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.char_limit == 0 {
        return Err(ConfigError::Invalid("charLimit must be positive".into()));
    }
    if config.max_attempts == 0 {
        return Err(ConfigError::Invalid("maxAttempts must be at least 1".into()));
    }
    if !config.temperature.is_finite() || !config.top_p.is_finite() {
        return Err(ConfigError::Invalid(
            "temperature and topP must be finite numbers".into(),
        ));
    }
    if config.sheet_layout.row_step == 0 {
        return Err(ConfigError::Invalid("sheetLayout.rowStep must be positive".into()));
    }
    Ok(())
}

/// Read the background instruction text handed to every prompt.
///
/// A missing file is not fatal: the run continues without background text.
pub fn load_background_instruction(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            log::warn!(
                "Background instruction {} unavailable ({}); continuing without it",
                path.display(),
                e
            );
            String::new()
        }
    }
}
