use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult, ConfigError};

use super::{EngineSettings, Options};

/// Loads engine settings from the provided path or the default locations.
///
/// Falls back to [`EngineSettings::default`] when no path is given and neither
/// `loadrig.toml` nor `loadrig.json` exists in the working directory.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, or when the
/// settings are invalid.
pub fn load_settings(path: Option<&Path>) -> AppResult<EngineSettings> {
    let settings = if let Some(path) = path {
        load_file::<EngineSettings>(path)?
    } else if let Some(found) = default_settings_path() {
        load_file::<EngineSettings>(&found)?
    } else {
        EngineSettings::default()
    };
    settings.validate().map_err(AppError::config)?;
    Ok(settings)
}

fn default_settings_path() -> Option<PathBuf> {
    ["loadrig.toml", "loadrig.json"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

/// Loads and validates task options from a `.toml` or `.json` file.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, or when the
/// options fail validation.
pub fn load_options(path: &Path) -> AppResult<Options> {
    let options = load_file::<Options>(path)?;
    options.validate().map_err(|err| {
        AppError::config(ConfigError::InvalidOptions {
            path: path.to_path_buf(),
            source: err,
        })
    })?;
    Ok(options)
}

pub(crate) fn load_file<T>(path: &Path) -> AppResult<T>
where
    T: DeserializeOwned,
{
    let content = std::fs::read_to_string(path).map_err(|err| {
        AppError::config(ConfigError::ReadConfig {
            path: path.to_path_buf(),
            source: err,
        })
    })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|err| {
            AppError::config(ConfigError::ParseToml {
                path: path.to_path_buf(),
                source: err,
            })
        }),
        Some("json") => serde_json::from_str(&content).map_err(|err| {
            AppError::config(ConfigError::ParseJson {
                path: path.to_path_buf(),
                source: err,
            })
        }),
        Some(ext) => Err(AppError::config(ConfigError::UnsupportedExtension {
            ext: ext.to_owned(),
        })),
        None => Err(AppError::config(ConfigError::MissingExtension)),
    }
}
