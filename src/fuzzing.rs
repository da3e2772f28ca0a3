use serde_json::Value;

use crate::config::{EngineSettings, Options};
use crate::error::{AppError, AppResult, ConfigError};

/// Parses and validates task options from JSON.
///
/// # Errors
///
/// Returns an error when the input is not valid options.
pub fn options_from_json(data: &[u8]) -> AppResult<Options> {
    let options: Options =
        serde_json::from_slice(data).map_err(|source| ConfigError::ParseJson {
            path: "<fuzz>".into(),
            source,
        })?;
    options.validate()?;
    Ok(options)
}

/// Parses and validates engine settings from TOML.
///
/// # Errors
///
/// Returns an error when the input is not valid settings.
pub fn settings_from_toml(input: &str) -> AppResult<EngineSettings> {
    let settings: EngineSettings = toml::from_str(input).map_err(|source| {
        AppError::config(ConfigError::ParseToml {
            path: "<fuzz>".into(),
            source,
        })
    })?;
    settings.validate()?;
    Ok(settings)
}

#[must_use]
pub fn split_locator(input: &str) -> Option<(&str, &str)> {
    crate::data::split_locator(input)
}

#[must_use]
pub fn lookup_path(document: &[u8], path: &str) -> Option<Value> {
    crate::data::lookup_path(document, path)
}
