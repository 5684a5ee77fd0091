// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{Overrides, RawSettings, Settings};
use crate::errors::Result;

/// Load a settings file from a given path and return the raw `RawSettings`.
///
/// This only performs TOML deserialization; use [`load_settings`] for the
/// validated form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSettings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let raw: RawSettings = toml::from_str(&contents)?;

    Ok(raw)
}

/// Resolve the effective settings.
///
/// Precedence: `overrides` (CLI / environment) > settings file > defaults.
/// Without a file, defaults plus overrides are used.
pub fn load_settings(path: Option<&Path>, overrides: &Overrides) -> Result<Settings> {
    let raw = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading settings file");
            load_from_path(path)?
        }
        None => RawSettings::default(),
    };
    Settings::try_from(raw.apply(overrides))
}
