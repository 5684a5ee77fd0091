// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{RawSettings, Settings, ValidatorSettings};
use crate::errors::{ReloadError, Result};
use crate::reload::signaler::parse_signal;
use crate::watch::patterns::TrackingPolicy;

impl TryFrom<RawSettings> for Settings {
    type Error = ReloadError;

    fn try_from(raw: RawSettings) -> std::result::Result<Self, Self::Error> {
        let root_dir = raw.watch.root_dir.clone().ok_or_else(|| {
            ReloadError::ConfigError(
                "root directory not set: export FALCO_ROOTDIR, pass --root-dir or set [watch].root_dir"
                    .to_string(),
            )
        })?;
        if root_dir.as_os_str().is_empty() {
            return Err(ReloadError::ConfigError(
                "root directory must not be empty".to_string(),
            ));
        }

        let poll_interval = positive_duration("[watch].poll_interval", &raw.watch.poll_interval)?;
        let debounce = parse_duration(&raw.watch.debounce)
            .map_err(|e| ReloadError::ConfigError(format!("[watch].debounce: {e}")))?;

        if raw.watch.extensions.is_empty() {
            return Err(ReloadError::ConfigError(
                "[watch].extensions must list at least one extension".to_string(),
            ));
        }

        let primary = Some(raw.watch.primary_config.clone()).filter(|s| !s.trim().is_empty());
        let policy = TrackingPolicy::new(&raw.watch.extensions, primary, &raw.watch.exclude)
            .map_err(|e| ReloadError::ConfigError(format!("[watch].exclude: {e:#}")))?;

        let process_name = raw.agent.process_name.trim().to_string();
        if process_name.is_empty() {
            return Err(ReloadError::ConfigError(
                "[agent].process_name must not be empty".to_string(),
            ));
        }

        let signal = parse_signal(&raw.agent.signal)
            .map_err(|e| ReloadError::ConfigError(format!("[agent].signal: {e}")))?;

        let validator = if raw.validator.enabled {
            if raw.validator.program.as_os_str().is_empty() {
                return Err(ReloadError::ConfigError(
                    "[validator].program must be set when validation is enabled".to_string(),
                ));
            }
            Some(ValidatorSettings {
                program: raw.validator.program.clone(),
                args: raw.validator.args.clone(),
                timeout: positive_duration("[validator].timeout", &raw.validator.timeout)?,
            })
        } else {
            None
        };

        Ok(Settings {
            root_dir,
            backend: raw.watch.backend,
            poll_interval,
            debounce,
            policy,
            process_name,
            signal,
            validator,
        })
    }
}

fn positive_duration(field: &str, s: &str) -> Result<Duration> {
    let d = parse_duration(s).map_err(|e| ReloadError::ConfigError(format!("{field}: {e}")))?;
    if d.is_zero() {
        return Err(ReloadError::ConfigError(format!("{field} must be greater than zero")));
    }
    Ok(d)
}

/// Parse `"500ms"`, `"10s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}
