// src/errors.rs

//! Crate-wide error types.
//!
//! Only [`ReloadError`] ever reaches `main`; the per-stage errors
//! ([`ValidationError`], [`SignalError`]) are logged by the pipeline and
//! turned into a skipped cycle.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReloadError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("File watcher error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("File watcher event channel closed")]
    WatcherClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a rule file did not pass validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("validator rejected {path:?} (exit code {code:?})")]
    Rejected { path: PathBuf, code: Option<i32> },

    #[error("validator did not finish within {timeout:?} for {path:?}")]
    TimedOut { path: PathBuf, timeout: Duration },

    #[error("failed to run validator for {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ValidationError {
    /// The rule file the failure refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            ValidationError::Rejected { path, .. }
            | ValidationError::TimedOut { path, .. }
            | ValidationError::Spawn { path, .. } => path,
        }
    }
}

/// Failure to deliver the reload signal.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("process {pid} no longer exists")]
    NoSuchProcess { pid: u32 },

    #[error("failed to signal process {pid}: {message}")]
    Delivery { pid: u32, message: String },
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ReloadError>;
