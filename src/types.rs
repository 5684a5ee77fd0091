use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

/// Which change detection backend drives the daemon.
///
/// - `Poll`: recompute the whole fingerprint on a fixed interval and compare
///   it against the baseline (default; works on any filesystem).
/// - `Events`: react to native filesystem notifications and re-hash only the
///   paths an event names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackend {
    #[default]
    Poll,
    Events,
}

impl FromStr for WatchBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "poll" | "polling" => Ok(WatchBackend::Poll),
            "events" | "event" | "notify" => Ok(WatchBackend::Events),
            other => Err(format!(
                "invalid watch backend: {other} (expected \"poll\" or \"events\")"
            )),
        }
    }
}

/// What happened to a tracked file between two fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Modified,
    Removed,
    Created,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
            ChangeKind::Created => "created",
        };
        f.write_str(s)
    }
}

/// A single logical configuration change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// A running instance of the monitored agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
}
