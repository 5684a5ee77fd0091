// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use nix::sys::signal::Signal;
use serde::Deserialize;

use crate::types::WatchBackend;
use crate::watch::patterns::TrackingPolicy;

/// Settings as read from an optional TOML file.
///
/// ```toml
/// [watch]
/// root_dir = "/etc/falco"
/// backend = "poll"          # or "events"
/// poll_interval = "10s"
/// debounce = "500ms"
/// primary_config = "falco.yaml"
/// extensions = ["yaml", "yml"]
/// exclude = ["drafts/**"]
///
/// [agent]
/// process_name = "falco"
/// signal = "SIGHUP"
///
/// [validator]
/// enabled = true
/// program = "/usr/bin/falco"
/// args = ["--validate"]
/// timeout = "30s"
/// ```
///
/// All sections are optional and have the defaults shown above, except
/// `root_dir`, which usually comes from `FALCO_ROOTDIR`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSettings {
    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub validator: ValidatorSection,
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    #[serde(default)]
    pub backend: WatchBackend,

    /// Polling period, e.g. `"10s"`.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Quiet window that ends an event burst, e.g. `"500ms"`.
    #[serde(default = "default_debounce")]
    pub debounce: String,

    /// File name of the agent's own config, never tracked. Empty disables.
    #[serde(default = "default_primary_config")]
    pub primary_config: String,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Root-relative globs to leave out of the fingerprint.
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_poll_interval() -> String {
    "10s".to_string()
}

fn default_debounce() -> String {
    "500ms".to_string()
}

fn default_primary_config() -> String {
    "falco.yaml".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["yaml".to_string(), "yml".to_string()]
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            root_dir: None,
            backend: WatchBackend::default(),
            poll_interval: default_poll_interval(),
            debounce: default_debounce(),
            primary_config: default_primary_config(),
            extensions: default_extensions(),
            exclude: Vec::new(),
        }
    }
}

/// `[agent]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// Executable name to look for in the process table.
    #[serde(default = "default_process_name")]
    pub process_name: String,

    /// Signal that makes the agent re-read its configuration.
    #[serde(default = "default_signal")]
    pub signal: String,
}

fn default_process_name() -> String {
    "falco".to_string()
}

fn default_signal() -> String {
    "SIGHUP".to_string()
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            process_name: default_process_name(),
            signal: default_signal(),
        }
    }
}

/// `[validator]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_validator_program")]
    pub program: PathBuf,

    /// Arguments placed before the rule file path.
    #[serde(default = "default_validator_args")]
    pub args: Vec<String>,

    #[serde(default = "default_validator_timeout")]
    pub timeout: String,
}

fn default_true() -> bool {
    true
}

fn default_validator_program() -> PathBuf {
    PathBuf::from("/usr/bin/falco")
}

fn default_validator_args() -> Vec<String> {
    vec!["--validate".to_string()]
}

fn default_validator_timeout() -> String {
    "30s".to_string()
}

impl Default for ValidatorSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            program: default_validator_program(),
            args: default_validator_args(),
            timeout: default_validator_timeout(),
        }
    }
}

/// Values from the command line / environment that win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub root_dir: Option<PathBuf>,
    pub backend: Option<WatchBackend>,
    pub poll_interval: Option<String>,
    pub process_name: Option<String>,
    pub no_validate: bool,
}

impl RawSettings {
    pub fn apply(mut self, overrides: &Overrides) -> Self {
        if let Some(root) = &overrides.root_dir {
            self.watch.root_dir = Some(root.clone());
        }
        if let Some(backend) = overrides.backend {
            self.watch.backend = backend;
        }
        if let Some(interval) = &overrides.poll_interval {
            self.watch.poll_interval = interval.clone();
        }
        if let Some(name) = &overrides.process_name {
            self.agent.process_name = name.clone();
        }
        if overrides.no_validate {
            self.validator.enabled = false;
        }
        self
    }
}

/// Validated, ready-to-use settings. Built with `Settings::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root_dir: PathBuf,
    pub backend: WatchBackend,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub policy: TrackingPolicy,
    pub process_name: String,
    pub signal: Signal,
    /// `None` when validation is disabled.
    pub validator: Option<ValidatorSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSettings {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}
