#![allow(dead_code)]

use std::path::PathBuf;

use rulereload::config::{Overrides, RawSettings, Settings};
use rulereload::engine::Pipeline;
use rulereload::types::{ChangeEvent, ChangeKind};
use rulereload::watch::{Candidate, Fingerprint};

use crate::fakes::{FakeLocator, FakeValidator, RecordingSignaler};

/// Builder for `Fingerprint` to simplify test setup.
#[derive(Debug, Default)]
pub struct FingerprintBuilder {
    fingerprint: Fingerprint,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, digest: &str) -> Self {
        self.fingerprint.insert(PathBuf::from(path), digest);
        self
    }

    pub fn build(self) -> Fingerprint {
        self.fingerprint
    }
}

/// A candidate for `fingerprint`, reporting `path` as the change.
pub fn candidate(path: &str, kind: ChangeKind, fingerprint: Fingerprint) -> Candidate {
    Candidate {
        change: ChangeEvent::new(path, kind),
        fingerprint,
    }
}

/// Builder for `Pipeline` wired to fakes. The fakes are cloned in, so the
/// caller's handles observe everything the pipeline does.
pub struct PipelineBuilder {
    validator: Option<FakeValidator>,
    locator: FakeLocator,
    signaler: RecordingSignaler,
    process_name: String,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            validator: Some(FakeValidator::new()),
            locator: FakeLocator::running("falco", 4242),
            signaler: RecordingSignaler::new(),
            process_name: "falco".to_string(),
        }
    }

    pub fn with_validator(mut self, validator: &FakeValidator) -> Self {
        self.validator = Some(validator.clone());
        self
    }

    pub fn without_validator(mut self) -> Self {
        self.validator = None;
        self
    }

    pub fn with_locator(mut self, locator: &FakeLocator) -> Self {
        self.locator = locator.clone();
        self
    }

    pub fn with_signaler(mut self, signaler: &RecordingSignaler) -> Self {
        self.signaler = signaler.clone();
        self
    }

    pub fn with_process_name(mut self, name: &str) -> Self {
        self.process_name = name.to_string();
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(
            self.validator
                .map(|v| Box::new(v) as Box<dyn rulereload::reload::RuleValidator>),
            Box::new(self.locator),
            Box::new(self.signaler),
            self.process_name,
        )
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Default settings rooted at `root`, as if `FALCO_ROOTDIR` were set.
pub fn settings_for(root: impl Into<PathBuf>) -> Settings {
    let raw = RawSettings::default().apply(&Overrides {
        root_dir: Some(root.into()),
        ..Overrides::default()
    });
    Settings::try_from(raw).expect("default settings are valid")
}
