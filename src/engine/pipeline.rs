// src/engine/pipeline.rs

//! The validate → locate → signal sequence for one candidate.

use std::fmt;

use tracing::{error, info, warn};

use crate::engine::{CycleOutcome, PipelineState};
use crate::reload::{validate_all, ProcessLocator, ReloadSignaler, RuleValidator};
use crate::watch::source::Candidate;

/// The reload stages, wired to concrete capabilities.
///
/// `validator` is optional: with validation disabled a change goes straight
/// to locating the agent.
pub struct Pipeline {
    validator: Option<Box<dyn RuleValidator>>,
    locator: Box<dyn ProcessLocator>,
    signaler: Box<dyn ReloadSignaler>,
    process_name: String,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("validates", &self.validator.is_some())
            .field("process_name", &self.process_name)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        validator: Option<Box<dyn RuleValidator>>,
        locator: Box<dyn ProcessLocator>,
        signaler: Box<dyn ReloadSignaler>,
        process_name: impl Into<String>,
    ) -> Self {
        Self {
            validator,
            locator,
            signaler,
            process_name: process_name.into(),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Run one cycle to completion, recording progress in `stage`.
    ///
    /// Never fails: every problem becomes a [`CycleOutcome`] that leaves the
    /// baseline alone.
    pub async fn run_cycle(&self, candidate: &Candidate, stage: &mut PipelineState) -> CycleOutcome {
        if let Some(validator) = &self.validator {
            *stage = PipelineState::Validating;
            if let Err(err) = validate_all(validator.as_ref(), &candidate.fingerprint).await {
                warn!(path = %err.path().display(), error = %err, "wrong syntax for rule file");
                return CycleOutcome::ValidationFailed {
                    path: err.path().clone(),
                };
            }
        }

        *stage = PipelineState::Locating;
        let process = match self.locator.locate(&self.process_name) {
            Ok(Some(process)) => {
                info!(executable = %process.name, pid = process.pid, "found agent process");
                process
            }
            Ok(None) => {
                info!(executable = %self.process_name, "no running process found for agent");
                return CycleOutcome::AgentNotRunning;
            }
            Err(err) => {
                error!(executable = %self.process_name, error = %err, "process lookup failed");
                return CycleOutcome::LocateFailed;
            }
        };

        *stage = PipelineState::Signaling;
        match self.signaler.signal(process.pid) {
            Ok(()) => CycleOutcome::Reloaded { pid: process.pid },
            Err(err) => {
                warn!(pid = process.pid, error = %err, "could not send reload signal to agent");
                CycleOutcome::SignalFailed { pid: process.pid }
            }
        }
    }
}
