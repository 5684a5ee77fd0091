// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`CoreEvent`]s and produces:
//! - an updated core state (baseline fingerprint, pipeline state)
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - waiting on the change source and the shutdown channel
//! - running the reload pipeline for a `RunCycle` command
//!
//! The core is unit tested without any Tokio, channels, filesystem, or
//! processes.

use tracing::{debug, info, warn};

use crate::engine::{CycleOutcome, PipelineState};
use crate::watch::fingerprint::Fingerprint;
use crate::watch::source::Candidate;

/// Input to [`CoreRuntime::step`].
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// The change source produced a candidate.
    ChangeDetected(Candidate),
    /// The in-flight cycle finished.
    CycleFinished(CycleOutcome),
    ShutdownRequested,
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Run validate → locate → signal for this candidate.
    RunCycle(Candidate),
}

/// Decision returned by the core after handling a single `CoreEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn idle() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: true,
        }
    }
}

/// Pure core runtime state.
///
/// Owns the baseline fingerprint for the daemon's lifetime. The baseline only
/// moves when a cycle reports [`CycleOutcome::Reloaded`]; every other outcome
/// leaves it in place so the same change is seen again on the next cycle.
#[derive(Debug)]
pub struct CoreRuntime {
    baseline: Fingerprint,
    state: PipelineState,
    in_flight: Option<Candidate>,
    reloads: u64,
}

impl CoreRuntime {
    pub fn new(baseline: Fingerprint) -> Self {
        Self {
            baseline,
            state: PipelineState::Idle,
            in_flight: None,
            reloads: 0,
        }
    }

    pub fn baseline(&self) -> &Fingerprint {
        &self.baseline
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Stage slot the pipeline updates while a cycle runs.
    pub fn stage_mut(&mut self) -> &mut PipelineState {
        &mut self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == PipelineState::Idle && self.in_flight.is_none()
    }

    /// Number of successful reloads so far.
    pub fn reloads(&self) -> u64 {
        self.reloads
    }

    /// Handle a single event, updating core state and returning the resulting
    /// commands for the IO shell.
    pub fn step(&mut self, event: CoreEvent) -> CoreStep {
        match event {
            CoreEvent::ChangeDetected(candidate) => self.handle_change(candidate),
            CoreEvent::CycleFinished(outcome) => self.handle_finished(outcome),
            CoreEvent::ShutdownRequested => {
                info!(state = %self.state, "shutdown requested");
                self.state = PipelineState::Terminating;
                CoreStep {
                    commands: Vec::new(),
                    keep_running: false,
                }
            }
        }
    }

    fn handle_change(&mut self, candidate: Candidate) -> CoreStep {
        match self.state {
            PipelineState::Terminating => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
            PipelineState::Idle if self.in_flight.is_none() => {
                info!(
                    path = %candidate.change.path.display(),
                    kind = %candidate.change.kind,
                    "a config file has changed, agent will be reloaded"
                );
                self.state = PipelineState::Detecting;
                self.in_flight = Some(candidate.clone());
                CoreStep {
                    commands: vec![CoreCommand::RunCycle(candidate)],
                    keep_running: true,
                }
            }
            busy => {
                // The baseline has not moved, so this change is seen again
                // once the running cycle is done.
                debug!(
                    state = %busy,
                    path = %candidate.change.path.display(),
                    "reload already in flight; ignoring change"
                );
                CoreStep::idle()
            }
        }
    }

    fn handle_finished(&mut self, outcome: CycleOutcome) -> CoreStep {
        let Some(candidate) = self.in_flight.take() else {
            warn!(?outcome, "cycle finished with nothing in flight");
            return CoreStep::idle();
        };

        if self.state != PipelineState::Terminating {
            self.state = PipelineState::Idle;
        }

        match &outcome {
            CycleOutcome::Reloaded { pid } => {
                self.baseline = candidate.fingerprint;
                self.reloads += 1;
                info!(pid, files = self.baseline.len(), "reload complete; baseline updated");
            }
            CycleOutcome::ValidationFailed { path } => {
                warn!(path = %path.display(), "could not reload the agent, rule files are not valid");
            }
            CycleOutcome::AgentNotRunning => {
                info!("agent not running; change will be retried");
            }
            CycleOutcome::LocateFailed => {
                warn!("could not read the process table; change will be retried");
            }
            CycleOutcome::SignalFailed { pid } => {
                warn!(pid, "failed to reload the agent; change will be retried");
            }
        }

        CoreStep::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeEvent, ChangeKind};
    use std::path::{Path, PathBuf};

    fn fp(digest: &str) -> Fingerprint {
        [(PathBuf::from("/r/rules.yaml"), digest.to_string())]
            .into_iter()
            .collect()
    }

    fn candidate(digest: &str) -> Candidate {
        Candidate {
            change: ChangeEvent::new("/r/rules.yaml", ChangeKind::Modified),
            fingerprint: fp(digest),
        }
    }

    #[test]
    fn idle_core_starts_a_cycle() {
        let mut core = CoreRuntime::new(fp("d1"));
        let step = core.step(CoreEvent::ChangeDetected(candidate("d2")));

        assert!(step.keep_running);
        assert_eq!(step.commands.len(), 1);
        assert_eq!(core.state(), PipelineState::Detecting);
    }

    #[test]
    fn changes_while_busy_do_not_start_another_cycle() {
        let mut core = CoreRuntime::new(fp("d1"));
        core.step(CoreEvent::ChangeDetected(candidate("d2")));

        for digest in ["d3", "d4", "d5"] {
            let step = core.step(CoreEvent::ChangeDetected(candidate(digest)));
            assert!(step.commands.is_empty());
        }
    }

    #[test]
    fn successful_reload_advances_baseline() {
        let mut core = CoreRuntime::new(fp("d1"));
        core.step(CoreEvent::ChangeDetected(candidate("d2")));
        core.step(CoreEvent::CycleFinished(CycleOutcome::Reloaded { pid: 4242 }));

        assert_eq!(core.baseline().get(Path::new("/r/rules.yaml")), Some("d2"));
        assert_eq!(core.reloads(), 1);
        assert!(core.is_idle());
    }

    #[test]
    fn failed_cycles_keep_baseline() {
        let outcomes = [
            CycleOutcome::ValidationFailed {
                path: PathBuf::from("/r/rules.yaml"),
            },
            CycleOutcome::AgentNotRunning,
            CycleOutcome::LocateFailed,
            CycleOutcome::SignalFailed { pid: 4242 },
        ];

        for outcome in outcomes {
            let mut core = CoreRuntime::new(fp("d1"));
            core.step(CoreEvent::ChangeDetected(candidate("d2")));
            core.step(CoreEvent::CycleFinished(outcome.clone()));

            assert_eq!(
                core.baseline().get(Path::new("/r/rules.yaml")),
                Some("d1"),
                "baseline moved after {outcome:?}"
            );
            assert!(core.is_idle());
        }
    }

    #[test]
    fn shutdown_stops_loop_and_blocks_new_cycles() {
        let mut core = CoreRuntime::new(fp("d1"));
        let step = core.step(CoreEvent::ShutdownRequested);
        assert!(!step.keep_running);

        let step = core.step(CoreEvent::ChangeDetected(candidate("d2")));
        assert!(step.commands.is_empty());
        assert!(!step.keep_running);
    }

    #[test]
    fn stray_finish_is_ignored() {
        let mut core = CoreRuntime::new(fp("d1"));
        core.step(CoreEvent::CycleFinished(CycleOutcome::Reloaded { pid: 1 }));
        assert_eq!(core.baseline(), &fp("d1"));
        assert_eq!(core.reloads(), 0);
    }
}
