// src/engine/mod.rs

//! Orchestration engine for rulereload.
//!
//! This module ties together:
//! - the baseline fingerprint and pipeline state ([`core`])
//! - the validate → locate → signal sequence ([`pipeline`])
//! - the async loop multiplexing change detection and shutdown ([`runtime`])
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::fmt;
use std::path::PathBuf;

/// Where the daemon currently is in a reload cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Waiting for the next tick or event.
    Idle,
    /// A candidate change was accepted for processing.
    Detecting,
    Validating,
    Locating,
    Signaling,
    /// Shutdown requested; no new cycles start.
    Terminating,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Detecting => "detecting",
            PipelineState::Validating => "validating",
            PipelineState::Locating => "locating",
            PipelineState::Signaling => "signaling",
            PipelineState::Terminating => "terminating",
        };
        f.write_str(s)
    }
}

/// How a single reload cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Signal delivered.
    Reloaded { pid: u32 },
    /// A tracked file failed validation; nothing was signalled.
    ValidationFailed { path: PathBuf },
    /// No process with the agent's name is running.
    AgentNotRunning,
    /// The process table could not be read.
    LocateFailed,
    /// The agent was found but the signal could not be delivered.
    SignalFailed { pid: u32 },
}

impl CycleOutcome {
    /// Only a delivered reload moves the baseline forward.
    pub fn advances_baseline(&self) -> bool {
        matches!(self, CycleOutcome::Reloaded { .. })
    }
}

/// Control messages from outside the loop (signal listeners).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// Graceful shutdown requested (SIGINT / SIGTERM).
    ShutdownRequested,
}

pub mod core;
pub mod pipeline;
pub mod runtime;

pub use self::core::{CoreCommand, CoreEvent, CoreRuntime, CoreStep};
pub use pipeline::Pipeline;
pub use runtime::Runtime;
