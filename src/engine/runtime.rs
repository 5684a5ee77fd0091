// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::watch::source::ChangeSource;

use super::core::{CoreCommand, CoreEvent, CoreRuntime};
use super::pipeline::Pipeline;
use super::RuntimeEvent;

/// Drives the core in response to change candidates and control events, and
/// runs the reload pipeline for each cycle the core starts.
///
/// There is exactly one selection point: the shutdown channel against either
/// the change source (when idle) or the running cycle. The source is not
/// polled again until the current cycle has finished, so at most one reload
/// is in flight.
pub struct Runtime {
    core: CoreRuntime,
    source: Box<dyn ChangeSource>,
    pipeline: Pipeline,
    control_rx: mpsc::Receiver<RuntimeEvent>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        core: CoreRuntime,
        source: Box<dyn ChangeSource>,
        pipeline: Pipeline,
        control_rx: mpsc::Receiver<RuntimeEvent>,
    ) -> Self {
        Self {
            core,
            source,
            pipeline,
            control_rx,
        }
    }

    pub fn core(&self) -> &CoreRuntime {
        &self.core
    }

    /// Main event loop.
    ///
    /// Returns `Ok` after a shutdown request, and the source's error if
    /// change detection breaks (the watcher cannot recover from that).
    /// Returns the final core so callers can inspect the baseline.
    pub async fn run(mut self) -> Result<CoreRuntime> {
        info!(
            files = self.core.baseline().len(),
            process = %self.pipeline.process_name(),
            "rulereload runtime started"
        );

        let mut control_open = true;

        loop {
            let candidate = tokio::select! {
                biased;
                ctl = self.control_rx.recv(), if control_open => {
                    match ctl {
                        Some(RuntimeEvent::ShutdownRequested) => break,
                        None => {
                            debug!("control channel closed; only the change source remains");
                            control_open = false;
                            continue;
                        }
                    }
                }
                res = self.source.next_change(self.core.baseline()) => res?,
            };

            let step = self.core.step(CoreEvent::ChangeDetected(candidate));

            for command in step.commands {
                let CoreCommand::RunCycle(candidate) = command;

                let outcome = tokio::select! {
                    biased;
                    ctl = self.control_rx.recv(), if control_open => {
                        match ctl {
                            Some(RuntimeEvent::ShutdownRequested) => {
                                info!(state = %self.core.state(), "shutdown during reload cycle; abandoning it");
                                self.core.step(CoreEvent::ShutdownRequested);
                                return Ok(self.finish());
                            }
                            None => {
                                // Finish the cycle without the control channel.
                                control_open = false;
                                self.pipeline.run_cycle(&candidate, self.core.stage_mut()).await
                            }
                        }
                    }
                    outcome = self.pipeline.run_cycle(&candidate, self.core.stage_mut()) => outcome,
                };

                debug!(?outcome, "reload cycle finished");
                self.core.step(CoreEvent::CycleFinished(outcome));
            }

            if !step.keep_running {
                break;
            }
        }

        self.core.step(CoreEvent::ShutdownRequested);
        Ok(self.finish())
    }

    fn finish(self) -> CoreRuntime {
        // Dropping the source releases the filesystem watcher.
        drop(self.source);
        info!("runtime exiting");
        self.core
    }
}
