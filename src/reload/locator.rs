// src/reload/locator.rs

use sysinfo::System;
use tracing::debug;

use crate::errors::Result;
use crate::types::ProcessHandle;

/// Finds the running agent by executable name.
///
/// `Ok(None)` means the agent is simply not running right now.
pub trait ProcessLocator: Send + Sync {
    fn locate(&self, executable: &str) -> Result<Option<ProcessHandle>>;
}

/// Reads the OS process table through `sysinfo`.
///
/// The table is refreshed on every call; pids are never cached because the
/// agent may have restarted since the last reload.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessLocator;

impl SystemProcessLocator {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLocator for SystemProcessLocator {
    fn locate(&self, executable: &str) -> Result<Option<ProcessHandle>> {
        let mut sys = System::new();
        sys.refresh_processes();

        let processes = sys
            .processes()
            .iter()
            .map(|(pid, process)| (pid.as_u32(), process.name().to_string()));

        let found = pick_process(processes, executable);
        debug!(executable, found = ?found, "process lookup");
        Ok(found)
    }
}

/// Exact-name match; with several matches the one with the highest pid wins.
pub fn pick_process<I>(processes: I, executable: &str) -> Option<ProcessHandle>
where
    I: IntoIterator<Item = (u32, String)>,
{
    processes
        .into_iter()
        .filter(|(_, name)| name == executable)
        .max_by_key(|(pid, _)| *pid)
        .map(|(pid, name)| ProcessHandle { pid, name })
}
