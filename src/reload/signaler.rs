// src/reload/signaler.rs

use std::str::FromStr;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::info;

use crate::errors::SignalError;

/// Delivers the reload signal to the agent.
pub trait ReloadSignaler: Send + Sync {
    fn signal(&self, pid: u32) -> Result<(), SignalError>;
}

/// Sends a Unix signal (SIGHUP unless configured otherwise) with `kill(2)`.
#[derive(Debug, Clone, Copy)]
pub struct UnixSignaler {
    signal: Signal,
}

impl Default for UnixSignaler {
    fn default() -> Self {
        Self {
            signal: Signal::SIGHUP,
        }
    }
}

impl UnixSignaler {
    pub fn new(signal: Signal) -> Self {
        Self { signal }
    }

    pub fn signal_kind(&self) -> Signal {
        self.signal
    }
}

impl ReloadSignaler for UnixSignaler {
    fn signal(&self, pid: u32) -> Result<(), SignalError> {
        let raw = i32::try_from(pid).map_err(|_| SignalError::Delivery {
            pid,
            message: "pid out of range".to_string(),
        })?;

        match kill(Pid::from_raw(raw), self.signal) {
            Ok(()) => {
                info!(pid, signal = %self.signal, "reload signal sent");
                Ok(())
            }
            Err(Errno::ESRCH) => Err(SignalError::NoSuchProcess { pid }),
            Err(errno) => Err(SignalError::Delivery {
                pid,
                message: errno.desc().to_string(),
            }),
        }
    }
}

/// Parse a signal name: `SIGHUP`, `HUP` and `hup` all work.
pub fn parse_signal(name: &str) -> Result<Signal, String> {
    let upper = name.trim().to_ascii_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&full).map_err(|_| format!("unknown signal name: {name}"))
}
