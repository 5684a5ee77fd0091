// src/reload/mod.rs

//! The reload side of the pipeline: validate the candidate rule tree, find the
//! agent, and signal it.
//!
//! Each stage sits behind a small trait so the orchestrator can be driven by
//! fakes in tests:
//! - [`validator`]: [`RuleValidator`] and the command-based implementation.
//! - [`locator`]: [`ProcessLocator`] over the OS process table.
//! - [`signaler`]: [`ReloadSignaler`] delivering a Unix signal.

pub mod locator;
pub mod signaler;
pub mod validator;

pub use locator::{pick_process, ProcessLocator, SystemProcessLocator};
pub use signaler::{parse_signal, ReloadSignaler, UnixSignaler};
pub use validator::{validate_all, CommandValidator, RuleValidator};
