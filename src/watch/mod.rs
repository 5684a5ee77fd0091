// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Deciding which files under the root are tracked rule files
//!   ([`patterns`]).
//! - Fingerprinting the tracked files by content ([`fingerprint`], [`hash`]).
//! - Keeping per-file `notify` watches armed across symlink swaps
//!   ([`watcher`]).
//! - Turning ticks or raw events into reload candidates ([`source`]).
//!
//! It does **not** validate or reload anything; that is the job of
//! [`crate::reload`] and [`crate::engine`].

pub mod fingerprint;
pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod source;
pub mod watcher;

pub use fingerprint::{compute, diff, Fingerprint};
pub use patterns::TrackingPolicy;
pub use source::{build_source, Candidate, ChangeSource, EventSource, PollingSource};
pub use watcher::{DirectoryWatcher, NotifyRegistry, WatchRegistry, WatchSet};
