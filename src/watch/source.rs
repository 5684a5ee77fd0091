// src/watch/source.rs

//! Change sources: turn timer ticks or raw filesystem events into a single
//! logical "the rule tree changed" signal.
//!
//! The orchestrator only sees [`ChangeSource`]. Both implementations decide
//! reload-worthiness by comparing a fresh fingerprint against the baseline the
//! orchestrator passes in, so a burst of events (or the events caused by
//! re-arming a watch) collapses into at most one [`Candidate`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::types::ChangeEvent;
use crate::watch::fingerprint::{self, diff, Fingerprint};
use crate::watch::patterns::TrackingPolicy;
use crate::watch::watcher::{DirectoryWatcher, NotifyRegistry, WatchRegistry};

/// A detected change together with the fingerprint that becomes the new
/// baseline if the reload goes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub change: ChangeEvent,
    pub fingerprint: Fingerprint,
}

/// Produces reload candidates relative to a baseline.
///
/// `next_change` resolves only when something differs from `baseline`. An
/// error is fatal to the daemon.
pub trait ChangeSource: Send {
    fn next_change<'a>(
        &'a mut self,
        baseline: &'a Fingerprint,
    ) -> Pin<Box<dyn Future<Output = Result<Candidate>> + Send + 'a>>;
}

/// Recomputes the whole fingerprint on a fixed interval.
pub struct PollingSource {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    policy: TrackingPolicy,
    interval: Interval,
}

impl std::fmt::Debug for PollingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingSource")
            .field("root", &self.root)
            .field("period", &self.interval.period())
            .finish_non_exhaustive()
    }
}

impl PollingSource {
    /// The first comparison happens one `period` after construction.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        root: impl Into<PathBuf>,
        policy: TrackingPolicy,
        period: Duration,
    ) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            fs,
            root: root.into(),
            policy,
            interval,
        }
    }
}

/// One polling comparison. Owns its inputs so the walk can run on the
/// blocking pool.
async fn poll_once(
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    policy: TrackingPolicy,
    baseline: &Fingerprint,
) -> Option<Candidate> {
    let walk_root = root.clone();
    let fresh = match tokio::task::spawn_blocking(move || {
        fingerprint::compute(fs.as_ref(), &walk_root, &policy)
    })
    .await
    {
        Ok(Ok(fresh)) => fresh,
        Ok(Err(err)) => {
            warn!(root = %root.display(), error = %err, "failed to walk rule tree; keeping previous fingerprint");
            return None;
        }
        Err(err) => {
            warn!(error = %err, "fingerprint task failed; keeping previous fingerprint");
            return None;
        }
    };

    match diff(baseline, &fresh) {
        Some(change) => Some(Candidate {
            change,
            fingerprint: fresh,
        }),
        None => {
            trace!("poll: no change");
            None
        }
    }
}

impl ChangeSource for PollingSource {
    fn next_change<'a>(
        &'a mut self,
        baseline: &'a Fingerprint,
    ) -> Pin<Box<dyn Future<Output = Result<Candidate>> + Send + 'a>> {
        Box::pin(async move {
            loop {
                self.interval.tick().await;
                let fs = Arc::clone(&self.fs);
                let root = self.root.clone();
                let policy = self.policy.clone();
                if let Some(candidate) = poll_once(fs, root, policy, baseline).await {
                    return Ok(candidate);
                }
            }
        })
    }
}

/// Reacts to filesystem notifications from a [`DirectoryWatcher`].
///
/// Keeps an `observed` fingerprint of what is on disk, updated per event
/// path. After the first relevant event it keeps absorbing events until
/// `debounce` passes without any, then compares `observed` to the baseline.
pub struct EventSource<R: WatchRegistry = NotifyRegistry> {
    watcher: DirectoryWatcher<R>,
    fs: Arc<dyn FileSystem>,
    policy: TrackingPolicy,
    observed: Fingerprint,
    debounce: Duration,
}

impl<R: WatchRegistry> std::fmt::Debug for EventSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("watcher", &self.watcher)
            .field("observed", &self.observed.len())
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

impl<R: WatchRegistry> EventSource<R> {
    /// `initial` is the fingerprint the watcher was armed against, normally
    /// the orchestrator's starting baseline.
    pub fn new(
        watcher: DirectoryWatcher<R>,
        fs: Arc<dyn FileSystem>,
        policy: TrackingPolicy,
        initial: Fingerprint,
        debounce: Duration,
    ) -> Self {
        Self {
            watcher,
            fs,
            policy,
            observed: initial,
            debounce,
        }
    }

    pub fn watcher(&self) -> &DirectoryWatcher<R> {
        &self.watcher
    }

    pub fn observed(&self) -> &Fingerprint {
        &self.observed
    }

    /// Fold one event into `observed`. Returns whether it was relevant.
    fn absorb(&mut self, event: &Event) -> bool {
        if !is_content_event(&event.kind) {
            trace!(kind = ?event.kind, "ignoring non-content event");
            return false;
        }

        let root = self.watcher.root().to_path_buf();
        let mut relevant = false;
        for path in event.paths.iter().filter(|p| p.starts_with(&root)) {
            relevant = true;
            if self
                .observed
                .refresh_path(self.fs.as_ref(), &root, &self.policy, path)
            {
                debug!(path = %path.display(), kind = ?event.kind, "observed fingerprint updated");
            }
        }
        relevant
    }

    fn candidate(&self, baseline: &Fingerprint) -> Option<Candidate> {
        diff(baseline, &self.observed).map(|change| Candidate {
            change,
            fingerprint: self.observed.clone(),
        })
    }
}

impl<R: WatchRegistry> ChangeSource for EventSource<R> {
    fn next_change<'a>(
        &'a mut self,
        baseline: &'a Fingerprint,
    ) -> Pin<Box<dyn Future<Output = Result<Candidate>> + Send + 'a>> {
        Box::pin(async move {
            loop {
                let event = self.watcher.next_event().await?;
                if !self.absorb(&event) {
                    continue;
                }

                // Coalesce the rest of the burst.
                loop {
                    match time::timeout(self.debounce, self.watcher.next_event()).await {
                        Ok(Ok(event)) => {
                            self.absorb(&event);
                        }
                        Ok(Err(err)) => return Err(err),
                        Err(_quiet) => break,
                    }
                }

                match self.candidate(baseline) {
                    Some(candidate) => return Ok(candidate),
                    None => debug!("event burst left the rule tree unchanged"),
                }
            }
        })
    }
}

/// Writes, removals, creations and renames can change content; access and
/// metadata-only events cannot.
pub fn is_content_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Any
    )
}

/// Build the configured change source over `root`.
///
/// For the event backend this creates and arms the platform watcher; failing
/// to do so is fatal.
pub fn build_source(
    backend: crate::types::WatchBackend,
    fs: Arc<dyn FileSystem>,
    root: &Path,
    policy: TrackingPolicy,
    baseline: &Fingerprint,
    poll_interval: Duration,
    debounce: Duration,
) -> Result<Box<dyn ChangeSource>> {
    match backend {
        crate::types::WatchBackend::Poll => {
            info!(root = %root.display(), interval = ?poll_interval, "using polling change source");
            Ok(Box::new(PollingSource::new(fs, root, policy, poll_interval)))
        }
        crate::types::WatchBackend::Events => {
            let watcher = DirectoryWatcher::start(root, Arc::clone(&fs), policy.clone())?;
            info!(root = %root.display(), debounce = ?debounce, "using event-driven change source");
            Ok(Box::new(EventSource::new(
                watcher,
                fs,
                policy,
                baseline.clone(),
                debounce,
            )))
        }
    }
}
