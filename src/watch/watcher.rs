// src/watch/watcher.rs

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::{ReloadError, Result};
use crate::fs::FileSystem;
use crate::watch::fingerprint::canonical_dir;
use crate::watch::patterns::TrackingPolicy;

/// Something that can register and drop single-path watches.
///
/// Production uses [`NotifyRegistry`]; tests plug in a recording fake so the
/// re-arm logic can be exercised without inotify.
pub trait WatchRegistry: Send {
    fn watch(&mut self, path: &Path) -> Result<()>;
    fn unwatch(&mut self, path: &Path) -> Result<()>;
}

/// [`WatchRegistry`] backed by the platform's recommended `notify` watcher.
///
/// Dropping it releases every registered watch.
pub struct NotifyRegistry {
    inner: RecommendedWatcher,
}

impl std::fmt::Debug for NotifyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyRegistry").finish()
    }
}

impl WatchRegistry for NotifyRegistry {
    fn watch(&mut self, path: &Path) -> Result<()> {
        self.inner.watch(path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        self.inner.unwatch(path)?;
        Ok(())
    }
}

/// The set of currently registered watch targets.
///
/// Files are watched individually (mounted config is usually one symlink per
/// file) and every directory gets a non-recursive watch so new files show up.
/// Paths whose watch could not be re-added are parked in `pending` until a
/// later event lets us arm them again. A path that is gone from disk under a
/// watched directory is forgotten instead; the directory watch reports it
/// again if it comes back.
#[derive(Debug)]
pub struct WatchSet<R: WatchRegistry> {
    registry: R,
    targets: BTreeSet<PathBuf>,
    pending: BTreeSet<PathBuf>,
}

impl<R: WatchRegistry> WatchSet<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            targets: BTreeSet::new(),
            pending: BTreeSet::new(),
        }
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.targets.contains(path)
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.contains(path)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Register the root and everything below it.
    ///
    /// Failing to list or watch the root is fatal; individual entries that
    /// cannot be watched are logged and parked as pending.
    pub fn arm_tree(&mut self, fs: &dyn FileSystem, root: &Path, policy: &TrackingPolicy) -> Result<()> {
        self.registry.watch(root)?;
        self.targets.insert(root.to_path_buf());

        let top = fs.read_dir(root)?;
        self.arm_entries(fs, root, policy, root, top);
        Ok(())
    }

    fn arm_entries(
        &mut self,
        fs: &dyn FileSystem,
        root: &Path,
        policy: &TrackingPolicy,
        start: &Path,
        entries: Vec<PathBuf>,
    ) {
        let mut visited = HashSet::new();
        visited.insert(canonical_dir(fs, start));

        let mut stack = vec![entries];
        while let Some(entries) = stack.pop() {
            for path in entries {
                if fs.is_dir(&path) {
                    if !policy.should_descend(root, &path) {
                        continue;
                    }
                    if !visited.insert(canonical_dir(fs, &path)) {
                        debug!(path = %path.display(), "directory already armed; skipping");
                        continue;
                    }
                    self.add(&path);
                    match fs.read_dir(&path) {
                        Ok(children) => stack.push(children),
                        Err(err) => {
                            warn!(path = %path.display(), error = %err, "can't list directory for watching");
                        }
                    }
                } else {
                    self.add(&path);
                }
            }
        }
    }

    /// Register a watch for `path` unless it already has one.
    pub fn add(&mut self, path: &Path) -> bool {
        if self.targets.contains(path) {
            return true;
        }
        match self.registry.watch(path) {
            Ok(()) => {
                self.pending.remove(path);
                self.targets.insert(path.to_path_buf());
                debug!(path = %path.display(), "watch added");
                true
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "can't watch path; will retry");
                self.pending.insert(path.to_path_buf());
                false
            }
        }
    }

    /// Drop and re-add the watch for `path`.
    ///
    /// A symlink swap replaces the inode behind a watched path; the old watch
    /// then never fires again, so it has to be registered afresh against the
    /// new target. A path that no longer exists under a watched directory is
    /// dropped for good.
    pub fn rearm(&mut self, fs: &dyn FileSystem, path: &Path) -> bool {
        if self.targets.remove(path) {
            if let Err(err) = self.registry.unwatch(path) {
                // The kernel usually dropped it already when the inode went away.
                debug!(path = %path.display(), error = %err, "unwatch before re-arm failed");
            }
        }
        if self.is_gone(fs, path) {
            self.pending.remove(path);
            debug!(path = %path.display(), "watch target removed");
            return false;
        }
        let armed = self.add(path);
        if armed {
            debug!(path = %path.display(), "watch re-armed");
        }
        armed
    }

    /// Number of parked paths waiting for a retry.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Try to arm every parked path again, forgetting the ones that are gone.
    pub fn retry_pending(&mut self, fs: &dyn FileSystem) {
        let pending: Vec<PathBuf> = self.pending.iter().cloned().collect();
        for path in pending {
            if self.is_gone(fs, &path) {
                self.pending.remove(&path);
                debug!(path = %path.display(), "dropped pending watch for removed path");
            } else if self.registry.watch(&path).is_ok() {
                self.pending.remove(&path);
                self.targets.insert(path.clone());
                debug!(path = %path.display(), "pending watch armed");
            }
        }
    }

    /// Missing from disk while its parent directory is watched, so a
    /// reappearance arrives as a create event.
    fn is_gone(&self, fs: &dyn FileSystem, path: &Path) -> bool {
        !fs.exists(path) && path.parent().is_some_and(|parent| self.targets.contains(parent))
    }

    /// Keep the watch set in line with a raw event.
    ///
    /// - write/remove/rename (or an unspecified kind) on a watched or pending
    ///   path: re-arm it, or forget it if it is gone
    /// - create under the root: watch the new file, or the new directory and
    ///   everything in it
    /// - anything touching a directory: retry parked paths, since a swapped
    ///   data directory is what usually brings them back
    pub fn handle_event(
        &mut self,
        event: &Event,
        fs: &dyn FileSystem,
        root: &Path,
        policy: &TrackingPolicy,
    ) {
        match event.kind {
            EventKind::Any
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Name(_)) => {
                for path in &event.paths {
                    if self.targets.contains(path) || self.pending.contains(path) {
                        if path.as_path() == root {
                            continue;
                        }
                        self.rearm(fs, path);
                    } else if fs.exists(path) && path.starts_with(root) {
                        self.add_new(fs, root, policy, path);
                    }
                }
            }
            EventKind::Create(_) => {
                for path in &event.paths {
                    if path.starts_with(root) {
                        self.add_new(fs, root, policy, path);
                    }
                }
            }
            _ => return,
        }

        if !self.pending.is_empty() {
            self.retry_pending(fs);
        }
    }

    fn add_new(&mut self, fs: &dyn FileSystem, root: &Path, policy: &TrackingPolicy, path: &Path) {
        if fs.is_dir(path) {
            if !policy.should_descend(root, path) {
                return;
            }
            self.add(path);
            match fs.read_dir(path) {
                Ok(children) => self.arm_entries(fs, root, policy, path, children),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "can't list new directory");
                }
            }
        } else if policy.should_descend(root, path) {
            self.add(path);
        }
    }
}

/// Live filesystem watcher over the rule tree.
///
/// Raw `notify` events are forwarded from the watcher callback into a Tokio
/// channel; [`DirectoryWatcher::next_event`] keeps the watch set armed and
/// hands each event on. Dropping the watcher releases every watch.
pub struct DirectoryWatcher<R: WatchRegistry = NotifyRegistry> {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    policy: TrackingPolicy,
    set: WatchSet<R>,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl<R: WatchRegistry> std::fmt::Debug for DirectoryWatcher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("root", &self.root)
            .field("targets", &self.set.len())
            .finish_non_exhaustive()
    }
}

impl DirectoryWatcher<NotifyRegistry> {
    /// Create the platform watcher and arm it over `root`.
    pub fn start(root: &Path, fs: Arc<dyn FileSystem>, policy: TrackingPolicy) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        // Closure called synchronously by notify whenever an event arrives.
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // A send error only means the daemon is shutting down.
                let _ = event_tx.send(res);
            },
            Config::default(),
        )?;

        let watcher = Self::with_registry(
            root,
            fs,
            policy,
            NotifyRegistry { inner: watcher },
            event_rx,
        )?;
        info!(root = %watcher.root.display(), targets = watcher.set.len(), "file watcher started");
        Ok(watcher)
    }
}

impl<R: WatchRegistry> DirectoryWatcher<R> {
    /// Build a watcher from an arbitrary registry and raw event stream.
    pub fn with_registry(
        root: &Path,
        fs: Arc<dyn FileSystem>,
        policy: TrackingPolicy,
        registry: R,
        events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    ) -> Result<Self> {
        let mut set = WatchSet::new(registry);
        set.arm_tree(fs.as_ref(), root, &policy)?;
        Ok(Self {
            root: root.to_path_buf(),
            fs,
            policy,
            set,
            events,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn watch_set(&self) -> &WatchSet<R> {
        &self.set
    }

    /// Wait for the next raw event, re-arming watches it affects.
    ///
    /// A watcher error or a closed event channel is returned as an error;
    /// the watcher cannot recover from either.
    pub async fn next_event(&mut self) -> Result<Event> {
        match self.events.recv().await {
            Some(Ok(event)) => {
                debug!(kind = ?event.kind, paths = ?event.paths, "received notify event");
                self.set
                    .handle_event(&event, self.fs.as_ref(), &self.root, &self.policy);
                Ok(event)
            }
            Some(Err(err)) => Err(ReloadError::from(err)),
            None => Err(ReloadError::WatcherClosed),
        }
    }
}
