//! In-memory stand-ins for the reload pipeline's seams.
//!
//! Every fake is cheap to clone and clones share state, so a test keeps one
//! handle for assertions and gives the other to the code under test.

use std::collections::BTreeSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use rulereload::errors::{ReloadError, Result, SignalError, ValidationError};
use rulereload::reload::{ProcessLocator, ReloadSignaler, RuleValidator};
use rulereload::types::ProcessHandle;
use rulereload::watch::{Candidate, ChangeSource, Fingerprint, WatchRegistry};

/// Validator that accepts everything except paths marked as rejected.
#[derive(Debug, Clone, Default)]
pub struct FakeValidator {
    rejected: Arc<Mutex<BTreeSet<PathBuf>>>,
    calls: Arc<Mutex<Vec<PathBuf>>>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every validation sleeps for `delay` first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reject(&self, path: impl Into<PathBuf>) {
        self.rejected.lock().unwrap().insert(path.into());
    }

    pub fn accept(&self, path: &Path) {
        self.rejected.lock().unwrap().remove(path);
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of validations that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl RuleValidator for FakeValidator {
    fn validate<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), ValidationError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(path.to_path_buf());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.rejected.lock().unwrap().contains(path) {
                Err(ValidationError::Rejected {
                    path: path.to_path_buf(),
                    code: Some(1),
                })
            } else {
                Ok(())
            }
        })
    }
}

/// Process table with at most one agent in it.
#[derive(Debug, Clone, Default)]
pub struct FakeLocator {
    running: Arc<Mutex<Option<ProcessHandle>>>,
    fail: Arc<AtomicBool>,
    lookups: Arc<AtomicUsize>,
}

impl FakeLocator {
    /// An agent called `name` is running as `pid`.
    pub fn running(name: &str, pid: u32) -> Self {
        let locator = Self::default();
        locator.start(name, pid);
        locator
    }

    pub fn stopped() -> Self {
        Self::default()
    }

    pub fn start(&self, name: &str, pid: u32) {
        *self.running.lock().unwrap() = Some(ProcessHandle {
            pid,
            name: name.to_string(),
        });
    }

    pub fn stop(&self) {
        *self.running.lock().unwrap() = None;
    }

    /// Make every lookup fail as if the process table were unreadable.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ProcessLocator for FakeLocator {
    fn locate(&self, executable: &str) -> Result<Option<ProcessHandle>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReloadError::IoError(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "process table unreadable",
            )));
        }
        Ok(self
            .running
            .lock()
            .unwrap()
            .clone()
            .filter(|p| p.name == executable))
    }
}

/// Records every pid it was asked to signal.
#[derive(Debug, Clone, Default)]
pub struct RecordingSignaler {
    sent: Arc<Mutex<Vec<u32>>>,
    vanished: Arc<AtomicBool>,
}

impl RecordingSignaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the process exits between lookup and signal.
    pub fn set_vanished(&self, vanished: bool) {
        self.vanished.store(vanished, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<u32> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl ReloadSignaler for RecordingSignaler {
    fn signal(&self, pid: u32) -> std::result::Result<(), SignalError> {
        if self.vanished.load(Ordering::SeqCst) {
            return Err(SignalError::NoSuchProcess { pid });
        }
        self.sent.lock().unwrap().push(pid);
        Ok(())
    }
}

/// Change source fed by hand through a [`ScriptHandle`].
///
/// Once the handle is dropped and the queue is drained the source never
/// resolves again, like an idle watcher.
#[derive(Debug)]
pub struct ScriptedSource {
    rx: mpsc::UnboundedReceiver<Candidate>,
    baselines: Arc<Mutex<Vec<Fingerprint>>>,
}

#[derive(Debug, Clone)]
pub struct ScriptHandle {
    tx: mpsc::UnboundedSender<Candidate>,
    baselines: Arc<Mutex<Vec<Fingerprint>>>,
}

impl ScriptedSource {
    pub fn channel() -> (Self, ScriptHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let baselines = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                rx,
                baselines: Arc::clone(&baselines),
            },
            ScriptHandle { tx, baselines },
        )
    }
}

impl ScriptHandle {
    pub fn push(&self, candidate: Candidate) {
        let _ = self.tx.send(candidate);
    }

    /// Baselines the runtime passed in, one per `next_change` call.
    pub fn baselines(&self) -> Vec<Fingerprint> {
        self.baselines.lock().unwrap().clone()
    }
}

impl ChangeSource for ScriptedSource {
    fn next_change<'a>(
        &'a mut self,
        baseline: &'a Fingerprint,
    ) -> Pin<Box<dyn Future<Output = Result<Candidate>> + Send + 'a>> {
        self.baselines.lock().unwrap().push(baseline.clone());
        Box::pin(async move {
            match self.rx.recv().await {
                Some(candidate) => Ok(candidate),
                None => std::future::pending().await,
            }
        })
    }
}

/// Change source that fails on the first call.
#[derive(Debug, Default)]
pub struct BrokenSource;

impl ChangeSource for BrokenSource {
    fn next_change<'a>(
        &'a mut self,
        _baseline: &'a Fingerprint,
    ) -> Pin<Box<dyn Future<Output = Result<Candidate>> + Send + 'a>> {
        Box::pin(async { Err(ReloadError::WatcherClosed) })
    }
}

/// Watch registry that records calls instead of talking to the kernel.
#[derive(Debug, Clone, Default)]
pub struct FakeRegistry {
    state: Arc<Mutex<RegistryState>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    active: BTreeSet<PathBuf>,
    watch_calls: Vec<PathBuf>,
    unwatch_calls: Vec<PathBuf>,
    missing: BTreeSet<PathBuf>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watching `path` fails until [`FakeRegistry::restore`] is called, like
    /// a symlink whose target is briefly gone.
    pub fn make_missing(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().missing.insert(path.into());
    }

    pub fn restore(&self, path: &Path) {
        self.state.lock().unwrap().missing.remove(path);
    }

    pub fn is_active(&self, path: &Path) -> bool {
        self.state.lock().unwrap().active.contains(path)
    }

    /// How many times `watch` was called for `path`.
    pub fn watch_count(&self, path: &Path) -> usize {
        self.state
            .lock()
            .unwrap()
            .watch_calls
            .iter()
            .filter(|p| p.as_path() == path)
            .count()
    }

    pub fn unwatch_count(&self, path: &Path) -> usize {
        self.state
            .lock()
            .unwrap()
            .unwatch_calls
            .iter()
            .filter(|p| p.as_path() == path)
            .count()
    }
}

impl WatchRegistry for FakeRegistry {
    fn watch(&mut self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.watch_calls.push(path.to_path_buf());
        if state.missing.contains(path) {
            return Err(ReloadError::IoError(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )));
        }
        state.active.insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.unwatch_calls.push(path.to_path_buf());
        if state.active.remove(path) {
            Ok(())
        } else {
            Err(ReloadError::IoError(io::Error::new(
                io::ErrorKind::NotFound,
                "watch not registered",
            )))
        }
    }
}
