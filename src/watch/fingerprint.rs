// src/watch/fingerprint.rs

//! Content fingerprint of the watched tree.
//!
//! A [`Fingerprint`] maps every tracked rule file to its BLAKE3 digest. The
//! orchestrator keeps one as its baseline; change sources build fresh ones
//! (wholesale when polling, incrementally when reacting to events) and
//! [`diff`] tells whether anything worth reloading happened.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::types::{ChangeEvent, ChangeKind};
use crate::watch::hash::compute_file_hash;
use crate::watch::patterns::TrackingPolicy;

/// Ordered `path -> digest` map of the tracked files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    digests: BTreeMap<PathBuf, String>,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.digests.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.digests.contains_key(path)
    }

    /// Tracked paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.digests.keys().map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.digests
            .iter()
            .map(|(p, d)| (p.as_path(), d.as_str()))
    }

    /// Insert or replace a digest, returning the previous one.
    pub fn insert(&mut self, path: impl Into<PathBuf>, digest: impl Into<String>) -> Option<String> {
        self.digests.insert(path.into(), digest.into())
    }

    pub fn remove(&mut self, path: &Path) -> Option<String> {
        self.digests.remove(path)
    }

    /// Drop `path` and everything below it. Returns true if anything went.
    pub fn remove_subtree(&mut self, path: &Path) -> bool {
        let before = self.digests.len();
        self.digests.retain(|p, _| !p.starts_with(path));
        self.digests.len() != before
    }

    /// Bring the entry (or subtree) for `path` in line with what is on disk.
    ///
    /// Used by the event-driven source after each filesystem event. Returns
    /// true if the fingerprint changed. A file that exists but cannot be read
    /// keeps its previous digest.
    pub fn refresh_path(
        &mut self,
        fs: &dyn FileSystem,
        root: &Path,
        policy: &TrackingPolicy,
        path: &Path,
    ) -> bool {
        if !fs.exists(path) {
            return self.remove_subtree(path);
        }

        if fs.is_dir(path) {
            if !policy.should_descend(root, path) {
                return false;
            }
            let mut fresh = Fingerprint::new();
            if let Err(err) = walk_into(fs, root, path, policy, &mut fresh) {
                warn!(path = %path.display(), error = %err, "failed to rescan directory");
                return false;
            }
            let mut changed = false;
            for (p, digest) in fresh.digests {
                if self.digests.get(&p) != Some(&digest) {
                    self.digests.insert(p, digest);
                    changed = true;
                }
            }
            return changed;
        }

        if !policy.is_tracked(root, path) {
            return false;
        }

        match compute_file_hash(fs, path) {
            Ok(digest) => self.insert(path, digest.clone()).as_deref() != Some(digest.as_str()),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "can't hash file; keeping previous digest");
                false
            }
        }
    }
}

impl FromIterator<(PathBuf, String)> for Fingerprint {
    fn from_iter<T: IntoIterator<Item = (PathBuf, String)>>(iter: T) -> Self {
        Self {
            digests: iter.into_iter().collect(),
        }
    }
}

/// Walk `root` and digest every tracked file.
///
/// Fails only if `root` itself cannot be listed; the caller then keeps its
/// previous fingerprint. Unreadable files and subdirectories are logged and
/// left out of this fingerprint.
pub fn compute(fs: &dyn FileSystem, root: &Path, policy: &TrackingPolicy) -> Result<Fingerprint> {
    let mut fingerprint = Fingerprint::new();
    walk_into(fs, root, root, policy, &mut fingerprint)?;
    debug!(root = %root.display(), files = fingerprint.len(), "computed fingerprint");
    Ok(fingerprint)
}

fn walk_into(
    fs: &dyn FileSystem,
    root: &Path,
    start: &Path,
    policy: &TrackingPolicy,
    out: &mut Fingerprint,
) -> Result<()> {
    let top = fs
        .read_dir(start)
        .with_context(|| format!("walking {:?}", start))?;
    let mut stack = vec![top];
    let mut visited = HashSet::new();
    visited.insert(canonical_dir(fs, start));

    while let Some(entries) = stack.pop() {
        for path in entries {
            if fs.is_dir(&path) {
                if !policy.should_descend(root, &path) {
                    continue;
                }
                // Directory links can point back up the tree.
                if !visited.insert(canonical_dir(fs, &path)) {
                    debug!(path = %path.display(), "directory already walked; skipping");
                    continue;
                }
                match fs.read_dir(&path) {
                    Ok(children) => stack.push(children),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "can't list directory; skipping");
                    }
                }
            } else if fs.is_file(&path) && policy.is_tracked(root, &path) {
                match compute_file_hash(fs, &path) {
                    Ok(digest) => {
                        out.insert(path, digest);
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "can't hash file; skipping");
                    }
                }
            }
        }
    }

    Ok(())
}

/// Identity of a directory for loop detection; falls back to the path as
/// given when it can't be resolved.
pub(crate) fn canonical_dir(fs: &dyn FileSystem, path: &Path) -> PathBuf {
    fs.canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// First path (in sorted order) whose digest differs between `old` and `new`.
///
/// A key only in `new` is reported as created, a key only in `old` as
/// removed. Returns `None` when both fingerprints are equal.
pub fn diff(old: &Fingerprint, new: &Fingerprint) -> Option<ChangeEvent> {
    let mut old_iter = old.digests.iter().peekable();
    let mut new_iter = new.digests.iter().peekable();

    loop {
        match (old_iter.peek(), new_iter.peek()) {
            (None, None) => return None,
            (Some((path, _)), None) => {
                return Some(ChangeEvent::new(*path, ChangeKind::Removed));
            }
            (None, Some((path, _))) => {
                return Some(ChangeEvent::new(*path, ChangeKind::Created));
            }
            (Some((old_path, old_digest)), Some((new_path, new_digest))) => {
                match old_path.cmp(new_path) {
                    Ordering::Less => {
                        return Some(ChangeEvent::new(*old_path, ChangeKind::Removed));
                    }
                    Ordering::Greater => {
                        return Some(ChangeEvent::new(*new_path, ChangeKind::Created));
                    }
                    Ordering::Equal => {
                        if old_digest != new_digest {
                            return Some(ChangeEvent::new(*new_path, ChangeKind::Modified));
                        }
                        old_iter.next();
                        new_iter.next();
                    }
                }
            }
        }
    }
}
