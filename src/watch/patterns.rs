// src/watch/patterns.rs

use std::fmt;
use std::path::{Component, Path};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::watch::path_utils::relative_str;

/// Prefix of the hidden data directories that config-map style mounts use
/// (`..data`, `..2024_01_01_00_00_00.000`). The visible files are symlinks
/// into these, so the directories themselves are never tracked.
pub const HIDDEN_DATA_PREFIX: &str = "..";

/// Decides which files under the root belong to the fingerprint.
///
/// A path is tracked when:
/// - its extension is one of `extensions` (`yaml`, `yml` by default),
/// - its file name is not the agent's primary config file,
/// - no component of its root-relative path starts with `..`,
/// - it matches none of the user `exclude` globs (root-relative).
#[derive(Clone)]
pub struct TrackingPolicy {
    extensions: Vec<String>,
    primary_config: Option<String>,
    exclude_set: Option<GlobSet>,
}

impl fmt::Debug for TrackingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingPolicy")
            .field("extensions", &self.extensions)
            .field("primary_config", &self.primary_config)
            .finish_non_exhaustive()
    }
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self {
            extensions: vec!["yaml".to_string(), "yml".to_string()],
            primary_config: Some("falco.yaml".to_string()),
            exclude_set: None,
        }
    }
}

impl TrackingPolicy {
    pub fn new(
        extensions: &[String],
        primary_config: Option<String>,
        exclude: &[String],
    ) -> Result<Self> {
        let extensions = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };

        Ok(Self {
            extensions,
            primary_config: primary_config.filter(|s| !s.is_empty()),
            exclude_set,
        })
    }

    /// Returns true if `path` (anywhere under `root`) is a tracked rule file.
    ///
    /// Purely name-based; the caller checks that it is a regular file.
    pub fn is_tracked(&self, root: &Path, path: &Path) -> bool {
        let rel = match relative_str(root, path) {
            Some(rel) if !rel.is_empty() => rel,
            _ => return false,
        };

        if in_hidden_subtree(Path::new(&rel)) {
            return false;
        }

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };
        if self.primary_config.as_deref() == Some(file_name) {
            return false;
        }

        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if !ext_ok {
            return false;
        }

        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(&rel) {
                return false;
            }
        }
        true
    }

    /// Whether the walk should enter `dir`.
    pub fn should_descend(&self, root: &Path, dir: &Path) -> bool {
        match dir.strip_prefix(root) {
            Ok(rel) => !in_hidden_subtree(rel),
            Err(_) => true,
        }
    }
}

fn in_hidden_subtree(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(name) => name
            .to_str()
            .map(|s| s.starts_with(HIDDEN_DATA_PREFIX))
            .unwrap_or(false),
        _ => false,
    })
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> &'static Path {
        Path::new("/etc/falco")
    }

    #[test]
    fn yaml_and_yml_are_tracked() {
        let policy = TrackingPolicy::default();
        assert!(policy.is_tracked(root(), Path::new("/etc/falco/rules.yaml")));
        assert!(policy.is_tracked(root(), Path::new("/etc/falco/rules.d/k8s.yml")));
        assert!(!policy.is_tracked(root(), Path::new("/etc/falco/notes.txt")));
        assert!(!policy.is_tracked(root(), Path::new("/etc/falco/Makefile")));
    }

    #[test]
    fn primary_config_is_never_tracked() {
        let policy = TrackingPolicy::default();
        assert!(!policy.is_tracked(root(), Path::new("/etc/falco/falco.yaml")));
        assert!(!policy.is_tracked(root(), Path::new("/etc/falco/sub/falco.yaml")));
    }

    #[test]
    fn hidden_data_dirs_are_excluded() {
        let policy = TrackingPolicy::default();
        assert!(!policy.is_tracked(root(), Path::new("/etc/falco/..data/rules.yaml")));
        assert!(!policy.is_tracked(
            root(),
            Path::new("/etc/falco/..2024_01_01_00_00_00.000/rules.yaml")
        ));
        assert!(!policy.should_descend(root(), Path::new("/etc/falco/..data")));
        assert!(policy.should_descend(root(), Path::new("/etc/falco/rules.d")));
    }

    #[test]
    fn exclude_globs_apply_to_relative_paths() {
        let policy = TrackingPolicy::new(
            &["yaml".to_string()],
            None,
            &["drafts/**".to_string()],
        )
        .unwrap();
        assert!(policy.is_tracked(root(), Path::new("/etc/falco/falco.yaml")));
        assert!(!policy.is_tracked(root(), Path::new("/etc/falco/drafts/wip.yaml")));
    }

    #[test]
    fn paths_outside_root_are_not_tracked() {
        let policy = TrackingPolicy::default();
        assert!(!policy.is_tracked(root(), Path::new("/tmp/elsewhere.yaml")));
        assert!(!policy.is_tracked(root(), root()));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let err = TrackingPolicy::new(&["yaml".to_string()], None, &["a[".to_string()]);
        assert!(err.is_err());
    }
}
