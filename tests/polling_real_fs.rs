// tests/polling_real_fs.rs

mod common;
use crate::common::{init_tracing, with_timeout, write_file};

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use rulereload::fs::{FileSystem, RealFileSystem};
use rulereload::types::{ChangeKind, WatchBackend};
use rulereload::watch::{build_source, compute, ChangeSource, PollingSource, TrackingPolicy};

fn rule_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "falco.yaml", "rules_files: [/etc/falco/rules.d]");
    write_file(dir.path(), "falco_rules.yaml", "- rule: shell in container");
    write_file(dir.path(), "rules.d/custom.yaml", "- rule: custom v1");
    write_file(dir.path(), "rules.d/README.md", "not a rule file");
    dir
}

fn canonical_root(dir: &TempDir) -> std::path::PathBuf {
    RealFileSystem.canonicalize(dir.path()).unwrap()
}

#[test]
fn fingerprint_tracks_only_rule_files() {
    init_tracing();

    let dir = rule_tree();
    let root = canonical_root(&dir);
    let fp = compute(&RealFileSystem, &root, &TrackingPolicy::default()).unwrap();

    assert_eq!(fp.len(), 2);
    assert!(fp.contains(&root.join("falco_rules.yaml")));
    assert!(fp.contains(&root.join("rules.d/custom.yaml")));
    assert!(!fp.contains(&root.join("falco.yaml")));
}

#[test]
fn missing_root_is_an_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    assert!(compute(&RealFileSystem, &missing, &TrackingPolicy::default()).is_err());
}

#[tokio::test]
async fn poll_detects_an_edit() {
    init_tracing();

    let dir = rule_tree();
    let root = canonical_root(&dir);
    let policy = TrackingPolicy::default();
    let baseline = compute(&RealFileSystem, &root, &policy).unwrap();

    let mut source = PollingSource::new(
        Arc::new(RealFileSystem),
        root.clone(),
        policy,
        Duration::from_millis(20),
    );

    write_file(&root, "rules.d/custom.yaml", "- rule: custom v2");

    let candidate = with_timeout(source.next_change(&baseline)).await.unwrap();
    assert_eq!(candidate.change.path, root.join("rules.d/custom.yaml"));
    assert_eq!(candidate.change.kind, ChangeKind::Modified);
    assert_ne!(
        candidate.fingerprint.get(&root.join("rules.d/custom.yaml")),
        baseline.get(&root.join("rules.d/custom.yaml"))
    );
}

#[tokio::test]
async fn poll_detects_a_deletion() {
    init_tracing();

    let dir = rule_tree();
    let root = canonical_root(&dir);
    let policy = TrackingPolicy::default();
    let baseline = compute(&RealFileSystem, &root, &policy).unwrap();

    let mut source = build_source(
        WatchBackend::Poll,
        Arc::new(RealFileSystem),
        &root,
        policy,
        &baseline,
        Duration::from_millis(20),
        Duration::from_millis(20),
    )
    .unwrap();

    fs::remove_file(root.join("falco_rules.yaml")).unwrap();

    let candidate = with_timeout(source.next_change(&baseline)).await.unwrap();
    assert_eq!(candidate.change.kind, ChangeKind::Removed);
    assert_eq!(candidate.fingerprint.len(), 1);
}

#[tokio::test]
async fn touching_untracked_files_is_ignored() {
    init_tracing();

    let dir = rule_tree();
    let root = canonical_root(&dir);
    let policy = TrackingPolicy::default();
    let baseline = compute(&RealFileSystem, &root, &policy).unwrap();

    let mut source = PollingSource::new(
        Arc::new(RealFileSystem),
        root.clone(),
        policy,
        Duration::from_millis(20),
    );

    write_file(&root, "falco.yaml", "rules_files: []");
    write_file(&root, "rules.d/README.md", "still not a rule file");
    write_file(&root, "..data/custom.yaml", "- rule: staged");

    let waited = tokio::time::timeout(Duration::from_millis(200), source.next_change(&baseline)).await;
    assert!(waited.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_rule_file_is_followed() {
    init_tracing();

    let dir = rule_tree();
    let root = canonical_root(&dir);
    write_file(&root, "..v1/extra.yaml", "- rule: linked v1");
    std::os::unix::fs::symlink(root.join("..v1/extra.yaml"), root.join("extra.yaml")).unwrap();

    let policy = TrackingPolicy::default();
    let baseline = compute(&RealFileSystem, &root, &policy).unwrap();
    assert!(baseline.contains(&root.join("extra.yaml")));

    // Swap the link to a new target, the way mounted config is updated.
    write_file(&root, "..v2/extra.yaml", "- rule: linked v2");
    let tmp_link = root.join("extra.yaml.tmp");
    std::os::unix::fs::symlink(root.join("..v2/extra.yaml"), &tmp_link).unwrap();
    fs::rename(&tmp_link, root.join("extra.yaml")).unwrap();

    let mut source = PollingSource::new(
        Arc::new(RealFileSystem),
        root.clone(),
        policy,
        Duration::from_millis(20),
    );
    let candidate = with_timeout(source.next_change(&baseline)).await.unwrap();
    assert_eq!(candidate.change.path, root.join("extra.yaml"));
    assert_eq!(candidate.change.kind, ChangeKind::Modified);
}

#[cfg(unix)]
#[test]
fn directory_links_back_up_the_tree_are_walked_once() {
    init_tracing();

    let dir = rule_tree();
    let root = canonical_root(&dir);
    std::os::unix::fs::symlink("..", root.join("rules.d/up")).unwrap();
    std::os::unix::fs::symlink("../rules.d", root.join("rules.d/again")).unwrap();

    let fp = compute(&RealFileSystem, &root, &TrackingPolicy::default()).unwrap();

    let paths: Vec<_> = fp.paths().map(|p| p.to_path_buf()).collect();
    assert_eq!(
        paths,
        vec![root.join("falco_rules.yaml"), root.join("rules.d/custom.yaml")]
    );
}
