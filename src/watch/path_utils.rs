// src/watch/path_utils.rs

//! Path helpers shared by the fingerprint walk and the event handler.

use std::path::Path;

/// Convert `path` into a `/`-separated string relative to `root`.
///
/// Purely lexical: `root` is resolved once at startup and both the walk and
/// the watcher report paths under that resolved form, so nothing here touches
/// the filesystem. Returns `None` if `path` does not live under `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root).ok().map(to_slash)
}

fn to_slash(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_root_prefix() {
        assert_eq!(
            relative_str(Path::new("/etc/falco"), Path::new("/etc/falco/rules.d/a.yaml")),
            Some("rules.d/a.yaml".to_string())
        );
    }

    #[test]
    fn unrelated_path_is_none() {
        assert_eq!(
            relative_str(Path::new("/does/not/exist"), Path::new("/also/missing.yaml")),
            None
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_spelling_is_not_resolved() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("falco");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.yaml"), "x").unwrap();
        let alias = dir.path().join("alias");
        std::os::unix::fs::symlink(&root, &alias).unwrap();

        assert_eq!(relative_str(&root, &alias.join("a.yaml")), None);
        assert_eq!(
            relative_str(&root, &root.join("a.yaml")),
            Some("a.yaml".to_string())
        );
    }
}
