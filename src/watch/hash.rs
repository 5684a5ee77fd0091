// src/watch/hash.rs

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use blake3::Hasher;

use crate::fs::FileSystem;

/// Compute the hex BLAKE3 digest of a single file, streaming its content.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading file for hashing: {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn hashing_known_content() {
        let fs = MockFileSystem::new();
        fs.add_file("test.txt", b"hello world".to_vec());

        let hash = compute_file_hash(&fs, Path::new("test.txt")).unwrap();
        // blake3 hash of "hello world"
        assert_eq!(
            hash,
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn hashing_is_stable_across_calls() {
        let fs = MockFileSystem::new();
        fs.add_file("/r/rules.yaml", b"- rule: a".to_vec());

        let a = compute_file_hash(&fs, Path::new("/r/rules.yaml")).unwrap();
        let b = compute_file_hash(&fs, Path::new("/r/rules.yaml")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hashing_missing_file_fails() {
        let fs = MockFileSystem::new();
        assert!(compute_file_hash(&fs, Path::new("/nope.yaml")).is_err());
    }
}
