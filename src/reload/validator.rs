// src/reload/validator.rs

//! Pre-reload rule validation.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::ValidationError;
use crate::watch::fingerprint::Fingerprint;

/// Checks a single rule file.
///
/// Implementations must finish in bounded time; [`CommandValidator`] enforces
/// its own timeout.
pub trait RuleValidator: Send + Sync {
    fn validate<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), ValidationError>> + Send + 'a>>;
}

/// Runs `<program> <args...> <path>` and trusts its exit status.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandValidator {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run(&self, path: &Path) -> Result<(), ValidationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ValidationError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;

        let mut stderr = child.stderr.take();
        let waited = tokio::time::timeout(self.timeout, async {
            let mut captured = String::new();
            if let Some(stderr) = stderr.as_mut() {
                // Reading to EOF also keeps the pipe from filling up.
                let _ = stderr.read_to_string(&mut captured).await;
            }
            let status = child.wait().await;
            (status, captured)
        })
        .await;

        let (status, captured) = match waited {
            Ok(done) => done,
            Err(_elapsed) => {
                // kill_on_drop reaps the child once it goes out of scope.
                return Err(ValidationError::TimedOut {
                    path: path.to_path_buf(),
                    timeout: self.timeout,
                });
            }
        };

        let status = status.map_err(|source| ValidationError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            let tail: String = captured
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            debug!(path = %path.display(), stderr = %tail, "validator output");
            Err(ValidationError::Rejected {
                path: path.to_path_buf(),
                code: status.code(),
            })
        }
    }
}

impl RuleValidator for CommandValidator {
    fn validate<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), ValidationError>> + Send + 'a>> {
        Box::pin(self.run(path))
    }
}

/// Validate every tracked file in `fingerprint`, in path order.
///
/// Stops at the first failure and returns it; a single broken file anywhere
/// in the tree blocks the reload, not only the one that changed.
pub async fn validate_all(
    validator: &dyn RuleValidator,
    fingerprint: &Fingerprint,
) -> Result<(), ValidationError> {
    for path in fingerprint.paths() {
        match validator.validate(path).await {
            Ok(()) => debug!(path = %path.display(), "rule file valid"),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "rule file failed validation");
                return Err(err);
            }
        }
    }
    info!(files = fingerprint.len(), "all rule files valid");
    Ok(())
}
