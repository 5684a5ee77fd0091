#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use rulereload::engine::{CoreRuntime, Pipeline, Runtime, RuntimeEvent};
use rulereload::errors::Result;
use rulereload::watch::{ChangeSource, Fingerprint};

pub use rulereload_test_utils::{init_tracing, wait_until, with_timeout};

/// A runtime running on its own task, plus the handle that stops it.
pub struct RunningRuntime {
    pub shutdown: mpsc::Sender<RuntimeEvent>,
    pub task: JoinHandle<Result<CoreRuntime>>,
}

impl RunningRuntime {
    pub fn spawn(baseline: Fingerprint, source: Box<dyn ChangeSource>, pipeline: Pipeline) -> Self {
        let (shutdown, rx) = mpsc::channel(4);
        let runtime = Runtime::new(CoreRuntime::new(baseline), source, pipeline, rx);
        let task = tokio::spawn(runtime.run());
        Self { shutdown, task }
    }

    /// Request shutdown and return the final core.
    pub async fn stop(self) -> CoreRuntime {
        self.shutdown
            .send(RuntimeEvent::ShutdownRequested)
            .await
            .expect("runtime still listening");
        with_timeout(self.task)
            .await
            .expect("runtime task panicked")
            .expect("runtime returned an error")
    }
}

/// Write `contents` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, contents).expect("write file");
    path
}
