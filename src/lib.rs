// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod reload;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_settings, Settings};
use crate::engine::{CoreRuntime, Pipeline, Runtime, RuntimeEvent};
use crate::errors::ReloadError;
use crate::fs::{FileSystem, RealFileSystem};
use crate::reload::{CommandValidator, RuleValidator, SystemProcessLocator, UnixSignaler};
use crate::watch::{build_source, compute, Fingerprint};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings resolution (file, CLI, environment)
/// - the startup baseline
/// - the change source and reload pipeline
/// - SIGINT / SIGTERM handling
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = load_settings(args.config.as_deref(), &args.overrides())?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let root = resolve_root(fs.as_ref(), &settings.root_dir)?;

    let baseline = compute(fs.as_ref(), &root, &settings.policy)
        .with_context(|| format!("computing initial fingerprint of {}", root.display()))?;
    info!(root = %root.display(), files = baseline.len(), "initial fingerprint computed");

    if args.dry_run {
        print_dry_run(&settings, &root, &baseline);
        return Ok(());
    }

    let (ctl_tx, ctl_rx) = mpsc::channel::<RuntimeEvent>(4);

    // SIGINT / SIGTERM → graceful shutdown.
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            warn!(error = %e, "failed to listen for shutdown signals");
            return;
        }
        let _ = ctl_tx.send(RuntimeEvent::ShutdownRequested).await;
    });

    let source = build_source(
        settings.backend,
        Arc::clone(&fs),
        &root,
        settings.policy.clone(),
        &baseline,
        settings.poll_interval,
        settings.debounce,
    )?;

    let pipeline = build_pipeline(&settings);
    let core = CoreRuntime::new(baseline);

    let core = Runtime::new(core, source, pipeline, ctl_rx).run().await?;
    info!(reloads = core.reloads(), "rulereload stopped");
    Ok(())
}

/// Check that the watched root exists and is a directory, and resolve it to
/// its canonical form so event paths and fingerprint keys agree.
pub fn resolve_root(fs: &dyn FileSystem, root: &Path) -> Result<PathBuf, ReloadError> {
    if !fs.is_dir(root) {
        return Err(ReloadError::ConfigError(format!(
            "root directory {} does not exist or is not a directory",
            root.display()
        )));
    }
    Ok(fs.canonicalize(root).unwrap_or_else(|_| root.to_path_buf()))
}

/// Production reload pipeline for the resolved settings.
pub fn build_pipeline(settings: &Settings) -> Pipeline {
    let validator = settings.validator.as_ref().map(|v| {
        Box::new(CommandValidator::new(v.program.clone(), v.args.clone(), v.timeout))
            as Box<dyn RuleValidator>
    });
    if validator.is_none() {
        warn!("rule validation disabled; every change will be signalled");
    }

    Pipeline::new(
        validator,
        Box::new(SystemProcessLocator::new()),
        Box::new(UnixSignaler::new(settings.signal)),
        settings.process_name.clone(),
    )
}

/// Resolves when the process receives SIGINT or (on unix) SIGTERM.
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Dry-run output: resolved settings and the files that would be tracked.
fn print_dry_run(settings: &Settings, root: &Path, baseline: &Fingerprint) {
    println!("rulereload dry-run");
    println!("  root_dir = {}", root.display());
    println!("  backend = {:?}", settings.backend);
    println!("  poll_interval = {:?}", settings.poll_interval);
    println!("  debounce = {:?}", settings.debounce);
    println!("  process_name = {}", settings.process_name);
    println!("  signal = {}", settings.signal);
    match &settings.validator {
        Some(v) => println!(
            "  validator = {} {} <file> (timeout {:?})",
            v.program.display(),
            v.args.join(" "),
            v.timeout
        ),
        None => println!("  validator = disabled"),
    }
    println!();

    println!("tracked files ({}):", baseline.len());
    for (path, digest) in baseline.iter() {
        let shown = path.strip_prefix(root).unwrap_or(path);
        println!("  {digest}  {}", shown.display());
    }

    debug!("dry-run complete (no watching)");
}
