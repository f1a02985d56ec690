//! Watch mode for automatic rebuilds on file changes
//!
//! Filesystem events are recorded into the orchestrator's
//! [`ChangeTracker`](crate::build::ChangeTracker) and arm a
//! [`Debouncer`]; when it fires, one watch pass runs over everything recorded
//! since the previous pass. A failing pass is reported and the session keeps
//! watching.

use crate::build::progress::PipelineEvent;
use crate::build::{
    resolve_path, BuildConfig, BuildError, BuildMode, Debouncer, PipelineOrchestrator,
};
use crate::config::WatchConfig;
use crate::sprite::sprite_file;
use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecursiveMode, Watcher};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

/// Error that ends a watch session
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch path: {0}")]
    WatchPath(#[source] notify::Error),
    /// Project root not found
    #[error("Watch directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    /// The initial build could not even start
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Options for a watch session
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Quiet period before a rebuild fires
    pub quiet: Duration,
    /// Quiet period after rename events
    pub rename_quiet: Duration,
    /// Directories whose changes never trigger a rebuild
    pub ignore: Vec<PathBuf>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from_config(&WatchConfig::default())
    }
}

impl WatchOptions {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            quiet: Duration::from_millis(config.debounce_ms as u64),
            rename_quiet: Duration::from_millis(config.rename_debounce_ms as u64),
            ignore: Vec::new(),
        }
    }

    pub fn with_quiet(mut self, quiet: Duration, rename_quiet: Duration) -> Self {
        self.quiet = quiet;
        self.rename_quiet = rename_quiet;
        self
    }

    pub fn with_ignore(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ignore.push(dir.into());
        self
    }

    /// Ignore every output of `config`, so writes made by a pass do not
    /// trigger the next one.
    ///
    /// Covers the output directories, the assembled stylesheet and the
    /// sprite file, wherever they live. The assembler's temporary file sits
    /// next to its target with a leading dot and is skipped as hidden.
    pub fn ignoring_outputs(mut self, config: &BuildConfig, root: &Path) -> Self {
        let dirs = [
            Some(&config.out_dir),
            config.markup_out.as_ref(),
            config.styles_out.as_ref(),
            config.scripts_out.as_ref(),
            config.static_out.as_ref(),
        ];
        for dir in dirs.into_iter().flatten() {
            self.push_ignore(resolve_path(root, dir), root);
        }

        let sprite = config
            .sprite
            .as_ref()
            .filter(|s| !s.destination.as_os_str().is_empty())
            .map(|s| sprite_file(&resolve_path(root, &s.destination)));
        let assemble = config.assemble.as_ref().map(|p| resolve_path(root, p));
        for file in [assemble, sprite].into_iter().flatten() {
            self.push_ignore(file, root);
        }
        self
    }

    fn push_ignore(&mut self, path: PathBuf, root: &Path) {
        if path != root && !self.ignore.iter().any(|p| path.starts_with(p)) {
            self.ignore.push(path);
        }
    }
}

/// Whether `path` has a hidden component below `root`.
fn is_hidden(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|c| match c {
        Component::Normal(part) => part.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Paths of `event` that should trigger a rebuild.
pub fn relevant_paths(event: &Event, root: &Path, ignore: &[PathBuf]) -> Vec<PathBuf> {
    if matches!(event.kind, EventKind::Access(_) | EventKind::Other) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|p| !ignore.iter().any(|dir| p.starts_with(dir)))
        .filter(|p| !is_hidden(root, p))
        .cloned()
        .collect()
}

fn is_rename(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(ModifyKind::Name(_)))
}

/// Watch the orchestrator's project root until `shutdown` resolves.
///
/// Runs an initial full pass first. A configuration error in that pass ends
/// the session; any other failure is reported and watching continues.
pub async fn watch<F>(
    orchestrator: &PipelineOrchestrator,
    options: WatchOptions,
    shutdown: F,
) -> Result<(), WatchError>
where
    F: Future<Output = ()>,
{
    let root = orchestrator.config().root.clone();
    let root = root.canonicalize().map_err(|_| WatchError::SourceNotFound(root))?;
    let options = options.ignoring_outputs(orchestrator.config(), &root);

    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        // The receiver only goes away when the session ends.
        let _ = tx.send(res);
    })
    .map_err(WatchError::WatcherInit)?;
    watcher.watch(&root, RecursiveMode::Recursive).map_err(WatchError::WatchPath)?;

    match orchestrator.run_pass(BuildMode::Full).await {
        Ok(_) => {}
        Err(e) if e.is_configuration() => return Err(e.into()),
        Err(e) => debug!("initial build failed: {}", e),
    }

    let result = run_loop(orchestrator, &root, &options, rx, shutdown).await;
    drop(watcher);
    result
}

/// Event loop of a watch session.
///
/// Split out of [`watch`] so it can be driven by synthetic events. Ends when
/// `shutdown` resolves or the event sender is dropped.
pub async fn run_loop<F>(
    orchestrator: &PipelineOrchestrator,
    root: &Path,
    options: &WatchOptions,
    mut events: UnboundedReceiver<notify::Result<Event>>,
    shutdown: F,
) -> Result<(), WatchError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let reporter = orchestrator.reporter().clone();
    let (fire_tx, mut fire_rx) = mpsc::unbounded_channel::<()>();
    let mut debouncer = Debouncer::new();

    reporter.report(PipelineEvent::Watching { root: root.to_path_buf() });
    info!("watching {} for changes", root.display());

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debouncer.cancel();
                info!("watch session stopped");
                return Ok(());
            }
            event = events.recv() => {
                let event = match event {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        warn!("watch error: {}", e);
                        continue;
                    }
                    None => {
                        debouncer.cancel();
                        return Ok(());
                    }
                };

                let paths = relevant_paths(&event, root, &options.ignore);
                if paths.is_empty() {
                    continue;
                }
                for path in &paths {
                    orchestrator.tracker().record(path.clone());
                }
                reporter.report(PipelineEvent::ChangeDetected { paths });

                let quiet = if is_rename(&event) { options.rename_quiet } else { options.quiet };
                let fire = fire_tx.clone();
                debouncer.schedule(
                    move || {
                        let _ = fire.send(());
                    },
                    quiet,
                );
            }
            Some(()) = fire_rx.recv() => {
                if orchestrator.tracker().is_empty() {
                    continue;
                }
                match orchestrator.run_pass(BuildMode::Watch).await {
                    Ok(_) => {}
                    Err(BuildError::PassInProgress) => {
                        // Retry once the running pass has drained the tracker.
                        let fire = fire_tx.clone();
                        debouncer.schedule(
                            move || {
                                let _ = fire.send(());
                            },
                            options.quiet,
                        );
                        continue;
                    }
                    Err(e) => debug!("watch pass failed: {}", e),
                }
                reporter.report(PipelineEvent::Watching { root: root.to_path_buf() });
            }
        }
    }
}
