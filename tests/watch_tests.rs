//! Watch session tests
//!
//! Drives `run_loop` with synthetic filesystem events so the debounce and
//! recovery behavior can be checked without a real watcher.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind};
use notify::{Event, EventKind};
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};

use kiln::build::progress::{PipelineEvent, RecordingReporter};
use kiln::build::{BuildConfig, BuildMode, PipelineOrchestrator, StageKind};
use kiln::config::load_config;
use kiln::init::init_project;
use kiln::toolchain::css::compile_css;
use kiln::toolchain::{
    RenderContext, StyleOptions, StylePreprocessor, TemplateRenderer, ToolError, Toolchain,
};
use kiln::watch::{run_loop, watch, WatchOptions};

const QUIET: Duration = Duration::from_millis(80);
const SETTLE: Duration = Duration::from_millis(500);
const SLOW_RENDER: Duration = Duration::from_millis(300);

fn scaffold() -> (TempDir, BuildConfig) {
    let temp = TempDir::new().unwrap();
    init_project(temp.path(), "site").unwrap();
    let config = load_config(Some(&temp.path().join("kiln.toml"))).unwrap();
    let build = BuildConfig::from_config(&config, temp.path());
    (temp, build)
}

fn modified(path: &Path) -> notify::Result<Event> {
    Ok(Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path.to_path_buf()))
}

fn options(orchestrator: &PipelineOrchestrator) -> WatchOptions {
    let root = orchestrator.config().root.clone();
    WatchOptions::default()
        .with_quiet(QUIET, Duration::from_millis(20))
        .ignoring_outputs(orchestrator.config(), &root)
}

fn watch_passes(reporter: &RecordingReporter) -> usize {
    reporter.count(|e| matches!(e, PipelineEvent::PassStarted { mode: BuildMode::Watch }))
}

fn stage_runs(reporter: &RecordingReporter, stage: StageKind) -> usize {
    reporter.count(|e| matches!(e, PipelineEvent::StageCompleted { stage: s, .. } if *s == stage))
}

/// Renderer that holds every render long enough for events to arrive
/// mid-pass.
struct SlowRenderer;

impl TemplateRenderer for SlowRenderer {
    fn render<'a>(
        &'a self,
        _path: &'a Path,
        source: &'a str,
        _context: &'a RenderContext,
    ) -> BoxFuture<'a, Result<Option<String>, ToolError>> {
        Box::pin(async move {
            tokio::time::sleep(SLOW_RENDER).await;
            Ok(Some(source.to_string()))
        })
    }
}

/// Style preprocessor that rejects any file containing `broken`.
struct StrictStyles;

impl StylePreprocessor for StrictStyles {
    fn compile<'a>(&'a self, path: &'a Path, options: StyleOptions) -> BoxFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            let source = tokio::fs::read_to_string(path).await.map_err(|e| ToolError::io(path, e))?;
            if source.contains("broken") {
                return Err(ToolError::syntax(path, "unexpected token 'broken'"));
            }
            compile_css(path, &source, options)
        })
    }
}

#[tokio::test]
async fn test_burst_of_events_runs_one_pass() {
    let (temp, build) = scaffold();
    let reporter = Arc::new(RecordingReporter::new());
    let orchestrator = PipelineOrchestrator::new(build).with_reporter(reporter.clone());
    orchestrator.run_pass(BuildMode::Full).await.unwrap();

    let root = temp.path().to_path_buf();
    let css = root.join("src/styles/main.css");
    let options = options(&orchestrator);
    let (tx, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async {
        for _ in 0..5 {
            tx.send(modified(&css)).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(SETTLE).await;
        stop_tx.send(()).unwrap();
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };

    let (result, ()) = tokio::join!(run_loop(&orchestrator, &root, &options, rx, shutdown), driver);

    result.unwrap();
    assert_eq!(watch_passes(&reporter), 1);
    assert_eq!(reporter.count(|e| matches!(e, PipelineEvent::ChangeDetected { .. })), 5);
    assert!(orchestrator.tracker().is_empty());
    assert_eq!(
        reporter.count(|e| matches!(e, PipelineEvent::StageCompleted { stage: StageKind::StyleAssembly, .. })),
        2
    );
}

#[tokio::test]
async fn test_failed_pass_keeps_watching() {
    let (temp, build) = scaffold();
    let reporter = Arc::new(RecordingReporter::new());
    let orchestrator = PipelineOrchestrator::new(build)
        .with_toolchain(Toolchain::default().with_styles(StrictStyles))
        .with_reporter(reporter.clone());
    orchestrator.run_pass(BuildMode::Full).await.unwrap();

    let root = temp.path().to_path_buf();
    let css = root.join("src/styles/main.css");
    let options = options(&orchestrator);
    let (tx, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async {
        fs::write(&css, "body { broken }").unwrap();
        tx.send(modified(&css)).unwrap();
        tokio::time::sleep(SETTLE).await;

        fs::write(&css, "body { margin: 0 }").unwrap();
        tx.send(modified(&css)).unwrap();
        tokio::time::sleep(SETTLE).await;
        stop_tx.send(()).unwrap();
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };

    let (result, ()) = tokio::join!(run_loop(&orchestrator, &root, &options, rx, shutdown), driver);

    result.unwrap();
    assert_eq!(watch_passes(&reporter), 2);
    assert_eq!(reporter.count(|e| matches!(e, PipelineEvent::PassFailed { .. })), 1);
    assert!(matches!(
        reporter.events().iter().rev().find(|e| matches!(e, PipelineEvent::PassSucceeded { .. } | PipelineEvent::PassFailed { .. })),
        Some(PipelineEvent::PassSucceeded { .. })
    ));
    let assembled = fs::read_to_string(root.join("dist/css/site.css")).unwrap();
    assert!(!assembled.contains("broken"));
}

#[tokio::test]
async fn test_output_hidden_and_access_events_are_ignored() {
    let (temp, build) = scaffold();
    let reporter = Arc::new(RecordingReporter::new());
    let orchestrator = PipelineOrchestrator::new(build).with_reporter(reporter.clone());

    let root = temp.path().to_path_buf();
    let options = options(&orchestrator);
    let (tx, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async {
        tx.send(modified(&root.join("dist/index.html"))).unwrap();
        tx.send(Ok(Event::new(EventKind::Create(CreateKind::File)).add_path(root.join(".git/index"))))
            .unwrap();
        tx.send(Ok(Event::new(EventKind::Access(AccessKind::Any)).add_path(root.join("src/styles/main.css"))))
            .unwrap();
        tokio::time::sleep(SETTLE).await;
        stop_tx.send(()).unwrap();
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };

    let (result, ()) = tokio::join!(run_loop(&orchestrator, &root, &options, rx, shutdown), driver);

    result.unwrap();
    assert_eq!(reporter.count(|e| matches!(e, PipelineEvent::PassStarted { .. })), 0);
    assert_eq!(reporter.count(|e| matches!(e, PipelineEvent::ChangeDetected { .. })), 0);
    assert!(orchestrator.tracker().is_empty());
}

#[tokio::test]
async fn test_closed_event_channel_ends_session() {
    let (temp, build) = scaffold();
    let orchestrator = PipelineOrchestrator::new(build);
    let root: PathBuf = temp.path().to_path_buf();
    let options = options(&orchestrator);

    let (tx, rx) = mpsc::unbounded_channel();
    drop(tx);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        run_loop(&orchestrator, &root, &options, rx, std::future::pending::<()>()),
    )
    .await;

    assert!(matches!(result, Ok(Ok(()))));
}

#[tokio::test]
async fn test_outputs_outside_out_dir_do_not_retrigger() {
    let (temp, mut build) = scaffold();
    build.assemble = Some(PathBuf::from("assets/site.css"));
    if let Some(sprite) = build.sprite.as_mut() {
        sprite.destination = PathBuf::from("assets/icons");
    }
    fs::create_dir_all(temp.path().join("assets/icons")).unwrap();
    let reporter = Arc::new(RecordingReporter::new());
    let orchestrator = PipelineOrchestrator::new(build).with_reporter(reporter.clone());
    let options = WatchOptions::default().with_quiet(QUIET, Duration::from_millis(20));

    watch(&orchestrator, options, tokio::time::sleep(Duration::from_millis(1500))).await.unwrap();

    assert!(temp.path().join("assets/site.css").exists());
    assert!(temp.path().join("assets/icons/sprite.svg").exists());
    assert_eq!(reporter.count(|e| matches!(e, PipelineEvent::PassStarted { mode: BuildMode::Full })), 1);
    assert_eq!(watch_passes(&reporter), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_static_change_below_symlinked_root_is_copied() {
    let temp = TempDir::new().unwrap();
    let real = temp.path().join("real");
    init_project(&real, "site").unwrap();
    let link = temp.path().join("link");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let config = load_config(Some(&link.join("kiln.toml"))).unwrap();
    let reporter = Arc::new(RecordingReporter::new());
    let orchestrator =
        PipelineOrchestrator::new(BuildConfig::from_config(&config, &link)).with_reporter(reporter.clone());
    orchestrator.run_pass(BuildMode::Full).await.unwrap();

    // Watchers report paths below the resolved root.
    let root = link.canonicalize().unwrap();
    let options = WatchOptions::default()
        .with_quiet(QUIET, Duration::from_millis(20))
        .ignoring_outputs(orchestrator.config(), &root);
    let (tx, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let driver = async {
        fs::write(link.join("public/robots.txt"), "User-agent: *").unwrap();
        tx.send(modified(&root.join("public/robots.txt"))).unwrap();
        tokio::time::sleep(SETTLE).await;
        stop_tx.send(()).unwrap();
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };

    let (result, ()) = tokio::join!(run_loop(&orchestrator, &root, &options, rx, shutdown), driver);

    result.unwrap();
    assert_eq!(watch_passes(&reporter), 1);
    assert_eq!(stage_runs(&reporter, StageKind::Static), 2);
    assert_eq!(fs::read_to_string(real.join("dist/public/robots.txt")).unwrap(), "User-agent: *");
}

#[tokio::test]
async fn test_firing_during_running_pass_queues_one_follow_up() {
    let (temp, build) = scaffold();
    let reporter = Arc::new(RecordingReporter::new());
    let orchestrator = PipelineOrchestrator::new(build)
        .with_toolchain(Toolchain::default().with_renderer(SlowRenderer))
        .with_reporter(reporter.clone());

    let root = temp.path().to_path_buf();
    let css = root.join("src/styles/main.css");
    let options = options(&orchestrator);
    let (tx, rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let in_flight = async {
        let report = orchestrator.run_pass(BuildMode::Full).await.unwrap();
        assert!(report.is_success());
    };
    let driver = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(orchestrator.is_running());
        fs::write(&css, "body { margin: 7px }").unwrap();
        tx.send(modified(&css)).unwrap();
        // Several quiet periods elapse while the full pass is still rendering.
        tokio::time::sleep(SLOW_RENDER * 4 + SETTLE).await;
        stop_tx.send(()).unwrap();
    };
    let shutdown = async {
        let _ = stop_rx.await;
    };

    let (result, (), ()) =
        tokio::join!(run_loop(&orchestrator, &root, &options, rx, shutdown), in_flight, driver);

    result.unwrap();
    assert_eq!(reporter.count(|e| matches!(e, PipelineEvent::PassStarted { mode: BuildMode::Full })), 1);
    assert_eq!(watch_passes(&reporter), 1);
    assert_eq!(stage_runs(&reporter, StageKind::Styles), 2);
    assert!(orchestrator.tracker().is_empty());
    assert!(!orchestrator.is_running());
    let assembled = fs::read_to_string(root.join("dist/css/site.css")).unwrap();
    assert!(assembled.contains("7px"));
}
