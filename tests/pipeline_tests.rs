//! Pipeline integration tests
//!
//! Drives whole passes through `PipelineOrchestrator`:
//!
//! - Full builds of a scaffolded project with the default toolchain
//! - Stage gating for watch passes
//! - Failure handling and recovery
//! - Style assembly determinism
//! - Mutual exclusion of passes

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tempfile::TempDir;

use kiln::build::progress::{PipelineEvent, RecordingReporter};
use kiln::build::{
    BuildConfig, BuildError, BuildHooks, BuildMode, ChangeSet, PipelineOrchestrator, PipelineState,
    SourceSelector, StageKind,
};
use kiln::config::load_config;
use kiln::init::init_project;
use kiln::toolchain::css::compile_css;
use kiln::toolchain::{
    BundleOutput, ModuleBundler, RenderContext, StyleOptions, StylePreprocessor, TemplateRenderer,
    ToolError, Toolchain,
};

// ============================================================================
// Test Utilities
// ============================================================================

/// Scaffold a project and lower its kiln.toml into a build configuration.
fn scaffold() -> (TempDir, BuildConfig) {
    let temp = TempDir::new().unwrap();
    init_project(temp.path(), "site").unwrap();
    let config = load_config(Some(&temp.path().join("kiln.toml"))).unwrap();
    let build = BuildConfig::from_config(&config, temp.path());
    (temp, build)
}

fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Counts hook invocations.
#[derive(Default, Clone)]
struct HookCounts {
    started: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    updated: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl HookCounts {
    fn hooks(&self) -> BuildHooks {
        let (started, completed, updated, errors) =
            (self.started.clone(), self.completed.clone(), self.updated.clone(), self.errors.clone());
        BuildHooks::new()
            .on_start(move |_| {
                started.fetch_add(1, Ordering::SeqCst);
            })
            .on_build_complete(move |_| {
                completed.fetch_add(1, Ordering::SeqCst);
            })
            .on_update(move |_| {
                updated.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_| {
                errors.fetch_add(1, Ordering::SeqCst);
            })
    }

    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
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

/// Bundler that always reports failure.
struct FailingBundler;

impl ModuleBundler for FailingBundler {
    fn build<'a>(
        &'a self,
        _entries: &'a [PathBuf],
        _out_dir: &'a Path,
        _minify: bool,
    ) -> BoxFuture<'a, Result<BundleOutput, ToolError>> {
        Box::pin(async move {
            Ok(BundleOutput {
                success: false,
                assets: vec![],
                logs: vec!["main.js:1:1: unexpected end of input".to_string()],
            })
        })
    }
}

/// Renderer that yields before returning the source unchanged.
struct SlowRenderer;

impl TemplateRenderer for SlowRenderer {
    fn render<'a>(
        &'a self,
        _path: &'a Path,
        source: &'a str,
        _context: &'a RenderContext,
    ) -> BoxFuture<'a, Result<Option<String>, ToolError>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Some(source.to_string()))
        })
    }
}

// ============================================================================
// Full Builds
// ============================================================================

#[tokio::test]
async fn test_scaffold_full_build() {
    let (temp, build) = scaffold();
    let orchestrator = PipelineOrchestrator::new(build);

    let report = orchestrator.run_pass(BuildMode::Full).await.unwrap();
    assert_eq!(report.stages_run(), StageKind::ORDER.to_vec());
    assert!(report.is_success());

    let dist = temp.path().join("dist");
    let index = fs::read_to_string(dist.join("index.html")).unwrap();
    assert!(index.contains("<header>"), "header partial not included");
    assert!(index.contains("href=\"/index.html\""), "sitemap not rendered");
    assert!(index.contains("<use href=\"/icons/sprite.svg#star\"></use>"));
    assert!(index.contains("class=\"icon\""), "container attributes dropped");
    assert!(!index.contains("<path d=\"M12 2"), "inline icon not replaced");
    assert!(!dist.join("_header.html").exists(), "partial rendered on its own");

    let sprite = fs::read_to_string(dist.join("icons/sprite.svg")).unwrap();
    assert!(sprite.contains("<symbol id=\"star\" viewBox=\"0 0 24 24\">"));
    assert!(sprite.contains("<symbol id=\"check\" viewBox=\"0 0 18 18\">"));

    let assembled = fs::read_to_string(dist.join("css/site.css")).unwrap();
    assert!(assembled.contains("font-family"));
    assert!(assembled.contains("max-width"));
    assert!(dist.join("js/main.js").exists());
    assert!(!dist.join("js/main.css").exists(), "extracted CSS left behind after assembly");
    assert!(dist.join("public/.gitkeep").exists());

    // Author sources are never rewritten.
    let source = fs::read_to_string(temp.path().join("src/pages/index.html")).unwrap();
    assert!(source.contains("<path d=\"M12 2"));
}

#[tokio::test]
async fn test_included_partial_is_rendered_once() {
    let (temp, build) = scaffold();
    create_test_file(temp.path(), "src/pages/_code.html", "<pre>{% raw %}{{ user }}{% endraw %}</pre>");
    create_test_file(temp.path(), "src/pages/docs.html", "<h1>{{ page }}</h1><!-- @include _code.html -->");

    PipelineOrchestrator::new(build).run_pass(BuildMode::Full).await.unwrap();

    let docs = fs::read_to_string(temp.path().join("dist/docs.html")).unwrap();
    assert!(docs.contains("<h1>docs.html</h1>"));
    assert!(docs.contains("<pre>{{ user }}</pre>"));
    assert!(!temp.path().join("dist/_code.html").exists());
}

#[tokio::test]
async fn test_full_build_reports_events_in_order() {
    let (_temp, build) = scaffold();
    let reporter = Arc::new(RecordingReporter::new());
    let orchestrator = PipelineOrchestrator::new(build).with_reporter(reporter.clone());

    orchestrator.run_pass(BuildMode::Full).await.unwrap();

    let events = reporter.events();
    assert!(matches!(events.first(), Some(PipelineEvent::PassStarted { mode: BuildMode::Full })));
    assert!(matches!(events.last(), Some(PipelineEvent::PassSucceeded { .. })));
    let completed: Vec<StageKind> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StageCompleted { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(completed, StageKind::ORDER.to_vec());
}

#[tokio::test]
async fn test_style_assembly_is_idempotent() {
    let (temp, build) = scaffold();
    let orchestrator = PipelineOrchestrator::new(build);
    let assembled = temp.path().join("dist/css/site.css");

    orchestrator.run_pass(BuildMode::Full).await.unwrap();
    let first = fs::read(&assembled).unwrap();
    orchestrator.run_pass(BuildMode::Full).await.unwrap();
    let second = fs::read(&assembled).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_missing_static_root_fails_static_stage() {
    let (temp, build) = scaffold();
    fs::remove_dir_all(temp.path().join("public")).unwrap();
    let orchestrator = PipelineOrchestrator::new(build);

    let err = orchestrator.run_pass(BuildMode::Full).await.unwrap_err();
    assert!(matches!(err, BuildError::ResourceMissing(ref p) if p.ends_with("public")));
    // Earlier stages still wrote their outputs.
    assert!(temp.path().join("dist/index.html").exists());
}

// ============================================================================
// Watch Passes
// ============================================================================

#[tokio::test]
async fn test_css_change_runs_only_styles_and_assembly() {
    let (temp, build) = scaffold();
    let orchestrator = PipelineOrchestrator::new(build);
    orchestrator.run_pass(BuildMode::Full).await.unwrap();

    let changes = ChangeSet::from_paths([temp.path().join("src/styles/main.css")]);
    let report = orchestrator.run_with_changes(&changes, BuildMode::Watch).await.unwrap();

    assert_eq!(report.stages_run(), vec![StageKind::Styles, StageKind::StyleAssembly]);
    // Bundler-extracted CSS from the full pass is still part of the assembly.
    let assembled = fs::read_to_string(temp.path().join("dist/css/site.css")).unwrap();
    assert!(assembled.contains("max-width"));
}

#[tokio::test]
async fn test_css_change_without_assembly_runs_only_styles() {
    let temp = TempDir::new().unwrap();
    create_test_file(temp.path(), "pages/index.html", "<p>hi</p>");
    let css = create_test_file(temp.path(), "styles/a.css", "a { color: red }");
    create_test_file(temp.path(), "scripts/app.js", "console.log(1);\n");
    fs::create_dir_all(temp.path().join("static")).unwrap();

    let build = BuildConfig::new(temp.path(), "out")
        .with_markup(SourceSelector::Globs(vec!["pages/*.html".to_string()]))
        .with_styles(SourceSelector::List(vec![PathBuf::from("styles/a.css")]))
        .with_scripts(SourceSelector::thunk(|| vec![PathBuf::from("scripts/app.js")]))
        .with_static(SourceSelector::List(vec![PathBuf::from("static")]));
    let orchestrator = PipelineOrchestrator::new(build);

    let changes = ChangeSet::from_paths([css]);
    let report = orchestrator.run_with_changes(&changes, BuildMode::Watch).await.unwrap();
    assert_eq!(report.stages_run(), vec![StageKind::Styles]);
    assert!(temp.path().join("out/css/a.css").exists());
    assert!(!temp.path().join("out/index.html").exists());
}

#[tokio::test]
async fn test_static_change_copies_and_removes() {
    let (temp, build) = scaffold();
    let orchestrator = PipelineOrchestrator::new(build);
    orchestrator.run_pass(BuildMode::Full).await.unwrap();

    let font = create_test_file(temp.path(), "public/fonts/a.woff2", "font");
    orchestrator.tracker().record(&font);
    let report = orchestrator.run_pass(BuildMode::Watch).await.unwrap();
    assert_eq!(report.stages_run(), vec![StageKind::Static]);
    assert_eq!(fs::read_to_string(temp.path().join("dist/public/fonts/a.woff2")).unwrap(), "font");

    fs::remove_file(&font).unwrap();
    orchestrator.tracker().record(&font);
    orchestrator.run_pass(BuildMode::Watch).await.unwrap();
    assert!(!temp.path().join("dist/public/fonts/a.woff2").exists());
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_failing_stage_reports_once_and_recovers() {
    let (temp, build) = scaffold();
    let counts = HookCounts::default();
    let reporter = Arc::new(RecordingReporter::new());
    let orchestrator = PipelineOrchestrator::new(build.with_hooks(counts.hooks()))
        .with_toolchain(Toolchain::default().with_styles(StrictStyles))
        .with_reporter(reporter.clone());

    orchestrator.run_pass(BuildMode::Full).await.unwrap();

    let css = temp.path().join("src/styles/main.css");
    fs::write(&css, "body { broken }").unwrap();
    orchestrator.tracker().record(&css);
    let err = orchestrator.run_pass(BuildMode::Watch).await.unwrap_err();

    assert!(matches!(err, BuildError::Compilation { stage: StageKind::Styles, .. }));
    assert_eq!(HookCounts::get(&counts.errors), 1);
    assert_eq!(orchestrator.state(), PipelineState::Idle);
    assert!(orchestrator.tracker().is_empty());
    assert_eq!(
        reporter.count(|e| matches!(e, PipelineEvent::PassFailed { stage: Some(StageKind::Styles), .. })),
        1
    );

    // The next change still triggers a fresh pass.
    fs::write(&css, "body { margin: 0 }").unwrap();
    orchestrator.tracker().record(&css);
    let report = orchestrator.run_pass(BuildMode::Watch).await.unwrap();

    assert!(report.ran(StageKind::Styles));
    assert_eq!(HookCounts::get(&counts.errors), 1);
    assert_eq!(HookCounts::get(&counts.started), 3);
    assert_eq!(HookCounts::get(&counts.completed), 2);
    assert_eq!(HookCounts::get(&counts.updated), 1);
}

#[tokio::test]
async fn test_failure_aborts_remaining_stages() {
    let (temp, build) = scaffold();
    let reporter = Arc::new(RecordingReporter::new());
    let orchestrator = PipelineOrchestrator::new(build)
        .with_toolchain(Toolchain::default().with_bundler(FailingBundler))
        .with_reporter(reporter.clone());

    let err = orchestrator.run_pass(BuildMode::Full).await.unwrap_err();
    assert!(err.to_string().contains("unexpected end of input"));

    let started = reporter.count(|e| matches!(e, PipelineEvent::StageStarted { .. }));
    assert_eq!(started, 3, "stages after scripts must not start");
    assert!(!temp.path().join("dist/css/site.css").exists());
    assert!(!temp.path().join("dist/public").exists());
}

#[tokio::test]
async fn test_no_markup_sources_is_configuration_error() {
    let (temp, build) = scaffold();
    fs::remove_dir_all(temp.path().join("src/pages")).unwrap();
    let reporter = Arc::new(RecordingReporter::new());
    let orchestrator = PipelineOrchestrator::new(build).with_reporter(reporter.clone());

    let err = orchestrator.run_pass(BuildMode::Full).await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(reporter.count(|e| matches!(e, PipelineEvent::StageStarted { .. })), 0);
    assert!(!temp.path().join("dist").exists());
}

// ============================================================================
// Mutual Exclusion
// ============================================================================

#[tokio::test]
async fn test_second_pass_is_rejected_while_running() {
    let (temp, build) = scaffold();
    let orchestrator =
        PipelineOrchestrator::new(build).with_toolchain(Toolchain::default().with_renderer(SlowRenderer));
    orchestrator.tracker().record(temp.path().join("src/pages/index.html"));

    let (first, second) =
        tokio::join!(orchestrator.run_pass(BuildMode::Full), orchestrator.run_pass(BuildMode::Full));

    assert!(first.is_ok());
    assert!(matches!(second, Err(BuildError::PassInProgress)));
    // The rejected pass did not drain the tracker; the first one did.
    assert!(orchestrator.tracker().is_empty());
    assert!(!orchestrator.is_running());
}
