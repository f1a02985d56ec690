//! Build pass orchestration.
//!
//! [`PipelineOrchestrator`] drives one pass at a time through the fixed stage
//! order, consulting the [`StageGate`](crate::build::StageGate) for each
//! stage. A failing stage aborts the rest of the pass; the orchestrator then
//! returns to [`PipelineState::Idle`] and is ready for the next pass.

use crate::build::progress::{NullReporter, PipelineEvent, Reporter};
use crate::build::{
    markup, scripts, static_copy, styles, AssemblyOutcome, BuildConfig, BuildContext, BuildError,
    BuildMode, ChangeSet, ChangeTracker, ParseWarning, PassReport, StageKind, StageOutput,
    StageResult, StyleAssembler, StyleFragment,
};
use crate::toolchain::Toolchain;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info};

/// Where the orchestrator is in its pass lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Style fragments kept from the last successful run of each producing stage.
///
/// A watch pass that only re-runs scripts still assembles the stylesheet
/// fragments compiled by an earlier pass.
#[derive(Debug, Default)]
struct FragmentCache {
    preprocessed: Vec<StyleFragment>,
    extracted: Vec<StyleFragment>,
}

impl FragmentCache {
    fn all(&self) -> Vec<StyleFragment> {
        self.preprocessed.iter().chain(self.extracted.iter()).cloned().collect()
    }
}

/// Resets the in-flight flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Top-level build state machine.
///
/// Each instance owns its configuration, change tracker and fragment cache;
/// separate instances share nothing.
pub struct PipelineOrchestrator {
    config: BuildConfig,
    tools: Toolchain,
    reporter: Arc<dyn Reporter>,
    tracker: ChangeTracker,
    running: AtomicBool,
    state: Mutex<PipelineState>,
    fragments: Mutex<FragmentCache>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PipelineOrchestrator {
    /// Create an orchestrator with the default toolchain and no reporter.
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            tools: Toolchain::default(),
            reporter: Arc::new(NullReporter::new()),
            tracker: ChangeTracker::new(),
            running: AtomicBool::new(false),
            state: Mutex::new(PipelineState::Idle),
            fragments: Mutex::new(FragmentCache::default()),
        }
    }

    pub fn with_toolchain(mut self, tools: Toolchain) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Share an existing tracker, e.g. one fed by a filesystem watcher.
    pub fn with_tracker(mut self, tracker: ChangeTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    /// Whether a pass is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: PipelineState) {
        *lock(&self.state) = state;
    }

    fn begin(&self) -> Result<PassGuard<'_>, BuildError> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| PassGuard(&self.running))
            .map_err(|_| BuildError::PassInProgress)
    }

    /// Run one pass over the changes recorded so far.
    ///
    /// The tracker is drained when the pass starts, so changes recorded while
    /// it runs are kept for the next one. Returns
    /// [`BuildError::PassInProgress`] without touching the tracker if another
    /// pass is running.
    pub async fn run_pass(&self, mode: BuildMode) -> Result<PassReport, BuildError> {
        let _guard = self.begin()?;
        let changes = self.tracker.take();
        self.execute(&changes, mode).await
    }

    /// Run one pass over an explicit change set, leaving the tracker alone.
    pub async fn run_with_changes(
        &self,
        changes: &ChangeSet,
        mode: BuildMode,
    ) -> Result<PassReport, BuildError> {
        let _guard = self.begin()?;
        self.execute(changes, mode).await
    }

    async fn execute(&self, changes: &ChangeSet, mode: BuildMode) -> Result<PassReport, BuildError> {
        let start = Instant::now();
        self.set_state(PipelineState::Running);
        self.reporter.report(PipelineEvent::PassStarted { mode });
        info!("{:?} pass started ({} changed path(s))", mode, changes.len());
        if let Some(hook) = &self.config.hooks.on_start {
            hook(&mode);
        }

        let ctx = match self.config.resolve() {
            Ok(ctx) => ctx,
            Err(e) => return Err(self.fail(None, e)),
        };

        let watch = mode == BuildMode::Watch;
        let gate = ctx.stage_gate();
        let mut report = PassReport::new(mode);

        for stage in StageKind::ORDER {
            if !gate.needs_stage(stage, changes, watch) {
                debug!("skipping {} stage", stage);
                self.reporter.report(PipelineEvent::StageSkipped { stage });
                report.add_stage(StageResult::skipped(stage));
                continue;
            }

            self.reporter.report(PipelineEvent::StageStarted { stage });
            let stage_start = Instant::now();
            match self.run_stage(stage, &ctx, changes, mode).await {
                Ok(output) => {
                    let duration = stage_start.elapsed();
                    self.record_warnings(&mut report, output.warnings);
                    self.reporter.report(PipelineEvent::StageCompleted {
                        stage,
                        outputs: output.outputs.len(),
                        duration_ms: duration.as_millis() as u64,
                    });
                    debug!("{} stage done in {:?}", stage, duration);
                    report.add_stage(StageResult::success(stage, output.outputs, duration));
                }
                Err(e) => {
                    debug!("{} stage failed after {:?}", stage, stage_start.elapsed());
                    return Err(self.fail(Some(stage), e));
                }
            }
        }

        report.duration = start.elapsed();
        self.set_state(PipelineState::Succeeded);
        info!("{}", report.summary().lines().next().unwrap_or_default());
        self.reporter.report(PipelineEvent::PassSucceeded { report: report.clone() });
        if let Some(hook) = &self.config.hooks.on_build_complete {
            hook(&report);
        }
        if watch {
            if let Some(hook) = &self.config.hooks.on_update {
                hook(&report);
            }
        }
        self.set_state(PipelineState::Idle);
        Ok(report)
    }

    fn record_warnings(&self, report: &mut PassReport, warnings: Vec<ParseWarning>) {
        for warning in warnings {
            debug!("warning: {}", warning);
            self.reporter.report(PipelineEvent::Warning { message: warning.to_string() });
            report.warnings.push(warning);
        }
    }

    /// Move to `Failed`, notify once, then settle back to `Idle`.
    fn fail(&self, stage: Option<StageKind>, err: BuildError) -> BuildError {
        self.set_state(PipelineState::Failed);
        debug!("pass failed: {}", err);
        let stage = match &err {
            BuildError::Compilation { stage, .. } => Some(*stage),
            _ => stage,
        };
        self.reporter.report(PipelineEvent::PassFailed { stage, message: err.to_string() });
        if let Some(hook) = &self.config.hooks.on_error {
            hook(&err);
        }
        self.set_state(PipelineState::Idle);
        err
    }

    async fn run_stage(
        &self,
        stage: StageKind,
        ctx: &BuildContext,
        changes: &ChangeSet,
        mode: BuildMode,
    ) -> Result<StageOutput, BuildError> {
        match stage {
            StageKind::Markup => markup::run(ctx, &self.tools).await,
            StageKind::Styles => {
                let mut output = styles::run(ctx, &self.tools).await?;
                lock(&self.fragments).preprocessed = std::mem::take(&mut output.fragments);
                Ok(output)
            }
            StageKind::Scripts => {
                let mut output = scripts::run(ctx, &self.tools).await?;
                lock(&self.fragments).extracted = std::mem::take(&mut output.fragments);
                Ok(output)
            }
            StageKind::StyleAssembly => self.assemble_styles(ctx).await,
            StageKind::Static => static_copy::run(ctx, &self.tools, changes, mode).await,
        }
    }

    async fn assemble_styles(&self, ctx: &BuildContext) -> Result<StageOutput, BuildError> {
        let mut output = StageOutput::default();
        let Some(target) = &ctx.assemble else {
            return Ok(output);
        };

        let fragments = lock(&self.fragments).all();
        let assembler = StyleAssembler::new(self.tools.styles.as_ref(), target, ctx.production);
        match assembler.assemble(&fragments).await? {
            AssemblyOutcome::Written(path) => output.outputs.push(path),
            AssemblyOutcome::Empty { removed_stale } => {
                let mut message = "no style fragments to assemble".to_string();
                if removed_stale {
                    message.push_str("; removed stale output");
                }
                output.warnings.push(ParseWarning::new(target, message));
            }
        }
        Ok(output)
    }
}
