//! Build progress reporting.
//!
//! Every component receives an `Arc<dyn Reporter>` and emits
//! [`PipelineEvent`]s through it. Implementations decide how (or whether) the
//! events reach the user.
//!
//! # Example
//!
//! ```ignore
//! use kiln::build::progress::{ConsoleReporter, PipelineEvent, Reporter};
//!
//! let reporter = ConsoleReporter::new();
//! reporter.report(PipelineEvent::StageStarted { stage: StageKind::Styles });
//! ```

use crate::build::{BuildMode, PassReport, StageKind};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Events that can be reported during a pass or a watch session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A pass started
    PassStarted { mode: BuildMode },
    /// A stage started
    StageStarted { stage: StageKind },
    /// A stage finished successfully
    StageCompleted { stage: StageKind, outputs: usize, duration_ms: u64 },
    /// A stage was not needed this pass
    StageSkipped { stage: StageKind },
    /// Non-fatal problem
    Warning { message: String },
    /// The pass finished successfully
    PassSucceeded { report: PassReport },
    /// The pass failed
    PassFailed { stage: Option<StageKind>, message: String },
    /// Watch mode is idle and waiting for changes
    Watching { root: PathBuf },
    /// Files changed while watching
    ChangeDetected { paths: Vec<PathBuf> },
}

/// Sink for pipeline events.
pub trait Reporter: Send + Sync {
    /// Report an event.
    fn report(&self, event: PipelineEvent);

    /// Check if this reporter wants verbose output.
    fn is_verbose(&self) -> bool {
        false
    }
}

/// A reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullReporter;

impl NullReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for NullReporter {
    fn report(&self, _event: PipelineEvent) {}
}

/// Console reporter with optional colors and timestamps.
pub struct ConsoleReporter {
    use_colors: bool,
    verbose: bool,
    clear_screen: bool,
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleReporter")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .field("clear_screen", &self.clear_screen)
            .finish()
    }
}

impl ConsoleReporter {
    /// Create a console reporter writing to stderr.
    pub fn new() -> Self {
        Self {
            use_colors: true,
            verbose: false,
            clear_screen: false,
            output: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Create a console reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self {
            use_colors: false,
            verbose: false,
            clear_screen: false,
            output: Mutex::new(Box::new(output)),
        }
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Clear the terminal when a watch-triggered pass starts.
    pub fn with_clear_screen(mut self, clear_screen: bool) -> Self {
        self.clear_screen = clear_screen;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn writeln(&self, line: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "[{}] {}", timestamp(), line);
        }
    }

    fn write_raw(&self, text: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = write!(output, "{}", text);
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::PassStarted { mode } => {
                if self.clear_screen && mode == BuildMode::Watch {
                    // ANSI escape code to clear screen and move cursor to top-left
                    self.write_raw("\x1B[2J\x1B[1;1H");
                }
                self.writeln(&format!("{} Building...", self.cyan("[build]")));
            }
            PipelineEvent::StageStarted { stage } => {
                if self.verbose {
                    self.writeln(&format!("{} {} ...", self.cyan("[build]"), stage));
                }
            }
            PipelineEvent::StageCompleted { stage, outputs, duration_ms } => {
                self.writeln(&format!(
                    "{} {} {} ({} file{}, {})",
                    self.cyan("[build]"),
                    self.green("ok"),
                    stage,
                    outputs,
                    if outputs == 1 { "" } else { "s" },
                    format_duration(duration_ms)
                ));
            }
            PipelineEvent::StageSkipped { stage } => {
                if self.verbose {
                    self.writeln(&format!("{} {} {}", self.cyan("[build]"), self.yellow("skip"), stage));
                }
            }
            PipelineEvent::Warning { message } => {
                self.writeln(&format!("{} {}", self.yellow("[warn]"), message));
            }
            PipelineEvent::PassSucceeded { report } => {
                self.writeln(&format!(
                    "{} {}",
                    self.green("[done]"),
                    report.summary().replace('\n', "\n           ")
                ));
            }
            PipelineEvent::PassFailed { stage, message } => {
                let prefix = stage.map(|s| format!("{}: ", s)).unwrap_or_default();
                self.writeln(&format!("{} {}{}", self.red("[error]"), prefix, message));
            }
            PipelineEvent::Watching { root } => {
                self.writeln(&format!("Watching {} for changes...", root.display()));
            }
            PipelineEvent::ChangeDetected { paths } => {
                for path in paths {
                    let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
                    self.writeln(&format!(
                        "Changed: {}",
                        name.unwrap_or_else(|| path.display().to_string())
                    ));
                }
            }
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// JSON reporter for machine-readable output (one object per line).
pub struct JsonReporter {
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonReporter").finish()
    }
}

impl JsonReporter {
    /// Create a JSON reporter writing to stdout.
    pub fn new() -> Self {
        Self { output: Mutex::new(Box::new(std::io::stdout())) }
    }

    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for JsonReporter {
    fn report(&self, event: PipelineEvent) {
        let Ok(json) = serde_json::to_string(&event) else {
            return;
        };
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", json);
        }
    }
}

/// Reporter that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events recorded so far.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&PipelineEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Format duration in milliseconds for display.
fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.2}s", ms as f64 / 1000.0)
    }
}

/// Wall-clock time of day (UTC) for log lines.
fn timestamp() -> String {
    use std::time::SystemTime;
    let now = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs() % 86400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
