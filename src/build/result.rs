//! Build result types.
//!
//! Contains types for representing the outcome of stages and passes.

use crate::build::{BuildMode, ParseWarning, StageKind, StyleFragment};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum StageStatus {
    /// Stage ran and succeeded
    Success,
    /// Stage was not needed for this pass
    Skipped,
    /// Stage failed with error
    Failed(String),
}

impl StageStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StageStatus::Success | StageStatus::Skipped)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StageStatus::Failed(_))
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Success => write!(f, "success"),
            StageStatus::Skipped => write!(f, "skipped"),
            StageStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of one stage in a pass.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub stage: StageKind,
    #[serde(flatten)]
    pub status: StageStatus,
    /// Files written by the stage
    pub outputs: Vec<PathBuf>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl StageResult {
    pub fn success(stage: StageKind, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self { stage, status: StageStatus::Success, outputs, duration }
    }

    pub fn skipped(stage: StageKind) -> Self {
        Self { stage, status: StageStatus::Skipped, outputs: vec![], duration: Duration::ZERO }
    }

    pub fn failed(stage: StageKind, error: String, duration: Duration) -> Self {
        Self { stage, status: StageStatus::Failed(error), outputs: vec![], duration }
    }

    /// Whether the stage actually executed (succeeded or failed).
    pub fn ran(&self) -> bool {
        !matches!(self.status, StageStatus::Skipped)
    }
}

/// What a stage produced, before it is folded into the report.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    /// Files written
    pub outputs: Vec<PathBuf>,
    pub warnings: Vec<ParseWarning>,
    /// Style fragments handed to assembly
    pub fragments: Vec<StyleFragment>,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Structured record of one build pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub mode: BuildMode,
    /// One entry per stage, in execution order
    pub stages: Vec<StageResult>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub warnings: Vec<ParseWarning>,
}

impl PassReport {
    pub fn new(mode: BuildMode) -> Self {
        Self { mode, stages: Vec::new(), duration: Duration::ZERO, warnings: Vec::new() }
    }

    pub fn add_stage(&mut self, result: StageResult) {
        self.stages.push(result);
    }

    /// Stages that actually ran this pass.
    pub fn stages_run(&self) -> Vec<StageKind> {
        self.stages.iter().filter(|s| s.ran()).map(|s| s.stage).collect()
    }

    pub fn ran(&self, stage: StageKind) -> bool {
        self.stages.iter().any(|s| s.stage == stage && s.ran())
    }

    pub fn is_success(&self) -> bool {
        self.stages.iter().all(|s| s.status.is_success())
    }

    /// Get all outputs produced.
    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.stages.iter().flat_map(|s| s.outputs.iter()).collect()
    }

    /// Format a summary of the pass.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let ran: Vec<String> = self.stages_run().iter().map(|s| s.to_string()).collect();
        let outputs = self.all_outputs().len();

        if ran.is_empty() {
            lines.push(format!("Nothing to rebuild ({:?})", self.duration));
        } else {
            lines.push(format!(
                "Build succeeded: {} ({} file{}) in {:?}",
                ran.join(", "),
                outputs,
                if outputs == 1 { "" } else { "s" },
                self.duration
            ));
        }

        if !self.warnings.is_empty() {
            lines.push(format!("Warnings ({}):", self.warnings.len()));
            for warning in self.warnings.iter().take(5) {
                lines.push(format!("  - {}", warning));
            }
            if self.warnings.len() > 5 {
                lines.push(format!("  ... and {} more", self.warnings.len() - 5));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Success.to_string(), "success");
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
        assert_eq!(StageStatus::Failed("boom".to_string()).to_string(), "failed: boom");
    }

    #[test]
    fn test_stages_run_excludes_skipped() {
        let mut report = PassReport::new(BuildMode::Watch);
        report.add_stage(StageResult::skipped(StageKind::Markup));
        report.add_stage(StageResult::success(StageKind::Styles, vec![], Duration::ZERO));
        report.add_stage(StageResult::skipped(StageKind::Scripts));

        assert_eq!(report.stages_run(), vec![StageKind::Styles]);
        assert!(report.ran(StageKind::Styles));
        assert!(!report.ran(StageKind::Markup));
        assert!(report.is_success());
    }

    #[test]
    fn test_failed_stage_counts_as_ran() {
        let mut report = PassReport::new(BuildMode::Full);
        report.add_stage(StageResult::failed(StageKind::Markup, "bad".to_string(), Duration::ZERO));
        assert!(report.ran(StageKind::Markup));
        assert!(report.stages[0].status.is_failure());
        assert!(!report.is_success());
    }

    #[test]
    fn test_summary_lists_stages_and_warnings() {
        let mut report = PassReport::new(BuildMode::Full);
        report.add_stage(StageResult::success(
            StageKind::Markup,
            vec![PathBuf::from("dist/index.html")],
            Duration::from_millis(5),
        ));
        report.warnings.push(ParseWarning::new("icons/x.svg", "bad style"));

        let summary = report.summary();
        assert!(summary.contains("markup"));
        assert!(summary.contains("1 file)"));
        assert!(summary.contains("icons/x.svg: bad style"));
    }

    #[test]
    fn test_report_serializes() {
        let mut report = PassReport::new(BuildMode::Watch);
        report.add_stage(StageResult::success(StageKind::StyleAssembly, vec![], Duration::from_millis(3)));
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["mode"], "watch");
        assert_eq!(json["stages"][0]["stage"], "style-assembly");
        assert_eq!(json["stages"][0]["status"], "success");
        assert_eq!(json["stages"][0]["duration"], 3);
    }
}
