//! Error taxonomy for build passes.

use crate::build::StageKind;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error that ends a build pass.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// Missing required path or unusable configuration. Always fatal and
    /// raised before any stage runs.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A single file failed to compile in a stage.
    #[error("{stage} stage failed{}: {message}", .path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    Compilation { stage: StageKind, path: Option<PathBuf>, message: String },
    /// A static or sprite source path does not exist.
    #[error("Resource not found: {}", .0.display())]
    ResourceMissing(PathBuf),
    /// Filesystem failure outside of a collaborator call.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Another pass is already running on this orchestrator.
    #[error("A build pass is already in progress")]
    PassInProgress,
}

impl BuildError {
    /// Create a compilation error for a specific file.
    pub fn compilation(stage: StageKind, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        BuildError::Compilation { stage, path: Some(path.into()), message: message.into() }
    }

    /// Create a compilation error that is not tied to one file.
    pub fn stage_failed(stage: StageKind, message: impl Into<String>) -> Self {
        BuildError::Compilation { stage, path: None, message: message.into() }
    }

    /// Wrap an IO error with the path it occurred on.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        BuildError::Io { path: path.to_path_buf(), source }
    }

    /// Whether this error is a configuration problem (fatal before any stage).
    pub fn is_configuration(&self) -> bool {
        matches!(self, BuildError::Configuration(_))
    }
}

/// Malformed content encountered while scanning sources.
///
/// Warnings are collected into reports and logged; they never abort a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    /// File the warning relates to
    pub path: PathBuf,
    /// Description of the problem
    pub message: String,
}

impl ParseWarning {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_error_display_with_path() {
        let err = BuildError::compilation(StageKind::Styles, "src/styles/main.css", "unexpected token");
        let display = err.to_string();
        assert!(display.contains("styles stage failed"));
        assert!(display.contains("src/styles/main.css"));
        assert!(display.contains("unexpected token"));
    }

    #[test]
    fn test_compilation_error_display_without_path() {
        let err = BuildError::stage_failed(StageKind::Scripts, "bundler reported 2 errors");
        assert_eq!(err.to_string(), "scripts stage failed: bundler reported 2 errors");
    }

    #[test]
    fn test_is_configuration() {
        assert!(BuildError::Configuration("no output".to_string()).is_configuration());
        assert!(!BuildError::ResourceMissing(PathBuf::from("public")).is_configuration());
    }

    #[test]
    fn test_parse_warning_display() {
        let warning = ParseWarning::new("icons/a.svg", "invalid style block");
        assert_eq!(warning.to_string(), "icons/a.svg: invalid style block");
    }
}
