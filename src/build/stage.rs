//! Pipeline stages and the gate that decides which ones run in a pass.

use crate::build::ChangeSet;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One phase of the build pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// Render markup sources to HTML (and assemble the icon sprite)
    Markup,
    /// Compile stylesheets
    Styles,
    /// Bundle script entry points
    Scripts,
    /// Merge style fragments into one file
    StyleAssembly,
    /// Copy static folders
    Static,
}

impl StageKind {
    /// Fixed execution order within a pass.
    pub const ORDER: [StageKind; 5] = [
        StageKind::Markup,
        StageKind::Styles,
        StageKind::Scripts,
        StageKind::StyleAssembly,
        StageKind::Static,
    ];

    /// Extensions whose change makes this stage re-run in watch mode.
    ///
    /// Static and style-assembly stages are not extension driven.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            StageKind::Markup => MARKUP_EXTENSIONS,
            StageKind::Styles => STYLE_EXTENSIONS,
            StageKind::Scripts => SCRIPT_EXTENSIONS,
            StageKind::StyleAssembly | StageKind::Static => &[],
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Markup => write!(f, "markup"),
            StageKind::Styles => write!(f, "styles"),
            StageKind::Scripts => write!(f, "scripts"),
            StageKind::StyleAssembly => write!(f, "style-assembly"),
            StageKind::Static => write!(f, "static"),
        }
    }
}

/// Recognized markup extensions. `.svg` is included because icon sources
/// feed the sprite assembled at the end of the markup stage.
pub const MARKUP_EXTENSIONS: &[&str] = &[".html", ".htm", ".tera", ".j2", ".svg"];

/// Recognized stylesheet extensions.
pub const STYLE_EXTENSIONS: &[&str] = &[".css", ".pcss"];

/// Recognized script extensions.
pub const SCRIPT_EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".jsx", ".ts", ".tsx"];

/// Whether the pass is a full build or a watch-triggered rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Every stage runs
    Full,
    /// Only stages affected by the change set run
    Watch,
}

/// Decides which stages must execute for a change set.
///
/// The filter is conservative: it never skips a stage whose inputs changed,
/// but an ambiguous extension may re-run an unrelated stage.
#[derive(Debug, Clone, Default)]
pub struct StageGate {
    static_roots: Vec<PathBuf>,
    assembly_configured: bool,
}

impl StageGate {
    pub fn new(static_roots: Vec<PathBuf>, assembly_configured: bool) -> Self {
        Self { static_roots, assembly_configured }
    }

    /// Whether `stage` must run for `changes`.
    pub fn needs_stage(&self, stage: StageKind, changes: &ChangeSet, watch: bool) -> bool {
        if !watch {
            return stage != StageKind::StyleAssembly || self.assembly_configured;
        }

        match stage {
            StageKind::Markup | StageKind::Styles | StageKind::Scripts => {
                stage.extensions().iter().any(|ext| changes.contains_extension(ext))
            }
            StageKind::StyleAssembly => {
                self.assembly_configured
                    && (self.needs_stage(StageKind::Styles, changes, true)
                        || self.needs_stage(StageKind::Scripts, changes, true))
            }
            StageKind::Static => changes.paths().iter().any(|p| self.is_static_path(p)),
        }
    }

    /// Whether `path` is a descendant of a configured static root.
    pub fn is_static_path(&self, path: &Path) -> bool {
        self.static_roots.iter().any(|root| path.starts_with(root) && path != root)
    }

    /// Stages that must run, in execution order.
    pub fn plan(&self, changes: &ChangeSet, watch: bool) -> Vec<StageKind> {
        StageKind::ORDER.into_iter().filter(|s| self.needs_stage(*s, changes, watch)).collect()
    }
}
