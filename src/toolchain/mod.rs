//! External collaborators driven by the pipeline.
//!
//! The orchestrator only talks to the traits defined here. Every trait has a
//! default implementation in a submodule, and tests swap them for doubles
//! through [`Toolchain`].

pub mod bundle;
pub mod css;
pub mod image;
pub mod render;
pub mod serve;

pub use bundle::PassthroughBundler;
pub use css::LightningCss;
pub use image::RasterCodec;
pub use render::TeraRenderer;
pub use serve::{DevServer, DevServerHandle};

use crate::config::ImagesConfig;
use futures::future::BoxFuture;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Error raised by a collaborator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    /// Source text could not be compiled
    #[error("{}: {message}", .path.display())]
    Syntax { path: PathBuf, message: String },
    /// Image could not be decoded or encoded
    #[error("image codec failed for {}: {message}", .path.display())]
    Codec { path: PathBuf, message: String },
    /// Filesystem failure
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Served root does not exist
    #[error("cannot serve {}: directory not found", .0.display())]
    RootMissing(PathBuf),
}

impl ToolError {
    pub fn syntax(path: &Path, message: impl Into<String>) -> Self {
        ToolError::Syntax { path: path.to_path_buf(), message: message.into() }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        ToolError::Io { path: path.to_path_buf(), source }
    }
}

/// One entry of the markup sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitemapEntry {
    /// Source path, absolute
    pub source: PathBuf,
    /// Output file name after the build (`about.html`)
    pub output: String,
}

/// Variables available to the template renderer.
#[derive(Debug, Clone, Serialize)]
pub struct RenderContext {
    /// Every document of the pass, computed before any render call
    pub sitemap: Vec<SitemapEntry>,
    /// Output name of the document being rendered
    pub page: String,
    pub production: bool,
    pub debug: bool,
}

/// Turns a markup source into HTML text.
pub trait TemplateRenderer: Send + Sync {
    /// Render `source` (the contents of `path`). Returns `None` when the path
    /// should be skipped, such as a directory.
    fn render<'a>(
        &'a self,
        path: &'a Path,
        source: &'a str,
        context: &'a RenderContext,
    ) -> BoxFuture<'a, Result<Option<String>, ToolError>>;
}

/// Output style requested from the style preprocessor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleOptions {
    pub minify: bool,
}

/// Turns a stylesheet source file into compiled CSS text.
pub trait StylePreprocessor: Send + Sync {
    fn compile<'a>(
        &'a self,
        path: &'a Path,
        options: StyleOptions,
    ) -> BoxFuture<'a, Result<String, ToolError>>;
}

/// Result of one bundler invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleOutput {
    pub success: bool,
    /// Files written, including CSS extracted from imports
    pub assets: Vec<PathBuf>,
    /// Diagnostics, one entry per message
    pub logs: Vec<String>,
}

impl BundleOutput {
    /// Extracted stylesheet assets.
    pub fn css_assets(&self) -> impl Iterator<Item = &PathBuf> {
        self.assets
            .iter()
            .filter(|p| p.extension().is_some_and(|e| e.eq_ignore_ascii_case("css")))
    }
}

/// Bundles script entry points.
///
/// Ordinary compile errors are reported as `success = false` with logs; an
/// `Err` means the bundler itself could not run.
pub trait ModuleBundler: Send + Sync {
    fn build<'a>(
        &'a self,
        entries: &'a [PathBuf],
        out_dir: &'a Path,
        minify: bool,
    ) -> BoxFuture<'a, Result<BundleOutput, ToolError>>;
}

/// Re-encodes raster images.
pub trait ImageCodec: Send + Sync {
    fn encode<'a>(
        &'a self,
        source: &'a Path,
        dest: &'a Path,
        options: &'a ImagesConfig,
    ) -> BoxFuture<'a, Result<(), ToolError>>;
}

/// The set of collaborators used by one orchestrator.
#[derive(Clone)]
pub struct Toolchain {
    pub renderer: Arc<dyn TemplateRenderer>,
    pub styles: Arc<dyn StylePreprocessor>,
    pub bundler: Arc<dyn ModuleBundler>,
    pub images: Arc<dyn ImageCodec>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            renderer: Arc::new(TeraRenderer::new()),
            styles: Arc::new(LightningCss::new()),
            bundler: Arc::new(PassthroughBundler::new()),
            images: Arc::new(RasterCodec::new()),
        }
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Toolchain { .. }")
    }
}

impl Toolchain {
    pub fn with_renderer(mut self, renderer: impl TemplateRenderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn with_styles(mut self, styles: impl StylePreprocessor + 'static) -> Self {
        self.styles = Arc::new(styles);
        self
    }

    pub fn with_bundler(mut self, bundler: impl ModuleBundler + 'static) -> Self {
        self.bundler = Arc::new(bundler);
        self
    }

    pub fn with_images(mut self, images: impl ImageCodec + 'static) -> Self {
        self.images = Arc::new(images);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_assets_filter() {
        let output = BundleOutput {
            success: true,
            assets: vec![
                PathBuf::from("dist/js/app.js"),
                PathBuf::from("dist/js/app.css"),
                PathBuf::from("dist/js/vendor.CSS"),
            ],
            logs: vec![],
        };
        let css: Vec<_> = output.css_assets().collect();
        assert_eq!(css, vec![&PathBuf::from("dist/js/app.css"), &PathBuf::from("dist/js/vendor.CSS")]);
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::syntax(Path::new("a.css"), "unexpected '}'");
        assert_eq!(err.to_string(), "a.css: unexpected '}'");
    }
}
