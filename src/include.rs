//! Include directive resolution for markup sources.
//!
//! A document pulls in a partial with `<!-- @include path/to/_partial.html -->`.
//! Paths are resolved relative to the including file's directory. Markers are
//! plain HTML comments, so they survive rendering: the including document is
//! rendered first, then each partial is rendered once, has its own markers
//! expanded, and replaces the marker text. Spliced text is never rendered
//! again.
//!
//! Cycle detection follows the current resolution chain only, so the same
//! partial may be included from several places in one document.

use crate::toolchain::{RenderContext, TemplateRenderer};
use futures::future::BoxFuture;
use regex::Regex;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Error type for include resolution failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum IncludeError {
    /// Circular include detected
    #[error("Circular include detected: {}", .0.display())]
    CircularInclude(PathBuf),
    /// File not found
    #[error("Include file not found '{}': {1}", .0.display())]
    FileNotFound(PathBuf, String),
    /// IO error reading file
    #[error("Error reading include file '{}': {1}", .0.display())]
    IoError(PathBuf, String),
    /// The partial failed to render
    #[error("Error rendering include file '{}': {1}", .0.display())]
    Render(PathBuf, String),
}

fn include_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--\s*@include\s+(\S+?)\s*-->").expect("valid regex"))
}

/// One include marker found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeMarker {
    /// Byte range of the whole marker
    pub range: Range<usize>,
    /// Path as written
    pub path: String,
}

/// Find every include marker in `text`, in document order.
pub fn find_includes(text: &str) -> Vec<IncludeMarker> {
    include_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(IncludeMarker { range: whole.range(), path: caps[1].to_string() })
        })
        .collect()
}

/// Partials (basename starting with `_`) are only rendered through includes.
pub fn is_partial(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name.to_string_lossy().starts_with('_'))
}

/// Expands include markers using a template renderer.
pub struct IncludeResolver<'a> {
    renderer: &'a dyn TemplateRenderer,
    context: &'a RenderContext,
}

impl<'a> IncludeResolver<'a> {
    pub fn new(renderer: &'a dyn TemplateRenderer, context: &'a RenderContext) -> Self {
        Self { renderer, context }
    }

    /// Expand every include in `source`, the already rendered contents of
    /// `path`.
    pub async fn expand(&self, path: &Path, source: &str) -> Result<String, IncludeError> {
        let root = tokio::fs::canonicalize(path).await.unwrap_or_else(|_| path.to_path_buf());
        self.expand_chain(path, source, vec![root]).await
    }

    fn expand_chain<'s>(
        &'s self,
        path: &'s Path,
        source: &'s str,
        chain: Vec<PathBuf>,
    ) -> BoxFuture<'s, Result<String, IncludeError>> {
        Box::pin(async move {
            let markers = find_includes(source);
            if markers.is_empty() {
                return Ok(source.to_string());
            }

            let base = path.parent().unwrap_or(Path::new("."));
            let mut out = String::with_capacity(source.len());
            let mut last = 0;

            for marker in markers {
                out.push_str(&source[last..marker.range.start]);
                last = marker.range.end;

                let target = base.join(&marker.path);
                let canonical = tokio::fs::canonicalize(&target)
                    .await
                    .map_err(|e| IncludeError::FileNotFound(target.clone(), e.to_string()))?;

                if chain.contains(&canonical) {
                    return Err(IncludeError::CircularInclude(canonical));
                }

                let text = tokio::fs::read_to_string(&canonical)
                    .await
                    .map_err(|e| IncludeError::IoError(canonical.clone(), e.to_string()))?;

                let rendered = self
                    .renderer
                    .render(&canonical, &text, self.context)
                    .await
                    .map_err(|e| IncludeError::Render(canonical.clone(), e.to_string()))?
                    .unwrap_or(text);

                let mut child_chain = chain.clone();
                child_chain.push(canonical.clone());
                out.push_str(&self.expand_chain(&canonical, &rendered, child_chain).await?);
            }

            out.push_str(&source[last..]);
            Ok(out)
        })
    }
}
