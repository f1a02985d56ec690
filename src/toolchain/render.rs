//! Default template renderer backed by Tera.

use super::{RenderContext, TemplateRenderer, ToolError};
use futures::future::BoxFuture;
use std::path::Path;
use tera::{Context, Tera};
use tracing::debug;

/// Renders each markup source as a one-off Tera template.
///
/// Templates see `sitemap`, `page`, `production` and `debug`.
#[derive(Debug, Default, Clone)]
pub struct TeraRenderer;

impl TeraRenderer {
    pub fn new() -> Self {
        Self
    }

    fn render_sync(
        &self,
        path: &Path,
        source: &str,
        context: &RenderContext,
    ) -> Result<Option<String>, ToolError> {
        if path.is_dir() {
            return Ok(None);
        }

        let tera_context = Context::from_serialize(context)
            .map_err(|e| ToolError::syntax(path, format_tera_error(&e)))?;

        debug!("rendering {} as {}", path.display(), context.page);

        // Fresh instance per render so no template state leaks between pages
        let mut tera = Tera::default();
        let rendered = tera
            .render_str(source, &tera_context)
            .map_err(|e| ToolError::syntax(path, format_tera_error(&e)))?;
        Ok(Some(rendered))
    }
}

impl TemplateRenderer for TeraRenderer {
    fn render<'a>(
        &'a self,
        path: &'a Path,
        source: &'a str,
        context: &'a RenderContext,
    ) -> BoxFuture<'a, Result<Option<String>, ToolError>> {
        Box::pin(async move { self.render_sync(path, source, context) })
    }
}

/// Flatten a Tera error chain into one message without internal template names.
pub fn format_tera_error(error: &tera::Error) -> String {
    use std::error::Error;

    let mut messages = Vec::new();
    let mut current: Option<&dyn Error> = Some(error);
    while let Some(err) = current {
        let cleaned = err
            .to_string()
            .replace("Failed to render '__tera_one_off'", "")
            .replace("Failed to parse '__tera_one_off'", "")
            .replace("'__tera_one_off'", "template")
            .trim()
            .to_string();
        if !cleaned.is_empty() {
            messages.push(cleaned);
        }
        current = err.source();
    }

    if messages.is_empty() {
        "template syntax error".to_string()
    } else {
        messages.join(": ")
    }
}
