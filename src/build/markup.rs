//! Markup stage: render pages to HTML, then assemble the icon sprite.

use crate::build::{BuildContext, BuildError, SourceSelector, StageKind, StageOutput};
use crate::include::{is_partial, IncludeResolver};
use crate::sprite::SpriteAssembler;
use crate::toolchain::{RenderContext, SitemapEntry, TemplateRenderer, Toolchain};
use futures::future::join_all;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Deepest directory containing every path.
fn common_dir(paths: &[PathBuf]) -> PathBuf {
    let mut iter = paths.iter().filter_map(|p| p.parent());
    let Some(first) = iter.next() else {
        return PathBuf::new();
    };
    let mut common = first.to_path_buf();
    for dir in iter {
        while !dir.starts_with(&common) {
            if !common.pop() {
                return PathBuf::new();
            }
        }
    }
    common
}

/// Normal components of `path` joined with `/`.
fn url_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Output name of a source: its path below `base` with the extension
/// normalized to `.html`.
fn output_name(base: &Path, source: &Path) -> String {
    let relative = source.strip_prefix(base).unwrap_or(source);
    url_path(&relative.with_extension("html"))
}

/// Output names for every non-partial source, computed before any render.
pub fn build_sitemap(sources: &[PathBuf]) -> Vec<SitemapEntry> {
    let pages: Vec<PathBuf> = sources.iter().filter(|p| !is_partial(p)).cloned().collect();
    let base = common_dir(&pages);
    pages
        .into_iter()
        .map(|source| SitemapEntry { output: output_name(&base, &source), source })
        .collect()
}

async fn render_page(
    renderer: &dyn TemplateRenderer,
    entry: &SitemapEntry,
    sitemap: &[SitemapEntry],
    ctx: &BuildContext,
) -> Result<Option<PathBuf>, BuildError> {
    let path = &entry.source;
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BuildError::compilation(StageKind::Markup, path, e.to_string()))?;

    let context = RenderContext {
        sitemap: sitemap.to_vec(),
        page: entry.output.clone(),
        production: ctx.production,
        debug: ctx.debug,
    };

    let Some(rendered) = renderer
        .render(path, &source, &context)
        .await
        .map_err(|e| BuildError::compilation(StageKind::Markup, path, e.to_string()))?
    else {
        debug!("renderer skipped {}", path.display());
        return Ok(None);
    };

    let html = IncludeResolver::new(renderer, &context)
        .expand(path, &rendered)
        .await
        .map_err(|e| BuildError::compilation(StageKind::Markup, path, e.to_string()))?;

    let output = ctx.markup_out.join(&entry.output);
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| BuildError::io(parent, e))?;
    }
    tokio::fs::write(&output, html).await.map_err(|e| BuildError::io(&output, e))?;
    Ok(Some(output))
}

/// Site-absolute URL of `path` when it lies under the output root.
fn site_href(out_dir: &Path, path: &Path) -> String {
    match path.strip_prefix(out_dir) {
        Ok(relative) => format!("/{}", url_path(relative)),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

/// Run the markup stage.
pub async fn run(ctx: &BuildContext, tools: &Toolchain) -> Result<StageOutput, BuildError> {
    let sitemap = build_sitemap(&ctx.markup_sources);
    let renderer = tools.renderer.as_ref();

    let results =
        join_all(sitemap.iter().map(|entry| render_page(renderer, entry, &sitemap, ctx))).await;

    let mut output = StageOutput::default();
    for result in results {
        if let Some(path) = result? {
            output.outputs.push(path);
        }
    }

    if let Some(sprite) = &ctx.sprite {
        let mut assembler = SpriteAssembler::new(sprite)?;
        if sprite.href.is_none() {
            let href = site_href(&ctx.out_dir, &assembler.output_path());
            assembler = assembler.with_href(href);
        }

        let additional = SourceSelector::Globs(sprite.sources.clone()).resolve(&ctx.root)?;
        let build = assembler.build(&output.outputs, &additional).await?;
        output.warnings.extend(build.warnings);
        if let Some(sprite_file) = build.output {
            output.outputs.push(sprite_file);
        }
    }

    Ok(output)
}
