//! Styles stage: compile every stylesheet through the style preprocessor.

use crate::build::{BuildContext, BuildError, FragmentOrigin, StageKind, StageOutput, StyleFragment};
use crate::toolchain::{StyleOptions, Toolchain};
use futures::future::join_all;
use std::path::{Path, PathBuf};

/// Compiled output path: `<styles_out>/<stem>.css`.
pub fn output_path(styles_out: &Path, source: &Path) -> PathBuf {
    let stem = source.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    styles_out.join(format!("{}.css", stem))
}

async fn compile_one(
    tools: &Toolchain,
    ctx: &BuildContext,
    index: usize,
    source: &Path,
) -> Result<(PathBuf, StyleFragment), BuildError> {
    let css = tools
        .styles
        .compile(source, StyleOptions { minify: ctx.production })
        .await
        .map_err(|e| BuildError::compilation(StageKind::Styles, source, e.to_string()))?;

    let output = output_path(&ctx.styles_out, source);
    tokio::fs::write(&output, &css).await.map_err(|e| BuildError::io(&output, e))?;

    let fragment = StyleFragment::new(FragmentOrigin::Preprocessed, index, css, source);
    Ok((output, fragment))
}

/// Run the styles stage. Fragments are ordered by source position.
pub async fn run(ctx: &BuildContext, tools: &Toolchain) -> Result<StageOutput, BuildError> {
    if !ctx.style_sources.is_empty() {
        tokio::fs::create_dir_all(&ctx.styles_out)
            .await
            .map_err(|e| BuildError::io(&ctx.styles_out, e))?;
    }

    let results = join_all(
        ctx.style_sources.iter().enumerate().map(|(i, source)| compile_one(tools, ctx, i, source)),
    )
    .await;

    let mut output = StageOutput::default();
    for result in results {
        let (path, fragment) = result?;
        output.outputs.push(path);
        output.fragments.push(fragment);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_normalizes_extension() {
        assert_eq!(
            output_path(Path::new("/dist/css"), Path::new("/src/styles/theme.pcss")),
            PathBuf::from("/dist/css/theme.css")
        );
    }
}
