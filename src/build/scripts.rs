//! Scripts stage: bundle every entry point through the module bundler.

use crate::build::{BuildContext, BuildError, FragmentOrigin, StageKind, StageOutput, StyleFragment};
use crate::toolchain::Toolchain;
use tracing::{debug, warn};

/// Run the scripts stage.
///
/// CSS assets the bundler extracted become fragments ordered after every
/// stylesheet source. When assembly is configured they are folded into the
/// assembled file and deleted, so they are left out of the stage outputs.
pub async fn run(ctx: &BuildContext, tools: &Toolchain) -> Result<StageOutput, BuildError> {
    let mut output = StageOutput::default();
    if ctx.script_entries.is_empty() {
        debug!("no script entries");
        return Ok(output);
    }

    let bundle = tools
        .bundler
        .build(&ctx.script_entries, &ctx.scripts_out, ctx.production)
        .await
        .map_err(|e| BuildError::stage_failed(StageKind::Scripts, e.to_string()))?;

    if !bundle.success {
        for line in &bundle.logs {
            warn!("bundler: {}", line);
        }
        let message = if bundle.logs.is_empty() {
            "bundler reported failure".to_string()
        } else {
            bundle.logs.join("\n")
        };
        return Err(BuildError::stage_failed(StageKind::Scripts, message));
    }
    for line in &bundle.logs {
        debug!("bundler: {}", line);
    }

    let base = ctx.style_sources.len();
    for (i, asset) in bundle.css_assets().enumerate() {
        let content = tokio::fs::read_to_string(asset).await.map_err(|e| BuildError::io(asset, e))?;
        output.fragments.push(StyleFragment::new(
            FragmentOrigin::BundlerExtracted,
            base + i,
            content,
            asset,
        ));
    }

    output.outputs = if ctx.assemble.is_some() {
        bundle.assets.iter().filter(|a| !bundle.css_assets().any(|c| c == *a)).cloned().collect()
    } else {
        bundle.assets
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildConfig, SourceSelector};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn context(temp: &TempDir, assemble: bool) -> BuildContext {
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/index.html"), "<p></p>").unwrap();
        fs::write(temp.path().join("src/app.js"), "import './app.css';\nconsole.log(1);\n").unwrap();
        fs::write(temp.path().join("src/app.css"), ".app { color: red }").unwrap();
        let mut config = BuildConfig::new(temp.path(), "dist")
            .with_markup(SourceSelector::Globs(vec!["src/*.html".to_string()]))
            .with_scripts(SourceSelector::List(vec![PathBuf::from("src/app.js")]));
        if assemble {
            config = config.with_assemble("dist/site.css");
        }
        config.resolve().unwrap()
    }

    #[tokio::test]
    async fn test_extracted_css_is_an_output_without_assembly() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, false);

        let output = run(&ctx, &Toolchain::default()).await.unwrap();

        assert_eq!(output.fragments.len(), 1);
        assert!(output.outputs.contains(&ctx.scripts_out.join("app.js")));
        assert!(output.outputs.contains(&ctx.scripts_out.join("app.css")));
    }

    #[tokio::test]
    async fn test_extracted_css_is_not_an_output_with_assembly() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp, true);

        let output = run(&ctx, &Toolchain::default()).await.unwrap();

        assert_eq!(output.fragments.len(), 1);
        assert_eq!(output.fragments[0].origin, FragmentOrigin::BundlerExtracted);
        assert_eq!(output.outputs, vec![ctx.scripts_out.join("app.js")]);
    }
}
