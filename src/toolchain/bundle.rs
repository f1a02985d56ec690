//! Default module bundler.
//!
//! Does no dependency resolution. Each entry is copied to `<stem>.js`, and
//! side-effect stylesheet imports (`import "./theme.css";`) are lifted out
//! into an extracted `<stem>.css` asset.

use super::{BundleOutput, ModuleBundler, ToolError};
use futures::future::BoxFuture;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

fn css_import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*import\s+["']([^"']+\.css)["']\s*;?\s*$"#).expect("valid regex")
    })
}

/// Script entry split into code and stylesheet imports.
#[derive(Debug, Default, PartialEq, Eq)]
struct SplitEntry {
    code: String,
    css_imports: Vec<String>,
}

fn split_entry(source: &str, minify: bool) -> SplitEntry {
    let mut split = SplitEntry::default();
    for line in source.lines() {
        if let Some(caps) = css_import_regex().captures(line) {
            split.css_imports.push(caps[1].to_string());
            continue;
        }
        if minify {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }
            split.code.push_str(trimmed);
        } else {
            split.code.push_str(line);
        }
        split.code.push('\n');
    }
    split
}

/// Copies entries to the output directory, extracting imported CSS.
#[derive(Debug, Default, Clone)]
pub struct PassthroughBundler;

impl PassthroughBundler {
    pub fn new() -> Self {
        Self
    }

    async fn bundle_entry(
        &self,
        entry: &Path,
        out_dir: &Path,
        minify: bool,
        output: &mut BundleOutput,
    ) -> Result<(), ToolError> {
        let source = match tokio::fs::read_to_string(entry).await {
            Ok(source) => source,
            Err(e) => {
                output.success = false;
                output.logs.push(format!("error: cannot read entry {}: {}", entry.display(), e));
                return Ok(());
            }
        };

        let split = split_entry(&source, minify);
        let stem = entry.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let base = entry.parent().unwrap_or(Path::new("."));

        let mut css = String::new();
        for import in &split.css_imports {
            let path = base.join(import);
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    css.push_str(&content);
                    if !content.ends_with('\n') {
                        css.push('\n');
                    }
                }
                Err(e) => {
                    output.success = false;
                    output.logs.push(format!(
                        "error: {}: cannot resolve import \"{}\": {}",
                        entry.display(),
                        import,
                        e
                    ));
                }
            }
        }

        let js_path = out_dir.join(format!("{}.js", stem));
        tokio::fs::write(&js_path, split.code).await.map_err(|e| ToolError::io(&js_path, e))?;
        output.assets.push(js_path);

        if !css.is_empty() {
            let css_path = out_dir.join(format!("{}.css", stem));
            tokio::fs::write(&css_path, css).await.map_err(|e| ToolError::io(&css_path, e))?;
            debug!("extracted {} stylesheet import(s) from {}", split.css_imports.len(), entry.display());
            output.assets.push(css_path);
        }
        Ok(())
    }
}

impl ModuleBundler for PassthroughBundler {
    fn build<'a>(
        &'a self,
        entries: &'a [PathBuf],
        out_dir: &'a Path,
        minify: bool,
    ) -> BoxFuture<'a, Result<BundleOutput, ToolError>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(out_dir).await.map_err(|e| ToolError::io(out_dir, e))?;

            let mut output = BundleOutput { success: true, ..BundleOutput::default() };
            for entry in entries {
                self.bundle_entry(entry, out_dir, minify, &mut output).await?;
            }
            Ok(output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_split_lifts_css_imports() {
        let split = split_entry("import './a.css';\nimport x from './x.js';\nx();\n", false);
        assert_eq!(split.css_imports, vec!["./a.css".to_string()]);
        assert_eq!(split.code, "import x from './x.js';\nx();\n");
    }

    #[test]
    fn test_split_minify_drops_comments_and_blanks() {
        let split = split_entry("// header\n\n  run();  \n", true);
        assert_eq!(split.code, "run();\n");
    }

    #[tokio::test]
    async fn test_build_emits_js_and_extracted_css() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("theme.css"), ".btn { color: red }").unwrap();
        fs::write(src.join("app.js"), "import \"./theme.css\";\nconsole.log(1);\n").unwrap();

        let out = temp.path().join("dist/js");
        let result = PassthroughBundler::new()
            .build(&[src.join("app.js")], &out, false)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.assets, vec![out.join("app.js"), out.join("app.css")]);
        assert_eq!(fs::read_to_string(out.join("app.css")).unwrap(), ".btn { color: red }\n");
        assert_eq!(fs::read_to_string(out.join("app.js")).unwrap(), "console.log(1);\n");
    }

    #[tokio::test]
    async fn test_missing_entry_reports_failure() {
        let temp = TempDir::new().unwrap();
        let result = PassthroughBundler::new()
            .build(&[temp.path().join("nope.js")], temp.path(), false)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.logs.len(), 1);
        assert!(result.logs[0].contains("nope.js"));
    }
}
