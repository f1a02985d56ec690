//! Default style preprocessor backed by lightningcss.

use super::{StyleOptions, StylePreprocessor, ToolError};
use futures::future::BoxFuture;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use std::path::Path;

/// Parses, optionally minifies, and prints stylesheets.
#[derive(Debug, Default, Clone)]
pub struct LightningCss;

impl LightningCss {
    pub fn new() -> Self {
        Self
    }
}

/// Compile CSS text. `path` is only used for error messages.
pub fn compile_css(path: &Path, source: &str, options: StyleOptions) -> Result<String, ToolError> {
    let mut sheet = StyleSheet::parse(source, ParserOptions::default())
        .map_err(|e| ToolError::syntax(path, e.to_string()))?;

    if options.minify {
        sheet.minify(MinifyOptions::default()).map_err(|e| ToolError::syntax(path, e.to_string()))?;
    }

    let printed = sheet
        .to_css(PrinterOptions { minify: options.minify, ..PrinterOptions::default() })
        .map_err(|e| ToolError::syntax(path, e.to_string()))?;
    Ok(printed.code)
}

/// Check that CSS text parses.
pub fn validate_css(source: &str) -> Result<(), String> {
    StyleSheet::parse(source, ParserOptions::default()).map(|_| ()).map_err(|e| e.to_string())
}

impl StylePreprocessor for LightningCss {
    fn compile<'a>(
        &'a self,
        path: &'a Path,
        options: StyleOptions,
    ) -> BoxFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            let source = tokio::fs::read_to_string(path).await.map_err(|e| ToolError::io(path, e))?;
            compile_css(path, &source, options)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_compile_pretty() {
        let css = compile_css(Path::new("a.css"), "a { color: red }", StyleOptions::default()).unwrap();
        assert!(css.contains("color: red"));
    }

    #[test]
    fn test_compile_minified() {
        let css = compile_css(
            Path::new("a.css"),
            "a {\n  color: #ff0000;\n}\n",
            StyleOptions { minify: true },
        )
        .unwrap();
        assert_eq!(css, "a{color:red}");
    }

    #[test]
    fn test_syntax_error_names_file() {
        let err = compile_css(Path::new("bad.css"), "..icon { fill: red }", StyleOptions::default())
            .unwrap_err();
        assert!(matches!(err, ToolError::Syntax { .. }));
        assert!(err.to_string().starts_with("bad.css"));
    }

    #[test]
    fn test_validate_css() {
        assert!(validate_css(".a { fill: red }").is_ok());
    }

    #[tokio::test]
    async fn test_compile_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("main.css");
        std::fs::write(&path, "body { margin: 0 }").unwrap();

        let css = LightningCss::new().compile(&path, StyleOptions { minify: true }).await.unwrap();
        assert_eq!(css, "body{margin:0}");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = LightningCss::new()
            .compile(Path::new("/nonexistent/x.css"), StyleOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Io { .. }));
    }
}
