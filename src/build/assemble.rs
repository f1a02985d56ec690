//! Style assembly: merge every style fragment of a pass into one file.
//!
//! Fragments come from the style stage (compiled stylesheets) and from the
//! script stage (CSS the bundler extracted from imports). They are ordered by
//! `order_index`, deduplicated by content hash, joined with origin comments,
//! and compiled once more by the style preprocessor into the configured
//! output file.

use crate::build::{BuildError, StageKind};
use crate::toolchain::{StyleOptions, StylePreprocessor};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which stage produced a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FragmentOrigin {
    /// Compiled by the style preprocessor
    Preprocessed,
    /// Extracted from script imports by the module bundler
    BundlerExtracted,
}

impl std::fmt::Display for FragmentOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FragmentOrigin::Preprocessed => write!(f, "preprocessed"),
            FragmentOrigin::BundlerExtracted => write!(f, "bundler-extracted"),
        }
    }
}

/// One unit of style source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleFragment {
    pub origin: FragmentOrigin,
    /// SHA-256 of `content`, hex encoded
    pub identity_hash: String,
    /// Position in the merged output
    pub order_index: usize,
    pub content: String,
    /// File the content was read from
    pub source_path: PathBuf,
}

impl StyleFragment {
    pub fn new(
        origin: FragmentOrigin,
        order_index: usize,
        content: impl Into<String>,
        source_path: impl Into<PathBuf>,
    ) -> Self {
        let content = content.into();
        let identity_hash = hex::encode(Sha256::digest(content.as_bytes()));
        Self { origin, identity_hash, order_index, content, source_path: source_path.into() }
    }
}

/// Concatenate fragments in `order_index` order, skipping exact duplicates.
pub fn merge_fragments(fragments: &[StyleFragment]) -> String {
    let mut ordered: Vec<&StyleFragment> = fragments.iter().collect();
    ordered.sort_by_key(|f| f.order_index);

    let mut seen = HashSet::new();
    let mut merged = String::new();
    for fragment in ordered {
        if !seen.insert(fragment.identity_hash.as_str()) {
            debug!("dropping duplicate fragment from {}", fragment.source_path.display());
            continue;
        }
        if !merged.is_empty() {
            merged.push('\n');
        }
        merged.push_str(&format!("/* {}: {} */\n", fragment.origin, fragment.source_path.display()));
        merged.push_str(&fragment.content);
        if !fragment.content.ends_with('\n') {
            merged.push('\n');
        }
    }
    merged
}

/// What an assembly run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// The merged output was written
    Written(PathBuf),
    /// No fragments; a stale output was removed if present
    Empty { removed_stale: bool },
}

/// Merges fragments into a single compiled stylesheet.
pub struct StyleAssembler<'a> {
    preprocessor: &'a dyn StylePreprocessor,
    output: PathBuf,
    options: StyleOptions,
}

impl<'a> StyleAssembler<'a> {
    pub fn new(preprocessor: &'a dyn StylePreprocessor, output: impl Into<PathBuf>, minify: bool) -> Self {
        Self { preprocessor, output: output.into(), options: StyleOptions { minify } }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn temp_path(&self) -> PathBuf {
        let name = self.output.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        self.output.with_file_name(format!(".{}.kiln-tmp.css", name))
    }

    /// Merge, compile and write `fragments`.
    pub async fn assemble(&self, fragments: &[StyleFragment]) -> Result<AssemblyOutcome, BuildError> {
        if fragments.is_empty() {
            let removed_stale = match tokio::fs::remove_file(&self.output).await {
                Ok(()) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(BuildError::io(&self.output, e)),
            };
            warn!(
                "no style fragments to assemble into {}{}",
                self.output.display(),
                if removed_stale { "; removed stale output" } else { "" }
            );
            return Ok(AssemblyOutcome::Empty { removed_stale });
        }

        let merged = merge_fragments(fragments);
        if let Some(parent) = self.output.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| BuildError::io(parent, e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &merged).await.map_err(|e| BuildError::io(&temp, e))?;
        let compiled = self.preprocessor.compile(&temp, self.options).await;
        let _ = tokio::fs::remove_file(&temp).await;

        let compiled = compiled.map_err(|e| {
            BuildError::compilation(StageKind::StyleAssembly, &self.output, e.to_string())
        })?;
        tokio::fs::write(&self.output, compiled).await.map_err(|e| BuildError::io(&self.output, e))?;

        // Extracted CSS now lives only in the merged file.
        for fragment in fragments.iter().filter(|f| f.origin == FragmentOrigin::BundlerExtracted) {
            match tokio::fs::remove_file(&fragment.source_path).await {
                Ok(()) => debug!("removed folded fragment {}", fragment.source_path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(BuildError::io(&fragment.source_path, e)),
            }
        }

        Ok(AssemblyOutcome::Written(self.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::LightningCss;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_merge_orders_and_dedups() {
        let fragments = vec![
            StyleFragment::new(FragmentOrigin::BundlerExtracted, 2, ".b{}", "js/app.css"),
            StyleFragment::new(FragmentOrigin::Preprocessed, 0, ".a{}\n", "css/main.css"),
            StyleFragment::new(FragmentOrigin::BundlerExtracted, 3, ".a{}\n", "js/other.css"),
        ];
        let merged = merge_fragments(&fragments);
        assert_eq!(
            merged,
            "/* preprocessed: css/main.css */\n.a{}\n\n/* bundler-extracted: js/app.css */\n.b{}\n"
        );
    }

    #[test]
    fn test_identity_hash_depends_on_content_only() {
        let a = StyleFragment::new(FragmentOrigin::Preprocessed, 0, "x", "a.css");
        let b = StyleFragment::new(FragmentOrigin::BundlerExtracted, 5, "x", "b.css");
        assert_eq!(a.identity_hash, b.identity_hash);
        assert_eq!(a.identity_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_assemble_writes_and_removes_extracted_files() {
        let temp = TempDir::new().unwrap();
        let extracted = temp.path().join("app.css");
        fs::write(&extracted, ".btn { color: red }").unwrap();

        let fragments = vec![
            StyleFragment::new(FragmentOrigin::Preprocessed, 0, "body { margin: 0 }", temp.path().join("main.css")),
            StyleFragment::new(FragmentOrigin::BundlerExtracted, 1, ".btn { color: red }", &extracted),
        ];
        let output = temp.path().join("dist/bundle.css");
        let preprocessor = LightningCss::new();
        let outcome = StyleAssembler::new(&preprocessor, &output, true).assemble(&fragments).await.unwrap();

        assert_eq!(outcome, AssemblyOutcome::Written(output.clone()));
        assert_eq!(fs::read_to_string(&output).unwrap(), "body{margin:0}.btn{color:red}");
        assert!(!extracted.exists());
        assert!(!temp.path().join("dist/.bundle.css.kiln-tmp.css").exists());
    }

    #[tokio::test]
    async fn test_empty_fragments_remove_stale_output() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("bundle.css");
        fs::write(&output, "stale").unwrap();

        let preprocessor = LightningCss::new();
        let assembler = StyleAssembler::new(&preprocessor, &output, false);
        assert_eq!(
            assembler.assemble(&[]).await.unwrap(),
            AssemblyOutcome::Empty { removed_stale: true }
        );
        assert!(!output.exists());
        assert_eq!(
            assembler.assemble(&[]).await.unwrap(),
            AssemblyOutcome::Empty { removed_stale: false }
        );
    }

    #[tokio::test]
    async fn test_compile_error_is_assembly_failure() {
        let temp = TempDir::new().unwrap();
        let fragments = vec![StyleFragment::new(
            FragmentOrigin::Preprocessed,
            0,
            "..broken { color: red }",
            temp.path().join("a.css"),
        )];
        let preprocessor = LightningCss::new();
        let err = StyleAssembler::new(&preprocessor, temp.path().join("out.css"), false)
            .assemble(&fragments)
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Compilation { stage: StageKind::StyleAssembly, .. }));
        assert!(!temp.path().join(".out.css.kiln-tmp.css").exists());
    }
}
