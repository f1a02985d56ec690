//! Icon sprite assembly.
//!
//! Scans markup and raw SVG sources for icon containers, collects each
//! distinct icon into one [`SpriteDocument`], and rewrites HTML sources so
//! every icon becomes a `<use>` reference into the sprite.
//!
//! Icons are keyed by the container's id attribute (`data-icon` by default),
//! falling back to a hash of the icon's inner markup. The first icon seen
//! for an id wins; later icons with the same id are only rewritten.

pub mod document;
pub mod markup;
pub mod selector;

pub use document::{IconRecord, SpriteDocument, DEFAULT_VIEW_BOX};
pub use selector::{Selector, SelectorError};

use crate::build::{BuildError, ParseWarning};
use crate::config::SpriteConfig;
use crate::toolchain::css::validate_css;
use document::escape_attr;
use futures::future::join_all;
use markup::{Document, Element};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name appended when the destination is a directory.
pub const DEFAULT_SPRITE_FILE: &str = "sprite.svg";

/// Fallback icon id: `icon-` plus the first 12 hex chars of the SHA-256 of
/// the inner markup. Stable across rebuilds.
pub fn fallback_icon_id(inner: &str) -> String {
    let digest = hex::encode(Sha256::digest(inner.as_bytes()));
    format!("icon-{}", &digest[..12])
}

/// Whether `path` is a raw graphic file rather than an HTML-like document.
pub fn is_graphic_source(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("svg"))
}

/// Sprite file written for `destination`. A destination without an `.svg`
/// extension is a directory.
pub fn sprite_file(destination: &Path) -> PathBuf {
    if is_graphic_source(destination) {
        destination.to_path_buf()
    } else {
        destination.join(DEFAULT_SPRITE_FILE)
    }
}

/// Outcome of one sprite build.
#[derive(Debug, Clone, Default)]
pub struct SpriteBuild {
    pub document: SpriteDocument,
    /// Sprite file written, if any icon was found
    pub output: Option<PathBuf>,
    /// HTML sources rewritten in place
    pub rewritten: Vec<PathBuf>,
    pub warnings: Vec<ParseWarning>,
}

/// Result of scanning one source.
#[derive(Debug, Default)]
pub struct SourceScan {
    /// Rewritten text, when the source was mutated
    pub rewritten: Option<String>,
    /// Icons found in this source (including ones already in the document)
    pub icons: usize,
    pub warnings: Vec<ParseWarning>,
}

/// Extracts icons into a sprite and rewrites their sources.
#[derive(Debug, Clone)]
pub struct SpriteAssembler {
    destination: PathBuf,
    selector: Selector,
    id_attribute: String,
    href: Option<String>,
}

impl SpriteAssembler {
    /// Create an assembler.
    ///
    /// Fails with [`BuildError::Configuration`] when the destination is empty
    /// or the selector is invalid; no file is touched in that case.
    pub fn new(config: &SpriteConfig) -> Result<Self, BuildError> {
        if config.destination.as_os_str().is_empty() {
            return Err(BuildError::Configuration("sprite destination is not set".to_string()));
        }
        let selector = match config.selector.as_deref() {
            Some(s) => Selector::parse(s).map_err(|e| BuildError::Configuration(e.to_string()))?,
            None => Selector::default(),
        };
        Ok(Self {
            destination: config.destination.clone(),
            selector,
            id_attribute: config.id_attribute.clone(),
            href: config.href.clone(),
        })
    }

    /// Override the URL used in rewritten references.
    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    /// Sprite file path, see [`sprite_file`].
    pub fn output_path(&self) -> PathBuf {
        sprite_file(&self.destination)
    }

    /// URL used in rewritten references.
    pub fn href(&self) -> String {
        self.href.clone().unwrap_or_else(|| self.output_path().to_string_lossy().into_owned())
    }

    /// Build the sprite from `entries` (HTML-like or SVG) and the additional
    /// raw icon sources.
    ///
    /// Unreadable sources are skipped with a warning; the build fails with
    /// [`BuildError::ResourceMissing`] only if none could be read.
    pub async fn build(
        &self,
        entries: &[PathBuf],
        additional: &[PathBuf],
    ) -> Result<SpriteBuild, BuildError> {
        let mut sources: Vec<&PathBuf> = Vec::new();
        for path in entries.iter().chain(additional) {
            if !sources.contains(&path) {
                sources.push(path);
            }
        }

        let contents = join_all(sources.iter().map(|p| tokio::fs::read_to_string(p))).await;

        let mut build = SpriteBuild::default();
        let mut read = 0;
        for (path, content) in sources.iter().zip(contents) {
            let text = match content {
                Ok(text) => text,
                Err(e) => {
                    warn!("skipping icon source {}: {}", path.display(), e);
                    build.warnings.push(ParseWarning::new(*path, format!("unreadable: {}", e)));
                    continue;
                }
            };
            read += 1;

            let scan = self.scan_source(path, &text, &mut build.document);
            build.warnings.extend(scan.warnings);

            if let Some(rewritten) = scan.rewritten {
                tokio::fs::write(path, rewritten).await.map_err(|e| BuildError::io(path, e))?;
                build.rewritten.push((*path).clone());
            }
        }

        if read == 0 {
            let missing = sources.first().map(|p| (*p).clone()).unwrap_or_else(|| self.destination.clone());
            return Err(BuildError::ResourceMissing(missing));
        }

        if build.document.is_empty() {
            debug!("no icons found in {} source(s); sprite not written", read);
            return Ok(build);
        }

        let output = self.output_path();
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| BuildError::io(parent, e))?;
        }
        tokio::fs::write(&output, build.document.render())
            .await
            .map_err(|e| BuildError::io(&output, e))?;
        debug!("wrote sprite with {} icon(s) to {}", build.document.len(), output.display());
        build.output = Some(output);
        Ok(build)
    }

    /// Extract icons from one source into `sprite`.
    ///
    /// Raw SVG sources are wrapped in a document shell and never rewritten.
    pub fn scan_source(&self, path: &Path, text: &str, sprite: &mut SpriteDocument) -> SourceScan {
        let graphic_source = is_graphic_source(path);
        let shell;
        let source: &str = if graphic_source {
            shell = format!("<html><body>{}</body></html>", text);
            &shell
        } else {
            text
        };

        let doc = Document::parse(source);
        let mut scan = SourceScan::default();
        if !graphic_source {
            scan.warnings.extend(doc.issues.iter().map(|issue| ParseWarning::new(path, issue.clone())));
        }

        let href = self.href();
        let mut handled: Vec<usize> = Vec::new();
        let mut replacements: Vec<(usize, usize, String)> = Vec::new();

        for (index, element) in doc.elements.iter().enumerate() {
            if !self.selector.matches(element) {
                continue;
            }
            if handled.iter().any(|&outer| doc.is_descendant(index, outer)) {
                continue;
            }

            let graphic = if element.name == "svg" {
                Some(index)
            } else {
                doc.descendants(index).find(|&j| doc.elements[j].name == "svg")
            };
            let Some(graphic) = graphic else {
                continue;
            };
            handled.push(index);

            let svg = &doc.elements[graphic];
            let inner = svg.inner(source).trim().to_string();
            let id = element
                .attr(&self.id_attribute)
                .or_else(|| svg.attr(&self.id_attribute))
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| fallback_icon_id(&inner));

            for style in doc.descendants(graphic).filter(|&j| doc.elements[j].name == "style") {
                if let Err(e) = validate_css(doc.elements[style].inner(source)) {
                    warn!("invalid style block in icon '{}' ({}): {}", id, path.display(), e);
                    scan.warnings.push(ParseWarning::new(path, format!("icon '{}': {}", id, e)));
                }
            }

            let view_box = svg.attr("viewBox").unwrap_or(DEFAULT_VIEW_BOX).to_string();
            if !sprite.insert(IconRecord { id: id.clone(), view_box, inner }) {
                debug!("icon '{}' in {} already collected", id, path.display());
            }
            scan.icons += 1;

            if !graphic_source {
                replacements.push((element.start, element.end, reference_markup(element, &href, &id)));
            }
        }

        if !replacements.is_empty() {
            let mut rewritten = source.to_string();
            for (start, end, markup) in replacements.into_iter().rev() {
                rewritten.replace_range(start..end, &markup);
            }
            scan.rewritten = Some(rewritten);
        }
        scan
    }
}

/// `<svg>` carrying the container's attributes and a `<use>` into the sprite.
fn reference_markup(element: &Element, href: &str, id: &str) -> String {
    let mut out = String::from("<svg");
    for attr in &element.attrs {
        out.push(' ');
        out.push_str(&attr.name);
        if let Some(value) = &attr.value {
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
    }
    out.push_str(&format!("><use href=\"{}#{}\"></use></svg>", escape_attr(href), escape_attr(id)));
    out
}
