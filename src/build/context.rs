//! Build configuration and the per-pass resolved context.
//!
//! [`BuildConfig`] is the stored initial configuration. It is never mutated by
//! a pass; at the start of every pass it is resolved into a fresh
//! [`BuildContext`] whose source lists and output directories are absolute.

use crate::build::{BuildError, BuildMode, PassReport, StageGate};
use crate::config::{ImagesConfig, KilnConfig, SpriteConfig};
use glob::glob;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Callback producing a source list on demand.
pub type SourceThunk = Arc<dyn Fn() -> Vec<PathBuf> + Send + Sync>;

/// Where the sources of one asset class come from.
#[derive(Clone)]
pub enum SourceSelector {
    /// Explicit paths, relative to the project root unless absolute
    List(Vec<PathBuf>),
    /// Glob patterns, relative to the project root
    Globs(Vec<String>),
    /// Evaluated anew at the start of every pass
    Thunk(SourceThunk),
}

impl std::fmt::Debug for SourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSelector::List(paths) => f.debug_tuple("List").field(paths).finish(),
            SourceSelector::Globs(patterns) => f.debug_tuple("Globs").field(patterns).finish(),
            SourceSelector::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

impl Default for SourceSelector {
    fn default() -> Self {
        SourceSelector::List(Vec::new())
    }
}

impl SourceSelector {
    /// Build a selector from a closure.
    pub fn thunk<F>(f: F) -> Self
    where
        F: Fn() -> Vec<PathBuf> + Send + Sync + 'static,
    {
        SourceSelector::Thunk(Arc::new(f))
    }

    /// Resolve to a sorted, deduplicated list of absolute paths.
    ///
    /// Explicit lists and thunk results are returned as given (absolutized);
    /// glob patterns only yield paths that exist.
    pub fn resolve(&self, root: &Path) -> Result<Vec<PathBuf>, BuildError> {
        let mut found = BTreeSet::new();
        match self {
            SourceSelector::List(paths) => {
                found.extend(paths.iter().map(|p| resolve_path(root, p)));
            }
            SourceSelector::Thunk(thunk) => {
                found.extend(thunk().iter().map(|p| resolve_path(root, p)));
            }
            SourceSelector::Globs(patterns) => {
                for pattern in patterns {
                    found.extend(discover(root, pattern)?);
                }
            }
        }
        Ok(found.into_iter().collect())
    }
}

/// Expand one glob pattern relative to `root`.
fn discover(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, BuildError> {
    let full_pattern = resolve_path(root, Path::new(pattern));
    let pattern_str = full_pattern.to_string_lossy();

    let paths = glob(&pattern_str).map_err(|e| {
        BuildError::Configuration(format!("Invalid glob pattern '{}': {}", pattern, e))
    })?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => files.push(path),
            Err(e) => warn!("error reading path while expanding '{}': {}", pattern, e),
        }
    }
    Ok(files)
}

/// Resolve a path relative to the project root.
pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Callback invoked with a value produced by a pass.
pub type Hook<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Lifecycle callbacks.
#[derive(Clone, Default)]
pub struct BuildHooks {
    /// A pass is starting
    pub on_start: Option<Hook<BuildMode>>,
    /// A pass finished successfully
    pub on_build_complete: Option<Hook<PassReport>>,
    /// A watch-triggered pass finished successfully
    pub on_update: Option<Hook<PassReport>>,
    /// A pass failed
    pub on_error: Option<Hook<BuildError>>,
}

impl std::fmt::Debug for BuildHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildHooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_build_complete", &self.on_build_complete.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl BuildHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, f: impl Fn(&BuildMode) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    pub fn on_build_complete(mut self, f: impl Fn(&PassReport) + Send + Sync + 'static) -> Self {
        self.on_build_complete = Some(Arc::new(f));
        self
    }

    pub fn on_update(mut self, f: impl Fn(&PassReport) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&BuildError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

/// Stored build configuration.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Project root directory (where kiln.toml is located)
    pub root: PathBuf,
    /// Root output directory
    pub out_dir: PathBuf,
    pub markup: SourceSelector,
    pub markup_out: Option<PathBuf>,
    pub styles: SourceSelector,
    pub styles_out: Option<PathBuf>,
    /// Single-file style assembly target
    pub assemble: Option<PathBuf>,
    pub scripts: SourceSelector,
    pub scripts_out: Option<PathBuf>,
    /// Static folder roots
    pub static_folders: SourceSelector,
    pub static_out: Option<PathBuf>,
    pub images: Option<ImagesConfig>,
    pub sprite: Option<SpriteConfig>,
    /// Production mode (collaborators minify)
    pub production: bool,
    /// Verbose diagnostics
    pub debug: bool,
    pub hooks: BuildHooks,
}

impl BuildConfig {
    /// Create a configuration with no sources.
    pub fn new(root: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            out_dir: out_dir.into(),
            markup: SourceSelector::default(),
            markup_out: None,
            styles: SourceSelector::default(),
            styles_out: None,
            assemble: None,
            scripts: SourceSelector::default(),
            scripts_out: None,
            static_folders: SourceSelector::default(),
            static_out: None,
            images: None,
            sprite: None,
            production: false,
            debug: false,
            hooks: BuildHooks::default(),
        }
    }

    /// Lower a loaded `kiln.toml` into a build configuration.
    pub fn from_config(config: &KilnConfig, root: impl Into<PathBuf>) -> Self {
        let mut build = Self::new(root, config.project.out.clone());
        build.markup = SourceSelector::Globs(config.markup.sources.clone());
        build.markup_out = config.markup.out.clone();
        build.styles = SourceSelector::Globs(config.styles.sources.clone());
        build.styles_out = config.styles.out.clone();
        build.assemble = config.styles.assemble.clone();
        build.scripts = SourceSelector::Globs(config.scripts.entries.clone());
        build.scripts_out = config.scripts.out.clone();
        build.static_folders = SourceSelector::List(config.static_files.folders.clone());
        build.static_out = config.static_files.out.clone();
        build.images = config.static_files.images.clone();
        build.sprite = config.sprite.clone();
        build.production = config.project.production;
        build
    }

    pub fn with_markup(mut self, selector: SourceSelector) -> Self {
        self.markup = selector;
        self
    }

    pub fn with_styles(mut self, selector: SourceSelector) -> Self {
        self.styles = selector;
        self
    }

    pub fn with_scripts(mut self, selector: SourceSelector) -> Self {
        self.scripts = selector;
        self
    }

    pub fn with_static(mut self, selector: SourceSelector) -> Self {
        self.static_folders = selector;
        self
    }

    pub fn with_assemble(mut self, path: impl Into<PathBuf>) -> Self {
        self.assemble = Some(path.into());
        self
    }

    pub fn with_sprite(mut self, sprite: SpriteConfig) -> Self {
        self.sprite = Some(sprite);
        self
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_hooks(mut self, hooks: BuildHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Absolute project root with symlinks resolved, matching the paths a
    /// filesystem watcher reports. A root that does not exist is only made
    /// absolute.
    fn absolute_root(&self) -> Result<PathBuf, BuildError> {
        if self.root.as_os_str().is_empty() {
            return Err(BuildError::Configuration("project root is empty".to_string()));
        }
        let root = if self.root.is_absolute() {
            self.root.clone()
        } else {
            let cwd = std::env::current_dir().map_err(|e| BuildError::io(&self.root, e))?;
            cwd.join(&self.root)
        };
        Ok(root.canonicalize().unwrap_or(root))
    }

    /// Resolve the configuration for one pass.
    ///
    /// Fails fast with [`BuildError::Configuration`] when the output
    /// directory is empty or no markup source resolves.
    pub fn resolve(&self) -> Result<BuildContext, BuildError> {
        let root = self.absolute_root()?;

        if self.out_dir.as_os_str().is_empty() {
            return Err(BuildError::Configuration("output directory is not set".to_string()));
        }
        let out_dir = resolve_path(&root, &self.out_dir);

        let markup_sources: Vec<PathBuf> =
            self.markup.resolve(&root)?.into_iter().filter(|p| !p.is_dir()).collect();
        if markup_sources.is_empty() {
            return Err(BuildError::Configuration(format!(
                "no markup sources found under {}",
                root.display()
            )));
        }

        let out_or = |path: &Option<PathBuf>, default: PathBuf| {
            path.as_ref().map(|p| resolve_path(&root, p)).unwrap_or(default)
        };

        let sprite = self.sprite.as_ref().map(|sprite| SpriteConfig {
            destination: if sprite.destination.as_os_str().is_empty() {
                PathBuf::new()
            } else {
                resolve_path(&root, &sprite.destination)
            },
            ..sprite.clone()
        });

        Ok(BuildContext {
            markup_out: out_or(&self.markup_out, out_dir.clone()),
            styles_out: out_or(&self.styles_out, out_dir.join("css")),
            scripts_out: out_or(&self.scripts_out, out_dir.join("js")),
            static_out: out_or(&self.static_out, out_dir.clone()),
            assemble: self.assemble.as_ref().map(|p| resolve_path(&root, p)),
            markup_sources,
            style_sources: files_only(self.styles.resolve(&root)?),
            script_entries: files_only(self.scripts.resolve(&root)?),
            static_roots: canonical(self.static_folders.resolve(&root)?),
            images: self.images.clone(),
            sprite,
            production: self.production,
            debug: self.debug,
            root,
            out_dir,
        })
    }
}

/// Static roots are compared against watcher paths, so resolve symlinks in
/// each one that exists.
fn canonical(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.into_iter().map(|p| p.canonicalize().unwrap_or(p)).collect()
}

fn files_only(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.into_iter().filter(|p| !p.is_dir()).collect()
}

/// Resolved, immutable view of the configuration for one pass.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub root: PathBuf,
    pub out_dir: PathBuf,
    pub markup_out: PathBuf,
    pub styles_out: PathBuf,
    pub scripts_out: PathBuf,
    pub static_out: PathBuf,
    pub assemble: Option<PathBuf>,
    pub markup_sources: Vec<PathBuf>,
    pub style_sources: Vec<PathBuf>,
    pub script_entries: Vec<PathBuf>,
    pub static_roots: Vec<PathBuf>,
    pub images: Option<ImagesConfig>,
    /// Sprite settings with an absolute destination
    pub sprite: Option<SpriteConfig>,
    pub production: bool,
    pub debug: bool,
}

impl BuildContext {
    /// Gate for this pass's configuration.
    pub fn stage_gate(&self) -> StageGate {
        StageGate::new(self.static_roots.clone(), self.assemble.is_some())
    }

    /// Resolve a path relative to the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        resolve_path(&self.root, path)
    }
}
