//! Configuration schema types for `kiln.toml`
//!
//! Defines the structure and validation rules for kiln project configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raster output format for re-encoded static images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossless PNG
    #[default]
    Png,
    /// Lossy JPEG (honours `quality`)
    Jpeg,
}

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,
    /// Root output directory
    #[serde(default = "default_out")]
    pub out: PathBuf,
    /// Production mode (collaborators minify their output)
    #[serde(default)]
    pub production: bool,
}

fn default_out() -> PathBuf {
    PathBuf::from("dist")
}

/// Markup sources (templates rendered to HTML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkupConfig {
    /// Glob patterns for markup sources
    #[serde(default = "default_markup_sources")]
    pub sources: Vec<String>,
    /// Output directory (defaults to `project.out`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<PathBuf>,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self { sources: default_markup_sources(), out: None }
    }
}

fn default_markup_sources() -> Vec<String> {
    vec!["src/pages/**/*.html".to_string()]
}

/// Stylesheet sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Glob patterns for stylesheet sources
    #[serde(default = "default_style_sources")]
    pub sources: Vec<String>,
    /// Output directory (defaults to `<project.out>/css`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<PathBuf>,
    /// Single file that all style fragments are assembled into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assemble: Option<PathBuf>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self { sources: default_style_sources(), out: None, assemble: None }
    }
}

fn default_style_sources() -> Vec<String> {
    vec!["src/styles/*.css".to_string()]
}

/// Script entry points handed to the module bundler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Glob patterns for entry points
    #[serde(default = "default_script_entries")]
    pub entries: Vec<String>,
    /// Output directory (defaults to `<project.out>/js`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<PathBuf>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self { entries: default_script_entries(), out: None }
    }
}

fn default_script_entries() -> Vec<String> {
    vec!["src/scripts/*.js".to_string()]
}

/// Re-encoding options for raster images found in static folders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Target format
    #[serde(default)]
    pub format: ImageFormat,
    /// Encoder quality (1-100, JPEG only)
    #[serde(default = "default_quality")]
    pub quality: u8,
    /// Downscale wider images to this width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
}

fn default_quality() -> u8 {
    80
}

/// Static folders copied verbatim into the output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticConfig {
    /// Folder roots, relative to the project root
    #[serde(default = "default_static_folders")]
    pub folders: Vec<PathBuf>,
    /// Output directory (defaults to `project.out`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<PathBuf>,
    /// Optional image re-encoding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<ImagesConfig>,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self { folders: default_static_folders(), out: None, images: None }
    }
}

fn default_static_folders() -> Vec<PathBuf> {
    vec![PathBuf::from("public")]
}

/// Icon sprite assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteConfig {
    /// Sprite file, or a directory that receives `sprite.svg`
    pub destination: PathBuf,
    /// Additional raw graphic sources (glob patterns)
    #[serde(default)]
    pub sources: Vec<String>,
    /// Icon-container selector (default: any `svg` element)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Attribute carrying an author-supplied icon id
    #[serde(default = "default_id_attribute")]
    pub id_attribute: String,
    /// Public URL of the sprite used in rewritten references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

fn default_id_attribute() -> String {
    "data-icon".to_string()
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Quiet period in milliseconds before a rebuild fires
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Shorter quiet period used after rename events
    #[serde(default = "default_rename_debounce_ms")]
    pub rename_debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default)]
    pub clear_screen: bool,
}

fn default_debounce_ms() -> u32 {
    300
}

fn default_rename_debounce_ms() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            rename_debounce_ms: default_rename_debounce_ms(),
            clear_screen: false,
        }
    }
}

/// Development server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for DevConfig {
    fn default() -> Self {
        Self { port: default_port(), host: default_host() }
    }
}

/// Complete kiln.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Project metadata (required)
    pub project: ProjectConfig,
    #[serde(default)]
    pub markup: MarkupConfig,
    #[serde(default)]
    pub styles: StylesConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default, rename = "static")]
    pub static_files: StaticConfig,
    /// Icon sprite assembly (disabled when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprite: Option<SpriteConfig>,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub dev: DevConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "sprite.destination")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "kiln.toml: '{}' {}", self.field, self.message)
    }
}

impl KilnConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(ConfigValidationError {
                field: "project.name".to_string(),
                message: "must be a non-empty string".to_string(),
            });
        }

        if self.project.out.as_os_str().is_empty() {
            errors.push(ConfigValidationError {
                field: "project.out".to_string(),
                message: "must be a non-empty path".to_string(),
            });
        }

        if self.markup.sources.is_empty() {
            errors.push(ConfigValidationError {
                field: "markup.sources".to_string(),
                message: "must contain at least one glob pattern".to_string(),
            });
        }

        if let Some(images) = &self.static_files.images {
            if images.quality == 0 || images.quality > 100 {
                errors.push(ConfigValidationError {
                    field: "static.images.quality".to_string(),
                    message: "must be between 1 and 100".to_string(),
                });
            }
            if images.max_width == Some(0) {
                errors.push(ConfigValidationError {
                    field: "static.images.max_width".to_string(),
                    message: "must be a positive integer".to_string(),
                });
            }
        }

        if let Some(sprite) = &self.sprite {
            if sprite.destination.as_os_str().is_empty() {
                errors.push(ConfigValidationError {
                    field: "sprite.destination".to_string(),
                    message: "must be a non-empty path".to_string(),
                });
            }
            if sprite.id_attribute.is_empty() {
                errors.push(ConfigValidationError {
                    field: "sprite.id_attribute".to_string(),
                    message: "must be a non-empty attribute name".to_string(),
                });
            }
        }

        if self.watch.debounce_ms == 0 {
            errors.push(ConfigValidationError {
                field: "watch.debounce_ms".to_string(),
                message: "must be a positive integer".to_string(),
            });
        }

        if self.dev.port == 0 {
            errors.push(ConfigValidationError {
                field: "dev.port".to_string(),
                message: "must be a non-zero port".to_string(),
            });
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
