//! Project initialization for kiln
//!
//! Scaffolds a starter site that exercises every stage: a page with an
//! include and an inline icon, a stylesheet, a script entry importing its
//! own CSS, an icon folder and a static folder.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error during project initialization
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InitError {
    /// Directory already exists and is not empty
    #[error("Directory already exists and is not empty: {}", .0.display())]
    DirectoryNotEmpty(PathBuf),
    /// Failed to create directory
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to write file
    #[error("Failed to write {}: {source}", .path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Files written by [`init_project`], relative to the project directory.
pub const SCAFFOLD_FILES: &[&str] = &[
    "kiln.toml",
    ".gitignore",
    "src/pages/index.html",
    "src/pages/_header.html",
    "src/styles/main.css",
    "src/scripts/main.js",
    "src/scripts/widget.css",
    "src/icons/check.svg",
    "public/.gitkeep",
];

/// Initialize a new kiln project.
///
/// `path` may be missing or an empty directory; anything else is refused.
///
/// # Example
/// ```ignore
/// init_project(Path::new("my-site"), "my-site")?;
/// ```
pub fn init_project(path: &Path, name: &str) -> Result<(), InitError> {
    if path.exists() {
        let is_empty = path.read_dir().map(|mut d| d.next().is_none()).unwrap_or(false);
        if !is_empty {
            return Err(InitError::DirectoryNotEmpty(path.to_path_buf()));
        }
    }

    create_dir(path)?;
    create_dir(&path.join("src/pages"))?;
    create_dir(&path.join("src/styles"))?;
    create_dir(&path.join("src/scripts"))?;
    create_dir(&path.join("src/icons"))?;
    create_dir(&path.join("public"))?;

    write_file(&path.join("kiln.toml"), &generate_config(name))?;
    write_file(&path.join(".gitignore"), GITIGNORE)?;
    write_file(&path.join("src/pages/index.html"), &generate_index(name))?;
    write_file(&path.join("src/pages/_header.html"), HEADER_PARTIAL)?;
    write_file(&path.join("src/styles/main.css"), MAIN_CSS)?;
    write_file(&path.join("src/scripts/main.js"), MAIN_JS)?;
    write_file(&path.join("src/scripts/widget.css"), WIDGET_CSS)?;
    write_file(&path.join("src/icons/check.svg"), CHECK_ICON)?;
    write_file(&path.join("public/.gitkeep"), "")?;

    Ok(())
}

/// Create a directory and all parent directories.
fn create_dir(path: &Path) -> Result<(), InitError> {
    fs::create_dir_all(path).map_err(|source| InitError::CreateDir { path: path.to_path_buf(), source })
}

/// Write content to a file.
fn write_file(path: &Path, content: &str) -> Result<(), InitError> {
    fs::write(path, content).map_err(|source| InitError::WriteFile { path: path.to_path_buf(), source })
}

/// Generate kiln.toml configuration.
fn generate_config(name: &str) -> String {
    format!(
        r#"[project]
name = "{}"
out = "dist"

[markup]
sources = ["src/pages/**/*.html"]

[styles]
sources = ["src/styles/*.css"]
assemble = "dist/css/site.css"

[scripts]
entries = ["src/scripts/main.js"]

[static]
folders = ["public"]

[sprite]
destination = "dist/icons"
sources = ["src/icons/*.svg"]

[watch]
debounce_ms = 300

[dev]
port = 8080
"#,
        name
    )
}

const GITIGNORE: &str = r#"# kiln build output
dist/

# OS files
.DS_Store
Thumbs.db
"#;

fn generate_index(name: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <title>{}</title>
  <link rel="stylesheet" href="/css/site.css">
</head>
<body>
<!-- @include _header.html -->
<main>
  <p><svg class="icon" data-icon="star" viewBox="0 0 24 24"><path d="M12 2l3 7h7l-6 4 2 7-6-4-6 4 2-7-6-4h7z"/></svg> Built with kiln.</p>
</main>
<script src="/js/main.js"></script>
</body>
</html>
"#,
        name
    )
}

const HEADER_PARTIAL: &str = r#"<header>
  <nav>
    {% for entry in sitemap %}<a href="/{{ entry.output }}">{{ entry.output }}</a>
    {% endfor %}
  </nav>
</header>
"#;

const MAIN_CSS: &str = r#"body {
  margin: 0;
  font-family: system-ui, sans-serif;
}

.icon {
  width: 1em;
  height: 1em;
  fill: currentColor;
}
"#;

const MAIN_JS: &str = r#"import "./widget.css";

document.documentElement.classList.add("js");
"#;

const WIDGET_CSS: &str = r#".js main {
  max-width: 40rem;
  margin: 0 auto;
}
"#;

const CHECK_ICON: &str = r#"<svg data-icon="check" viewBox="0 0 18 18" xmlns="http://www.w3.org/2000/svg"><path d="M2 9l5 5 9-10"/></svg>
"#;
