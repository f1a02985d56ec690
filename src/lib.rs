//! Kiln - incremental asset pipeline for static front-end projects
//!
//! This library provides functionality to:
//! - Render markup pages, compile stylesheets and bundle scripts in one pass
//! - Rebuild only the stages affected by a set of file changes
//! - Merge style fragments into a single assembled stylesheet
//! - Extract inline icons into a deduplicated SVG sprite

pub mod build;
pub mod cli;
pub mod config;
pub mod include;
pub mod init;
pub mod sprite;
pub mod toolchain;
pub mod watch;
