//! Configuration module for the kiln asset pipeline
//!
//! Provides types and parsing for `kiln.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::{default_config, load_config, ConfigError};
pub use schema::*;
