//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::config::loader::{find_config, merge_cli_overrides, project_root, CliOverrides};
use crate::config::{default_config, load_config, KilnConfig};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Kiln - incremental asset pipeline for static front-end projects
#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Kiln - build, watch and serve static front-end projects")]
#[command(version)]
pub struct Cli {
    /// Path to kiln.toml (default: search upward from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose diagnostics
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one full build
    Build {
        /// Override output directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Minify output
        #[arg(long)]
        production: bool,

        /// Emit one JSON object per pipeline event
        #[arg(long)]
        json: bool,
    },

    /// Build, then rebuild on file changes
    Watch {
        /// Override output directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Minify output
        #[arg(long)]
        production: bool,
    },

    /// Watch and serve the output with live reload
    Dev {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Override output directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Create a new project
    Init {
        /// Project directory (default: current directory)
        path: Option<PathBuf>,

        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Print version information
    Version,
}

/// Loaded configuration and the directory it applies to.
pub(crate) struct LoadedProject {
    pub config: KilnConfig,
    pub root: PathBuf,
}

/// Load `kiln.toml` from `--config` or by discovery, then apply overrides.
pub(crate) fn load_project(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<LoadedProject, crate::config::ConfigError> {
    let cwd = std::env::current_dir()?;
    let found = config_path.map(Path::to_path_buf).or_else(find_config);

    let (mut config, root) = match found {
        Some(path) => {
            tracing::debug!("using config {}", path.display());
            let config = load_config(Some(&path))?;
            let root = match project_root(&path) {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => cwd.clone(),
            };
            (config, root)
        }
        None => {
            tracing::debug!("no kiln.toml found, using defaults");
            (default_config(), cwd.clone())
        }
    };

    merge_cli_overrides(&mut config, overrides);
    let root = if root.is_absolute() { root } else { cwd.join(root) };
    Ok(LoadedProject { config, root })
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("kiln=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kiln=warn"))
    };
    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse arguments and run the selected command.
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_INVALID_ARGS } else { EXIT_SUCCESS };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };
    init_logging(cli.debug);

    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Build { out, production, json } => {
            let overrides = CliOverrides { out, production: production.then_some(true), port: None };
            build::run_build(config_path, &overrides, cli.debug, json)
        }
        Commands::Watch { out, production } => {
            let overrides = CliOverrides { out, production: production.then_some(true), port: None };
            build::run_watch(config_path, &overrides, cli.debug)
        }
        Commands::Dev { port, out } => {
            let overrides = CliOverrides { out, production: None, port };
            build::run_dev(config_path, &overrides, cli.debug)
        }
        Commands::Init { path, name } => Ok(build::run_init(path.as_deref(), name.as_deref())),
        Commands::Version => {
            println!("kiln {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::from(EXIT_SUCCESS))
        }
    }
}
