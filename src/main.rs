//! Kiln - command-line entry point for the asset pipeline

use std::process::ExitCode;

use kiln::cli;

fn main() -> ExitCode {
    cli::run()
}
