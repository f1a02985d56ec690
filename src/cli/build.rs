//! Command implementations (build, watch, dev, init)

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context;

use super::{load_project, LoadedProject, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::progress::{ConsoleReporter, JsonReporter, Reporter};
use crate::build::{resolve_path, BuildConfig, BuildHooks, BuildMode, PipelineOrchestrator};
use crate::config::loader::CliOverrides;
use crate::toolchain::DevServer;
use crate::watch::{watch, WatchError, WatchOptions};

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn console(debug: bool) -> ConsoleReporter {
    let reporter = ConsoleReporter::new().with_verbose(debug);
    if std::env::var_os("NO_COLOR").is_some() {
        reporter.with_colors(false)
    } else {
        reporter
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the process is killed.
        std::future::pending::<()>().await;
    }
}

/// Run the build command
pub fn run_build(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    debug: bool,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let LoadedProject { config, root } = load_project(config_path, overrides)?;
    let reporter: Arc<dyn Reporter> =
        if json { Arc::new(JsonReporter::new()) } else { Arc::new(console(debug)) };

    let build = BuildConfig::from_config(&config, root).with_debug(debug);
    let orchestrator = PipelineOrchestrator::new(build).with_reporter(reporter);

    let result = runtime()?.block_on(orchestrator.run_pass(BuildMode::Full));
    // Failures were already reported through the reporter.
    Ok(ExitCode::from(if result.is_ok() { EXIT_SUCCESS } else { EXIT_ERROR }))
}

fn watch_exit(result: Result<(), WatchError>) -> anyhow::Result<ExitCode> {
    match result {
        Ok(()) => Ok(ExitCode::from(EXIT_SUCCESS)),
        // Reported by the orchestrator before the session gave up.
        Err(WatchError::Build(_)) => Ok(ExitCode::from(EXIT_ERROR)),
        Err(e) => Err(e.into()),
    }
}

/// Run the watch command
pub fn run_watch(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    debug: bool,
) -> anyhow::Result<ExitCode> {
    let LoadedProject { config, root } = load_project(config_path, overrides)?;
    let reporter = Arc::new(console(debug).with_clear_screen(config.watch.clear_screen));

    let build = BuildConfig::from_config(&config, root).with_debug(debug);
    let orchestrator = PipelineOrchestrator::new(build).with_reporter(reporter);
    let options = WatchOptions::from_config(&config.watch);

    eprintln!("Press Ctrl+C to stop");
    let result = runtime()?.block_on(watch(&orchestrator, options, ctrl_c()));
    watch_exit(result)
}

/// Run the dev command: watch plus the live-reload server
pub fn run_dev(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    debug: bool,
) -> anyhow::Result<ExitCode> {
    let LoadedProject { config, root } = load_project(config_path, overrides)?;
    let out_dir = resolve_path(&root, &config.project.out);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let rt = runtime()?;
    rt.block_on(async {
        let server = DevServer::new(&out_dir, config.dev.host.clone(), config.dev.port)
            .start()
            .await
            .context("failed to start dev server")?;
        eprintln!("Serving {} at http://{}", out_dir.display(), server.local_addr());
        eprintln!("Press Ctrl+C to stop");

        let version = server.version();
        let hooks = BuildHooks::new().on_build_complete(move |_| {
            version.fetch_add(1, Ordering::SeqCst);
        });

        let reporter = Arc::new(console(debug).with_clear_screen(config.watch.clear_screen));
        let build = BuildConfig::from_config(&config, root).with_debug(debug).with_hooks(hooks);
        let orchestrator = PipelineOrchestrator::new(build).with_reporter(reporter);
        let options = WatchOptions::from_config(&config.watch);

        let result = watch(&orchestrator, options, ctrl_c()).await;
        server.stop().await;
        watch_exit(result)
    })
}

/// Run the init command
pub fn run_init(path: Option<&Path>, name: Option<&str>) -> ExitCode {
    use crate::init::{init_project, InitError, SCAFFOLD_FILES};

    let project_path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    let project_name = name
        .map(|n| n.to_string())
        .or_else(|| project_path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "my-site".to_string());

    match init_project(&project_path, &project_name) {
        Ok(()) => {
            println!("Created kiln project '{}' at {}", project_name, project_path.display());
            println!();
            for file in SCAFFOLD_FILES {
                println!("  {}", file);
            }
            println!();
            println!("Next steps:");
            println!("  cd {}", project_path.display());
            println!("  kiln dev");
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(InitError::DirectoryNotEmpty(dir)) => {
            eprintln!("Error: Directory '{}' already exists and is not empty", dir.display());
            eprintln!("Use an empty directory or specify a different path");
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
