//! Static stage: copy static folders into the output, re-encoding raster
//! images when configured.
//!
//! Each root `public/` lands at `<static_out>/public/...`. Full builds copy
//! everything; watch passes only touch the changed paths, removing outputs
//! whose source was deleted.

use crate::build::{BuildContext, BuildError, BuildMode, ChangeSet, StageKind, StageOutput};
use crate::config::ImagesConfig;
use crate::toolchain::image::{format_extension, is_raster};
use crate::toolchain::Toolchain;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// One file to copy or encode.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CopyJob {
    source: PathBuf,
    dest: PathBuf,
    encode: bool,
}

/// Destination of `source` below `root`, before any re-encoding.
fn destination(static_out: &Path, root: &Path, source: &Path) -> Option<PathBuf> {
    let name = root.file_name()?;
    let relative = source.strip_prefix(root).ok()?;
    Some(static_out.join(name).join(relative))
}

fn plan_job(static_out: &Path, root: &Path, source: &Path, images: Option<&ImagesConfig>) -> Option<CopyJob> {
    let dest = destination(static_out, root, source)?;
    match images {
        Some(images) if is_raster(source) => Some(CopyJob {
            source: source.to_path_buf(),
            dest: dest.with_extension(format_extension(images.format)),
            encode: true,
        }),
        _ => Some(CopyJob { source: source.to_path_buf(), dest, encode: false }),
    }
}

async fn execute(job: &CopyJob, tools: &Toolchain, images: Option<&ImagesConfig>) -> Result<PathBuf, BuildError> {
    if let Some(parent) = job.dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| BuildError::io(parent, e))?;
    }
    match images {
        Some(options) if job.encode => {
            tools.images.encode(&job.source, &job.dest, options).await.map_err(|e| {
                BuildError::compilation(StageKind::Static, &job.source, e.to_string())
            })?;
        }
        _ => {
            tokio::fs::copy(&job.source, &job.dest).await.map_err(|e| BuildError::io(&job.source, e))?;
        }
    }
    Ok(job.dest.clone())
}

/// Remove every output that `source` may have produced.
async fn remove_outputs(static_out: &Path, root: &Path, source: &Path) -> Result<(), BuildError> {
    let Some(dest) = destination(static_out, root, source) else {
        return Ok(());
    };
    let mut candidates = vec![dest.clone()];
    if is_raster(source) {
        candidates.push(dest.with_extension("png"));
        candidates.push(dest.with_extension("jpg"));
    }
    for candidate in candidates {
        match tokio::fs::remove_file(&candidate).await {
            Ok(()) => debug!("removed {}", candidate.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BuildError::io(&candidate, e)),
        }
    }
    Ok(())
}

/// Run the static stage.
///
/// A configured root that does not exist fails the stage with
/// [`BuildError::ResourceMissing`].
pub async fn run(
    ctx: &BuildContext,
    tools: &Toolchain,
    changes: &ChangeSet,
    mode: BuildMode,
) -> Result<StageOutput, BuildError> {
    for root in &ctx.static_roots {
        if !root.is_dir() {
            return Err(BuildError::ResourceMissing(root.clone()));
        }
    }

    let images = ctx.images.as_ref();
    let mut jobs = Vec::new();

    match mode {
        BuildMode::Full => {
            for root in &ctx.static_roots {
                for entry in WalkDir::new(root).follow_links(false).into_iter().filter_map(Result::ok) {
                    if entry.file_type().is_file() {
                        jobs.extend(plan_job(&ctx.static_out, root, entry.path(), images));
                    }
                }
            }
        }
        BuildMode::Watch => {
            for path in changes.paths() {
                let Some(root) = ctx.static_roots.iter().find(|r| path.starts_with(r) && path != *r) else {
                    continue;
                };
                if path.is_file() {
                    jobs.extend(plan_job(&ctx.static_out, root, path, images));
                } else if !path.exists() {
                    remove_outputs(&ctx.static_out, root, path).await?;
                }
            }
        }
    }

    let results = join_all(jobs.iter().map(|job| execute(job, tools, images))).await;
    let mut output = StageOutput::default();
    for result in results {
        output.outputs.push(result?);
    }
    debug!("static stage wrote {} file(s)", output.outputs.len());
    Ok(output)
}
