//! Default image codec backed by the `image` crate.

use super::{ImageCodec, ToolError};
use crate::config::{ImageFormat, ImagesConfig};
use futures::future::BoxFuture;
use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Decodes a raster image, optionally downscales it, and re-encodes it.
#[derive(Debug, Default, Clone)]
pub struct RasterCodec;

impl RasterCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Extension written for a target format.
pub fn format_extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpg",
    }
}

/// Whether `path` is a raster image the codec can re-encode.
pub fn is_raster(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| matches!(e.as_str(), "png" | "jpg" | "jpeg"))
}

/// Downscale to `max_width`, preserving aspect ratio. Narrower images are
/// returned unchanged.
fn fit_width(image: DynamicImage, max_width: Option<u32>) -> DynamicImage {
    match max_width {
        Some(max) if max > 0 && image.width() > max => {
            let height = (image.height() as u64 * max as u64 / image.width() as u64).max(1) as u32;
            image.resize_exact(max, height, FilterType::Lanczos3)
        }
        _ => image,
    }
}

fn encode_sync(source: &Path, dest: &Path, options: &ImagesConfig) -> Result<(), ToolError> {
    let codec_err = |e: image::ImageError| ToolError::Codec {
        path: source.to_path_buf(),
        message: e.to_string(),
    };

    let image = fit_width(image::open(source).map_err(codec_err)?, options.max_width);

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ToolError::io(parent, e))?;
    }
    let file = File::create(dest).map_err(|e| ToolError::io(dest, e))?;
    let mut writer = BufWriter::new(file);

    match options.format {
        ImageFormat::Png => image.write_to(&mut writer, ImageOutputFormat::Png),
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut writer, ImageOutputFormat::Jpeg(options.quality.clamp(1, 100))),
    }
    .map_err(codec_err)
}

impl ImageCodec for RasterCodec {
    fn encode<'a>(
        &'a self,
        source: &'a Path,
        dest: &'a Path,
        options: &'a ImagesConfig,
    ) -> BoxFuture<'a, Result<(), ToolError>> {
        let (source, dest, options): (PathBuf, PathBuf, ImagesConfig) =
            (source.to_path_buf(), dest.to_path_buf(), options.clone());
        Box::pin(async move {
            let path = source.clone();
            tokio::task::spawn_blocking(move || encode_sync(&source, &dest, &options))
                .await
                .map_err(|e| ToolError::Codec { path, message: e.to_string() })?
        })
    }
}
