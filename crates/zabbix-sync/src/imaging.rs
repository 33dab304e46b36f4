//! Sized icon and background generation.
//!
//! Source images live below `<image prefix>/source-icons` and
//! `<image prefix>/source-backgrounds`. Every configured width is rendered
//! to `<image prefix>/<icons|backgrounds>/<sub dirs>/<name>_(<width>).png`,
//! which the image handler then picks up like any exported image.

use std::path::Path;

use image::imageops::FilterType;
use image::ImageFormat;

use crate::assets::{join_path, ImageType};
use crate::cache::CacheRoot;
use crate::config::Settings;
use crate::error::{Result, SyncError};

const SOURCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];

fn is_source_image(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Height keeping the aspect ratio when scaling to `width`.
fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let scaled = u64::from(height) * u64::from(target_width) / u64::from(width.max(1));
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

/// Renders one source image in every size. Returns the written paths.
fn render(
    cache: &CacheRoot,
    source: &str,
    destination_dir: &str,
    base_name: &str,
    sizes: &[u32],
) -> Result<Vec<String>> {
    let source_path = cache.resolve(source)?;
    let image = image::open(&source_path).map_err(|e| SyncError::ImageGeneration {
        path: source_path.clone(),
        message: e.to_string(),
    })?;

    let mut written = Vec::with_capacity(sizes.len());
    for &size in sizes {
        let height = scaled_height(image.width(), image.height(), size);
        let resized = image.resize_exact(size, height, FilterType::Lanczos3);

        let relative = join_path(&[destination_dir, &format!("{}_({}).png", base_name, size)]);
        let target = cache.resolve(&relative)?;
        cache.create_dir_all(destination_dir)?;
        resized
            .save_with_format(&target, ImageFormat::Png)
            .map_err(|e| SyncError::ImageGeneration {
                path: target.clone(),
                message: e.to_string(),
            })?;

        log::info!("Created {}", relative);
        written.push(relative);
    }
    Ok(written)
}

/// Generates sized images of `image_type` from its source directory.
///
/// A source that cannot be decoded is logged and skipped.
pub fn generate_images(
    cache: &CacheRoot,
    settings: &Settings,
    image_type: ImageType,
) -> Result<Vec<String>> {
    let prefix = settings.image_prefix_path.as_str();
    let source_dir = join_path(&[prefix, image_type.source_dir_name()]);
    let sizes = match image_type {
        ImageType::Icon => &settings.icon_sizes,
        ImageType::Background => &settings.background_sizes,
    };
    if sizes.is_empty() {
        log::warn!("No sizes configured for {}", image_type.dir_name());
        return Ok(Vec::new());
    }

    let sources = cache.list_files(&source_dir)?;
    if sources.is_empty() {
        log::info!("No source images in {}", source_dir);
        return Ok(Vec::new());
    }

    let mut created = Vec::new();
    for source in sources {
        if !is_source_image(&source) {
            log::warn!("Skipping {}, not a supported image", source);
            continue;
        }

        let relative = source
            .strip_prefix(source_dir.as_str())
            .unwrap_or(&source)
            .trim_start_matches('/');
        let (sub_dir, file_name) = relative.rsplit_once('/').unwrap_or(("", relative));
        let base_name = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);
        let destination_dir = join_path(&[prefix, image_type.dir_name(), sub_dir]);

        match render(cache, &source, &destination_dir, base_name, sizes) {
            Ok(paths) => created.extend(paths),
            Err(e @ SyncError::ImageGeneration { .. }) => log::error!("{}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}
