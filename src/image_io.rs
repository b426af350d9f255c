use std::path::{Path, PathBuf};
use std::fs;
use image::{imageops, ImageFormat, RgbaImage};
use log::debug;

use crate::errors::{HerbivoryError, Result};

const SUPPORTED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A photo with the path it was loaded from
pub struct InputImage {
    pub image: RgbaImage,
    pub path: PathBuf,
    pub filename: String,
}

/// Whether the path has an extension we can decode
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Get all PNG and JPEG files from a directory (recursively), sorted
pub fn get_image_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.exists() {
        return Err(HerbivoryError::InvalidPath(dir_path.to_path_buf()));
    }

    if !dir_path.is_dir() {
        return Err(HerbivoryError::Config(format!(
            "{} is not a directory", dir_path.display()
        )));
    }

    let mut image_files = Vec::new();
    find_image_files_recursive(dir_path, &mut image_files)?;
    image_files.sort();

    Ok(image_files)
}

fn find_image_files_recursive(dir_path: &Path, result: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();

        if path.is_dir() {
            find_image_files_recursive(&path, result)?;
        } else if path.is_file() && is_supported_image(&path) {
            result.push(path);
        }
    }

    Ok(())
}

/// Load a photo as RGBA
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<InputImage> {
    let path = path.as_ref();

    let filename = path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| HerbivoryError::InvalidPath(path.to_path_buf()))?
        .to_string();

    let image = image::open(path)?.to_rgba8();
    if image.width() == 0 || image.height() == 0 {
        return Err(HerbivoryError::InvalidDimensions {
            width: image.width(),
            height: image.height(),
        });
    }

    Ok(InputImage {
        image,
        path: path.to_path_buf(),
        filename,
    })
}

/// Save an RGBA image as PNG
pub fn save_image<P: AsRef<Path>>(image: &RgbaImage, path: P) -> Result<()> {
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Downscale so neither side exceeds `max_dimension`, keeping the aspect
/// ratio. Smaller images are returned unchanged.
pub fn resize_to_fit(image: &RgbaImage, max_dimension: Option<u32>) -> RgbaImage {
    let (width, height) = image.dimensions();
    let max_dimension = match max_dimension {
        Some(max) if max > 0 && (width > max || height > max) => max,
        _ => return image.clone(),
    };

    let scale = max_dimension as f64 / width.max(height) as f64;
    let new_width = ((width as f64 * scale).round() as u32).clamp(1, max_dimension);
    let new_height = ((height as f64 * scale).round() as u32).clamp(1, max_dimension);

    debug!("Resizing {}x{} to {}x{}", width, height, new_width, new_height);
    imageops::resize(image, new_width, new_height, imageops::FilterType::Triangle)
}
