use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::errors::{HerbivoryError, Result};

/// Configuration for a measurement run
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_input_path")]
    pub input_path: String,

    #[serde(default = "default_output_base_dir")]
    pub output_base_dir: String,

    /// Physical side length of the printed scale square
    #[serde(default = "default_scale_mark_length")]
    pub scale_mark_length: f64,

    #[serde(default = "default_unit")]
    pub unit: String,

    /// Leaf photographed on a dark surface: foreground is brighter than the threshold
    #[serde(default)]
    pub use_black_background: bool,

    /// Manual threshold in [0, 1]. Otsu's method is used when unset.
    #[serde(default)]
    pub threshold: Option<f32>,

    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: Option<u32>,

    #[serde(default = "default_max_corrected_size")]
    pub max_corrected_size: u32,

    #[serde(default = "default_detect_scale")]
    pub detect_scale: bool,

    #[serde(default = "default_scale_mark_min_pixels")]
    pub scale_mark_min_pixels: u64,

    #[serde(default = "default_scale_mark_max_pixels")]
    pub scale_mark_max_pixels: u64,

    #[serde(default = "default_save_visualization")]
    pub save_visualization: bool,

    #[serde(default = "default_hole_fill_color_rgb")]
    pub hole_fill_color_rgb: [u8; 3],

    #[serde(default = "default_drawing_color_rgb")]
    pub drawing_color_rgb: [u8; 3],

    #[serde(default = "default_marker_color_rgb")]
    pub marker_color_rgb: [u8; 3],

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,
}

fn default_input_path() -> String {
    "./input".to_string()
}

fn default_output_base_dir() -> String {
    "./output".to_string()
}

fn default_scale_mark_length() -> f64 {
    10.0
}

fn default_unit() -> String {
    "cm".to_string()
}

fn default_max_image_dimension() -> Option<u32> {
    Some(1200)
}

fn default_max_corrected_size() -> u32 {
    1200
}

fn default_detect_scale() -> bool {
    true
}

// Anything smaller is almost always sensor noise or dust
fn default_scale_mark_min_pixels() -> u64 {
    19
}

fn default_scale_mark_max_pixels() -> u64 {
    50_000
}

fn default_save_visualization() -> bool {
    true
}

fn default_hole_fill_color_rgb() -> [u8; 3] {
    [144, 238, 144] // Light green
}

fn default_drawing_color_rgb() -> [u8; 3] {
    [0, 0, 255]
}

fn default_marker_color_rgb() -> [u8; 3] {
    [139, 0, 0] // Dark red
}

fn default_parallel() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            output_base_dir: default_output_base_dir(),
            scale_mark_length: default_scale_mark_length(),
            unit: default_unit(),
            use_black_background: false,
            threshold: None,
            max_image_dimension: default_max_image_dimension(),
            max_corrected_size: default_max_corrected_size(),
            detect_scale: default_detect_scale(),
            scale_mark_min_pixels: default_scale_mark_min_pixels(),
            scale_mark_max_pixels: default_scale_mark_max_pixels(),
            save_visualization: default_save_visualization(),
            hole_fill_color_rgb: default_hole_fill_color_rgb(),
            drawing_color_rgb: default_drawing_color_rgb(),
            marker_color_rgb: default_marker_color_rgb(),
            use_parallel: default_parallel(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            HerbivoryError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| HerbivoryError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(self.scale_mark_length > 0.0) || !self.scale_mark_length.is_finite() {
            return Err(HerbivoryError::Config(
                "scale_mark_length must be a positive number".to_string(),
            ));
        }

        if self.unit.trim().is_empty() {
            return Err(HerbivoryError::Config("unit must not be empty".to_string()));
        }

        if let Some(threshold) = self.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(HerbivoryError::Config(
                    "threshold must be between 0.0 and 1.0".to_string(),
                ));
            }
        }

        if self.max_image_dimension == Some(0) {
            return Err(HerbivoryError::Config(
                "max_image_dimension must be > 0 when set".to_string(),
            ));
        }

        if self.max_corrected_size == 0 {
            return Err(HerbivoryError::Config(
                "max_corrected_size must be > 0".to_string(),
            ));
        }

        if self.scale_mark_min_pixels == 0 || self.scale_mark_min_pixels > self.scale_mark_max_pixels {
            return Err(HerbivoryError::Config(
                "scale_mark_min_pixels must be > 0 and <= scale_mark_max_pixels".to_string(),
            ));
        }

        Ok(())
    }

    /// Create the output directory tree used by the CLI
    pub fn ensure_output_dirs(&self) -> Result<PathBuf> {
        let base_dir = PathBuf::from(&self.output_base_dir);
        let visualization_dir = base_dir.join("visualizations");

        fs::create_dir_all(&visualization_dir).map_err(|e| {
            HerbivoryError::Io(io::Error::new(
                ErrorKind::Other,
                format!("Failed to create output directory {}: {}", visualization_dir.display(), e),
            ))
        })?;

        Ok(base_dir)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            HerbivoryError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }
}
