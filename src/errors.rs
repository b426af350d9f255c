use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Error types for the herbivory measurement engine.
///
/// Only I/O problems and broken input contracts end up here. Images that
/// simply contain nothing to measure are reported through result enums
/// such as `AreaOutcome` and `ScaleDetection`.
#[derive(Error, Debug)]
pub enum HerbivoryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Pixel buffer too small: expected at least {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Measurement worker is no longer running")]
    WorkerDisconnected,
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, HerbivoryError>;
