// src/lib.rs - Library interface for leaf area and herbivory measurement

pub mod config;
pub mod drawing;
pub mod errors;
pub mod flood_fill;
pub mod homography;
pub mod image_io;
pub mod labeling;
pub mod layered;
pub mod output;
pub mod pipeline;
pub mod regions;
pub mod scale;
pub mod surface;
pub mod threshold;
pub mod union_find;
pub mod worker;

// Re-export commonly used types and functions
pub use errors::{HerbivoryError, Result};
pub use config::Config;
pub use image_io::{InputImage, load_image, save_image};
pub use pipeline::{
    measure_leaf,
    measure_prepared,
    prepare_image,
    MeasurementReport,
    MeasurementRequest,
    PreparedImage,
    ScaleStatus,
};

// Re-export the measurement core
pub use surface::{PixelSurface, RawRgbaSurface};
pub use threshold::{apply_threshold, otsu_threshold, LumaHistogram};
pub use layered::LayeredSurface;
pub use union_find::DisjointSet;
pub use labeling::{label_connected_components, ComponentInfo, Label, Point, Size, OUTSIDE_LABEL};
pub use regions::{classify_regions, AreaOutcome, HoleRegion, LeafMeasurement, RegionSelection};
pub use flood_fill::{flood_fill, OverlaySink, Span, SpanSink};

// Re-export scale handling
pub use homography::{correct_perspective, Homography, OrientedQuadrilateral, PointF};
pub use scale::{detect_scale_marks, locate_mark_near, pixels_to_units2, ScaleDetection};

// Re-export background recomputation
pub use worker::{Generation, GenerationCounter, LatestResult, MeasurementWorker};
