use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving, reading, computing or writing an index.
///
/// Numeric edge cases (zero denominators, out-of-range reflectance, threshold
/// rejection) never surface here; they are masked in the output instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot resolve {role} band: {reason}")]
    Resolution { role: String, reason: String },

    #[error("input raster not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("band shape mismatch: {first} is {}x{} but {second} is {}x{}", first_size.0, first_size.1, second_size.0, second_size.1)]
    ShapeMismatch {
        first: String,
        first_size: (usize, usize),
        second: String,
        second_size: (usize, usize),
    },

    #[error("band {index} requested from {} which has {count} band(s)", path.display())]
    BandIndex {
        path: PathBuf,
        index: usize,
        count: usize,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: gdal::errors::GdalError,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: gdal::errors::GdalError,
    },

    #[error("window {}x{} at ({}, {}) exceeds raster of {}x{}", size.0, size.1, offset.0, offset.1, raster.0, raster.1)]
    WindowOutOfBounds {
        offset: (usize, usize),
        size: (usize, usize),
        raster: (usize, usize),
    },

    #[error("invalid index parameters: {0}")]
    InvalidParams(String),

    #[error("{index} has no threshold predicate configured")]
    MissingThreshold { index: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
