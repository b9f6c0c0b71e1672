//! Error types for DEM loading and image export.

use thiserror::Error;

/// Errors surfaced by DEM loading and PNG export.
///
/// The suitability pipeline itself has no error cases; flat terrain and an
/// empty qualifying set are handled as explicit results.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error reading a DEM or writing an export.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// PNG encoding or decoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The raster is not a single band of numeric samples.
    #[error("unsupported DEM data type: {0}")]
    UnsupportedDataType(String),

    /// The raster has zero width or height.
    #[error("DEM has no cells ({width}x{height})")]
    EmptyRaster {
        /// Raster width in pixels.
        width: u32,
        /// Raster height in pixels.
        height: u32,
    },
}

/// Result type for DEM and export operations.
pub type Result<T> = std::result::Result<T, Error>;
