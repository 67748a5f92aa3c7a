// src/io/mod.rs
pub mod memory;
pub mod profile;
pub mod reader;
pub mod writer;

use gdal::raster::Buffer;

use crate::error::Result;
use crate::processing::grid::Window;

pub use memory::{MemoryBand, MemoryRaster};
pub use profile::RasterProfile;
pub use reader::GdalBand;
pub use writer::{companion_path, GdalWriter};

/// Read access to one band of a raster.
pub trait BandReader {
    /// Raster size as `(width, height)`.
    fn size(&self) -> (usize, usize);

    /// Native block size as reported by the source; `(0, 0)` when unknown.
    fn block_size(&self) -> (usize, usize);

    fn nodata(&self) -> Option<f64>;

    fn geo_transform(&self) -> Option<[f64; 6]>;

    /// Read a sub-window as f32, whatever the source data type.
    fn read_window(&self, window: Window) -> Result<Buffer<f32>>;

    /// Human readable name used in error messages.
    fn describe(&self) -> String;
}

/// Opens a fresh reader for a band. The pipeline gives every worker its own
/// reader, so implementations must be shareable across threads while the
/// readers they produce need not be.
pub trait BandOpener: Send + Sync {
    type Reader: BandReader;

    fn open(&self) -> Result<Self::Reader>;
}

/// Destination for one single-band output raster.
pub trait RasterWriter {
    fn write_window(&mut self, window: Window, data: &mut Buffer<f32>) -> Result<()>;

    /// Flush and close the output.
    fn finish(self) -> Result<()>
    where
        Self: Sized;
}

pub(crate) fn check_window(window: Window, raster: (usize, usize)) -> Result<()> {
    if window.x + window.width > raster.0 || window.y + window.height > raster.1 {
        return Err(crate::error::Error::WindowOutOfBounds {
            offset: window.offset(),
            size: window.size(),
            raster,
        });
    }
    Ok(())
}
