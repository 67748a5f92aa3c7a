// src/io/reader.rs
use std::path::{Path, PathBuf};

use gdal::raster::Buffer;
use gdal::Dataset;

use super::{check_window, BandOpener, BandReader, RasterProfile};
use crate::error::{Error, Result};
use crate::loader::BandSource;
use crate::processing::grid::Window;

/// One band of a GDAL dataset, opened read-only.
pub struct GdalBand {
    path: PathBuf,
    dataset: Dataset,
    index: usize,
    size: (usize, usize),
    block_size: (usize, usize),
    nodata: Option<f64>,
    geo_transform: Option<[f64; 6]>,
}

impl GdalBand {
    /// Open band `index` (1-based) of the raster at `path`.
    pub fn open(path: &Path, index: usize) -> Result<Self> {
        let read_err = |source| Error::Read {
            path: path.to_path_buf(),
            source,
        };

        let dataset = Dataset::open(path).map_err(read_err)?;
        let count = dataset.raster_count() as usize;
        if index == 0 || index > count {
            return Err(Error::BandIndex {
                path: path.to_path_buf(),
                index,
                count,
            });
        }

        let (size, block_size, nodata) = {
            let band = dataset.rasterband(index).map_err(read_err)?;
            (band.size(), band.block_size(), band.no_data_value())
        };
        let geo_transform = dataset.geo_transform().ok();

        Ok(Self {
            path: path.to_path_buf(),
            dataset,
            index,
            size,
            block_size,
            nodata,
            geo_transform,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn profile(&self) -> Result<RasterProfile> {
        RasterProfile::from_dataset(&self.dataset, self.index).map_err(|source| Error::Read {
            path: self.path.clone(),
            source,
        })
    }
}

impl BandReader for GdalBand {
    fn size(&self) -> (usize, usize) {
        self.size
    }

    fn block_size(&self) -> (usize, usize) {
        self.block_size
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn geo_transform(&self) -> Option<[f64; 6]> {
        self.geo_transform
    }

    fn read_window(&self, window: Window) -> Result<Buffer<f32>> {
        check_window(window, self.size)?;
        let read_err = |source| Error::Read {
            path: self.path.clone(),
            source,
        };

        let band = self.dataset.rasterband(self.index).map_err(read_err)?;
        band.read_as::<f32>(
            (window.x as isize, window.y as isize),
            window.size(),
            window.size(),
            None,
        )
        .map_err(read_err)
    }

    fn describe(&self) -> String {
        format!("{} (band {})", self.path.display(), self.index)
    }
}

impl BandOpener for BandSource {
    type Reader = GdalBand;

    fn open(&self) -> Result<GdalBand> {
        GdalBand::open(&self.path, self.band_index)
    }
}
