// src/io/memory.rs
use std::sync::Arc;

use gdal::raster::Buffer;

use super::{check_window, BandOpener, BandReader, RasterWriter};
use crate::error::{Error, Result};
use crate::processing::grid::Window;

/// A band held entirely in memory. Cloning shares the pixel data.
#[derive(Debug, Clone)]
pub struct MemoryBand {
    name: String,
    width: usize,
    height: usize,
    data: Arc<Vec<f32>>,
    nodata: Option<f64>,
    block_size: (usize, usize),
    geo_transform: Option<[f64; 6]>,
}

impl MemoryBand {
    /// Panics when `data.len() != width * height`.
    pub fn new(name: impl Into<String>, (width, height): (usize, usize), data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "band data does not match {width}x{height}"
        );
        Self {
            name: name.into(),
            width,
            height,
            data: Arc::new(data),
            nodata: None,
            block_size: (0, 0),
            geo_transform: None,
        }
    }

    /// Takes ownership of the buffer's pixels without copying them.
    pub fn from_buffer(name: impl Into<String>, buffer: Buffer<f32>) -> Self {
        let (shape, data) = buffer.into_shape_and_vec();
        Self::new(name, shape, data)
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn with_block_size(mut self, block_size: (usize, usize)) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_geo_transform(mut self, geo_transform: [f64; 6]) -> Self {
        self.geo_transform = Some(geo_transform);
        self
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

impl BandReader for MemoryBand {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
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
        check_window(window, self.size())?;

        let mut out = Vec::with_capacity(window.width * window.height);
        for row in window.y..window.y + window.height {
            let start = row * self.width + window.x;
            out.extend_from_slice(&self.data[start..start + window.width]);
        }
        Ok(Buffer::new(window.size(), out))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl BandOpener for MemoryBand {
    type Reader = MemoryBand;

    fn open(&self) -> Result<MemoryBand> {
        Ok(self.clone())
    }
}

/// An output raster kept in memory, mostly useful for tests and for comparing
/// processing modes.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRaster {
    width: usize,
    height: usize,
    data: Vec<f32>,
    writes: usize,
}

impl MemoryRaster {
    /// Cells never written hold NaN.
    pub fn new((width, height): (usize, usize)) -> Self {
        Self {
            width,
            height,
            data: vec![f32::NAN; width * height],
            writes: 0,
        }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Number of windows written so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Bit patterns of every cell, for exact comparisons that treat NaN
    /// consistently.
    pub fn bits(&self) -> Vec<u32> {
        self.data.iter().map(|v| v.to_bits()).collect()
    }
}

impl RasterWriter for MemoryRaster {
    fn write_window(&mut self, window: Window, data: &mut Buffer<f32>) -> Result<()> {
        check_window(window, self.size())?;
        if data.shape() != window.size() {
            return Err(Error::WindowOutOfBounds {
                offset: window.offset(),
                size: data.shape(),
                raster: window.size(),
            });
        }

        let values = data.data();
        for (i, row) in (window.y..window.y + window.height).enumerate() {
            let start = row * self.width + window.x;
            self.data[start..start + window.width]
                .copy_from_slice(&values[i * window.width..(i + 1) * window.width]);
        }
        self.writes += 1;
        Ok(())
    }

    fn finish(self) -> Result<()> {
        Ok(())
    }
}
