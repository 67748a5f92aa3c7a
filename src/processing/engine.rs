// src/processing/engine.rs
use gdal::raster::Buffer;
use tracing::debug;

use super::grid::{choose_block_size, BlockGrid, BlockSize, Window};
use super::kernel::{compute_index, BandInputs, IndexParams, IndexResult, MaskStats, NodataValues};
use crate::error::{Error, Result};
use crate::io::{BandOpener, BandReader, RasterWriter};
use crate::loader::check_alignment;

/// The two index operands and the optional threshold band.
#[derive(Debug, Clone)]
pub struct BandSet<T> {
    pub band1: T,
    pub band2: T,
    pub aux: Option<T>,
}

/// One writer per output variant.
pub struct OutputSet<W> {
    pub raw: W,
    pub normalized: Option<W>,
    pub thresholded: Option<W>,
}

impl<W: RasterWriter> OutputSet<W> {
    pub fn raw_only(raw: W) -> Self {
        Self {
            raw,
            normalized: None,
            thresholded: None,
        }
    }

    /// Write every grid of `result` to its writer at `window`.
    pub fn commit(&mut self, window: Window, result: IndexResult) -> Result<()> {
        let IndexResult {
            mut raw,
            normalized,
            thresholded,
            ..
        } = result;

        self.raw.write_window(window, &mut raw)?;
        write_companion(self.normalized.as_mut(), normalized, window, "normalized")?;
        write_companion(self.thresholded.as_mut(), thresholded, window, "thresholded")?;
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        self.raw.finish()?;
        if let Some(writer) = self.normalized {
            writer.finish()?;
        }
        if let Some(writer) = self.thresholded {
            writer.finish()?;
        }
        Ok(())
    }
}

fn write_companion<W: RasterWriter>(
    writer: Option<&mut W>,
    data: Option<Buffer<f32>>,
    window: Window,
    name: &str,
) -> Result<()> {
    match (writer, data) {
        (Some(writer), Some(mut data)) => writer.write_window(window, &mut data),
        (None, None) => Ok(()),
        (Some(_), None) => Err(Error::Config(format!(
            "{name} output requested but the index parameters do not produce it"
        ))),
        // Computed but not wanted
        (None, Some(_)) => Ok(()),
    }
}

/// Readers for one [`BandSet`], opened together.
pub struct OpenBands<R> {
    bands: BandSet<R>,
}

impl<R: BandReader> OpenBands<R> {
    /// Open every band and check they share one shape.
    pub fn open<O>(set: &BandSet<O>) -> Result<Self>
    where
        O: BandOpener<Reader = R>,
    {
        let band1 = set.band1.open()?;
        let band2 = set.band2.open()?;
        check_alignment(&band1, &band2)?;
        let aux = match &set.aux {
            Some(opener) => {
                let aux = opener.open()?;
                check_alignment(&band1, &aux)?;
                Some(aux)
            }
            None => None,
        };
        Ok(Self {
            bands: BandSet { band1, band2, aux },
        })
    }

    pub fn size(&self) -> (usize, usize) {
        self.bands.band1.size()
    }

    pub fn nodata(&self) -> NodataValues {
        NodataValues {
            band1: self.bands.band1.nodata(),
            band2: self.bands.band2.nodata(),
            aux: self.bands.aux.as_ref().and_then(|b| b.nodata()),
        }
    }

    pub fn grid(&self, requested: Option<BlockSize>) -> BlockGrid {
        let native1 = self.bands.band1.block_size();
        let native2 = self.bands.band2.block_size();
        let block = choose_block_size(native1, native2, requested);
        if requested.is_none() && block.as_tuple() != native1 {
            tracing::warn!(
                native1 = ?native1,
                native2 = ?native2,
                fallback = %block,
                "native block sizes unusable, using fallback"
            );
        }
        BlockGrid::new(self.size(), block)
    }

    /// Read `window` from every band and compute the index over it.
    pub fn compute(&self, window: Window, params: &IndexParams) -> Result<IndexResult> {
        let band1 = self.bands.band1.read_window(window)?;
        let band2 = self.bands.band2.read_window(window)?;
        let aux = self
            .bands
            .aux
            .as_ref()
            .map(|b| b.read_window(window))
            .transpose()?;

        compute_index(
            BandInputs {
                band1: &band1,
                band2: &band2,
                aux: aux.as_ref(),
            },
            &self.nodata(),
            params,
        )
    }
}

/// Whole-array mode: read each band entirely, compute once, write once.
pub fn run_whole<O, W>(
    bands: &BandSet<O>,
    params: &IndexParams,
    outputs: &mut OutputSet<W>,
) -> Result<MaskStats>
where
    O: BandOpener,
    W: RasterWriter,
{
    let open = OpenBands::open(bands)?;
    let window = Window::full(open.size());
    let result = open.compute(window, params)?;
    let stats = result.stats;
    outputs.commit(window, result)?;
    Ok(stats)
}

/// Iterator over computed blocks in row-major order. Each `next` reads one
/// window from every band and computes it; nothing carries over between
/// blocks.
pub struct BlockStream<'a, R, I> {
    bands: &'a OpenBands<R>,
    params: &'a IndexParams,
    windows: I,
}

impl<'a, R, I> Iterator for BlockStream<'a, R, I>
where
    R: BandReader,
    I: Iterator<Item = Window>,
{
    type Item = Result<(Window, IndexResult)>;

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.windows.next()?;
        Some(
            self.bands
                .compute(window, self.params)
                .map(|result| (window, result)),
        )
    }
}

impl<R: BandReader> OpenBands<R> {
    pub fn stream<'a>(
        &'a self,
        grid: &'a BlockGrid,
        params: &'a IndexParams,
    ) -> BlockStream<'a, R, impl Iterator<Item = Window> + 'a> {
        BlockStream {
            bands: self,
            params,
            windows: grid.windows(),
        }
    }
}

/// Block-streaming mode on the current thread. Returns the merged cell
/// counts and the number of blocks written.
pub fn run_blocks<O, W>(
    bands: &BandSet<O>,
    params: &IndexParams,
    block_size: Option<BlockSize>,
    outputs: &mut OutputSet<W>,
) -> Result<(MaskStats, usize)>
where
    O: BandOpener,
    W: RasterWriter,
{
    let open = OpenBands::open(bands)?;
    let grid = open.grid(block_size);
    debug!(
        blocks = grid.len(),
        block_size = ?grid.block_size(),
        "streaming blocks"
    );

    let mut stats = MaskStats::default();
    let mut blocks = 0;
    for block in open.stream(&grid, params) {
        let (window, result) = block?;
        stats += result.stats;
        outputs.commit(window, result)?;
        blocks += 1;
    }
    Ok((stats, blocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryBand, MemoryRaster};

    fn bands(width: usize, height: usize) -> BandSet<MemoryBand> {
        let b1 = (0..width * height).map(|i| (i % 7) as f32 * 0.1).collect();
        let b2 = (0..width * height).map(|i| (i % 5) as f32 * 0.1).collect();
        BandSet {
            band1: MemoryBand::new("b1", (width, height), b1),
            band2: MemoryBand::new("b2", (width, height), b2),
            aux: None,
        }
    }

    #[test]
    fn streaming_writes_each_block_once() {
        let set = bands(10, 7);
        let mut outputs = OutputSet::raw_only(MemoryRaster::new((10, 7)));
        let (stats, blocks) = run_blocks(
            &set,
            &IndexParams::default(),
            Some(BlockSize::new(4, 3)),
            &mut outputs,
        )
        .unwrap();

        assert_eq!(blocks, 9);
        assert_eq!(outputs.raw.writes(), 9);
        assert_eq!(stats.total(), 70);
        assert!(outputs.raw.data().iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn fallback_grid_when_native_sizes_disagree() {
        let mut set = bands(6, 6);
        set.band1 = set.band1.with_block_size((6, 1));
        set.band2 = set.band2.with_block_size((2, 2));
        let open = OpenBands::open(&set).unwrap();
        // Fallback 1024x1024 clamps to the raster
        assert_eq!(open.grid(None).block_size(), (6, 6));
    }

    #[test]
    fn missing_companion_writer_is_tolerated() {
        let set = bands(3, 3);
        let params = IndexParams {
            emit_normalized: true,
            ..IndexParams::default()
        };
        let mut outputs = OutputSet::raw_only(MemoryRaster::new((3, 3)));
        assert!(run_whole(&set, &params, &mut outputs).is_ok());
    }

    #[test]
    fn companion_writer_without_data_is_an_error() {
        let set = bands(3, 3);
        let mut outputs = OutputSet {
            raw: MemoryRaster::new((3, 3)),
            normalized: Some(MemoryRaster::new((3, 3))),
            thresholded: None,
        };
        let err = run_whole(&set, &IndexParams::default(), &mut outputs).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn shape_mismatch_detected_on_open() {
        let set = BandSet {
            band1: MemoryBand::new("b1", (4, 4), vec![0.1; 16]),
            band2: MemoryBand::new("b2", (4, 3), vec![0.1; 12]),
            aux: None,
        };
        assert!(matches!(
            OpenBands::open(&set),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
