// src/processing/parallel.rs
use std::collections::BTreeMap;
use std::thread;

use flume::{Receiver, Sender};
use tracing::debug;

use super::engine::{BandSet, OpenBands, OutputSet};
use super::grid::{BlockSize, Window};
use super::kernel::{IndexParams, IndexResult, MaskStats};
use crate::error::{Error, Result};
use crate::io::{BandOpener, RasterWriter};

type BlockMessage = Result<(usize, Window, IndexResult)>;

/// Block-streaming with `workers` reader/compute threads.
///
/// Every worker opens its own readers and pulls windows from a shared queue.
/// Results come back over a bounded channel and are written by the calling
/// thread in row-major order, so the outputs match [`super::engine::run_blocks`]
/// exactly. At most `2 * workers` computed blocks wait in the channel; blocks
/// finished ahead of a slow predecessor wait in the reorder buffer.
pub fn run_pipelined<O, W>(
    bands: &BandSet<O>,
    params: &IndexParams,
    block_size: Option<BlockSize>,
    workers: usize,
    outputs: &mut OutputSet<W>,
) -> Result<(MaskStats, usize)>
where
    O: BandOpener,
    W: RasterWriter,
{
    let workers = workers.max(1);

    // Shapes, nodata and the grid are settled once, up front
    let (grid, total) = {
        let open = OpenBands::open(bands)?;
        let grid = open.grid(block_size);
        let total = grid.len();
        (grid, total)
    };
    debug!(blocks = total, workers, block_size = ?grid.block_size(), "pipelined streaming");

    let (job_tx, job_rx) = flume::unbounded::<(usize, Window)>();
    for job in grid.windows().enumerate() {
        job_tx
            .send(job)
            .map_err(|_| Error::Config("block queue closed early".to_string()))?;
    }
    drop(job_tx);

    let (result_tx, result_rx) = flume::bounded::<BlockMessage>(workers * 2);

    thread::scope(|scope| {
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || worker(worker_id, bands, params, job_rx, result_tx));
        }
        drop(job_rx);
        drop(result_tx);

        write_in_order(result_rx, total, outputs)
    })
}

fn worker<O: BandOpener>(
    worker_id: usize,
    bands: &BandSet<O>,
    params: &IndexParams,
    jobs: Receiver<(usize, Window)>,
    results: Sender<BlockMessage>,
) {
    let open = match OpenBands::open(bands) {
        Ok(open) => open,
        Err(err) => {
            let _ = results.send(Err(err));
            return;
        }
    };

    for (seq, window) in jobs.iter() {
        let message = open.compute(window, params).map(|result| (seq, window, result));
        let failed = message.is_err();
        // The writer hung up after an error elsewhere
        if results.send(message).is_err() || failed {
            break;
        }
    }
    debug!(worker_id, "worker finished");
}

fn write_in_order<W: RasterWriter>(
    results: Receiver<BlockMessage>,
    total: usize,
    outputs: &mut OutputSet<W>,
) -> Result<(MaskStats, usize)> {
    let mut pending = BTreeMap::new();
    let mut next = 0;
    let mut stats = MaskStats::default();

    for message in results.iter() {
        let (seq, window, result) = message?;
        pending.insert(seq, (window, result));

        while let Some((window, result)) = pending.remove(&next) {
            stats += result.stats;
            outputs.commit(window, result)?;
            next += 1;
        }
    }

    if next != total {
        return Err(Error::Config(format!(
            "pipeline stopped after {next} of {total} blocks"
        )));
    }
    Ok((stats, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemoryBand, MemoryRaster};
    use crate::processing::engine::run_blocks;

    #[test]
    fn pipeline_matches_sequential_streaming() {
        let (w, h) = (23, 17);
        let b1: Vec<f32> = (0..w * h).map(|i| ((i * 31) % 97) as f32 / 97.0).collect();
        let b2: Vec<f32> = (0..w * h).map(|i| ((i * 17) % 89) as f32 / 89.0).collect();
        let set = BandSet {
            band1: MemoryBand::new("b1", (w, h), b1),
            band2: MemoryBand::new("b2", (w, h), b2),
            aux: None,
        };
        let params = IndexParams {
            emit_normalized: true,
            ..IndexParams::default()
        };
        let block = Some(BlockSize::new(5, 4));

        let mut sequential = OutputSet {
            raw: MemoryRaster::new((w, h)),
            normalized: Some(MemoryRaster::new((w, h))),
            thresholded: None,
        };
        let (seq_stats, _) = run_blocks(&set, &params, block, &mut sequential).unwrap();

        let mut pipelined = OutputSet {
            raw: MemoryRaster::new((w, h)),
            normalized: Some(MemoryRaster::new((w, h))),
            thresholded: None,
        };
        let (par_stats, blocks) = run_pipelined(&set, &params, block, 4, &mut pipelined).unwrap();

        assert_eq!(blocks, 5 * 5);
        assert_eq!(seq_stats, par_stats);
        assert_eq!(sequential.raw.bits(), pipelined.raw.bits());
        assert_eq!(
            sequential.normalized.unwrap().bits(),
            pipelined.normalized.unwrap().bits()
        );
    }

    #[test]
    fn worker_error_aborts_run() {
        let set = BandSet {
            band1: MemoryBand::new("b1", (4, 4), vec![0.2; 16]),
            band2: MemoryBand::new("b2", (4, 4), vec![0.4; 16]),
            aux: None,
        };
        // Output smaller than the inputs: the first write fails
        let mut outputs = OutputSet::raw_only(MemoryRaster::new((2, 2)));
        let err = run_pipelined(&set, &IndexParams::default(), Some(BlockSize::new(2, 2)), 3, &mut outputs)
            .unwrap_err();
        assert!(matches!(err, Error::WindowOutOfBounds { .. }));
    }
}
