// src/processing/processor.rs
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::engine::{run_blocks, run_whole, BandSet, OutputSet};
use super::grid::BlockSize;
use super::indices::IndexSpec;
use super::kernel::{IndexParams, MaskStats};
use super::parallel::run_pipelined;
use crate::error::{Error, Result};
use crate::io::{companion_path, BandOpener, GdalWriter, RasterProfile, RasterWriter};
use crate::loader::{self, BandTable, SourceRequest};

pub const NORMALIZED_SUFFIX: &str = "minmax";
pub const THRESHOLDED_SUFFIX: &str = "thresh";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Load whole bands into memory
    Whole,
    /// Stream the raster block by block
    #[default]
    Blocks,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Raw index only
    #[default]
    Raw,
    /// Raw index plus a (index + 1) / 2 companion
    Normalized,
    /// Raw index plus a threshold-masked companion
    Thresholded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    pub mode: Mode,
    /// Overrides the native block size in block mode.
    pub block_size: Option<BlockSize>,
    /// Block workers; 1 streams on the calling thread, 0 uses every CPU.
    pub workers: usize,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Blocks,
            block_size: None,
            workers: 1,
        }
    }
}

impl ProcessingOptions {
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }
}

/// One index computation: which index, from where, to where.
#[derive(Debug, Clone)]
pub struct IndexJob {
    pub spec: IndexSpec,
    pub sources: SourceRequest,
    pub output: PathBuf,
    pub variant: Variant,
}

impl IndexJob {
    /// Index parameters adjusted to the requested variant.
    pub fn effective_params(&self) -> Result<IndexParams> {
        let mut params = self.spec.params.clone();
        match self.variant {
            Variant::Raw => params.threshold = None,
            Variant::Normalized => {
                params.emit_normalized = true;
                params.threshold = None;
            }
            Variant::Thresholded => {
                if params.threshold.is_none() {
                    return Err(Error::MissingThreshold {
                        index: self.spec.name().to_string(),
                    });
                }
            }
        }
        Ok(params)
    }

    /// Primary output followed by the companions `params` produce.
    pub fn output_paths(&self, params: &IndexParams) -> OutputSet<PathBuf> {
        OutputSet {
            raw: self.output.clone(),
            normalized: params
                .emit_normalized
                .then(|| companion_path(&self.output, NORMALIZED_SUFFIX)),
            thresholded: params
                .threshold
                .is_some()
                .then(|| companion_path(&self.output, THRESHOLDED_SUFFIX)),
        }
    }
}

impl OutputSet<PathBuf> {
    pub fn paths(&self) -> Vec<PathBuf> {
        [Some(&self.raw), self.normalized.as_ref(), self.thresholded.as_ref()]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub index: String,
    pub outputs: Vec<PathBuf>,
    pub width: usize,
    pub height: usize,
    pub blocks: usize,
    pub stats: MaskStats,
    pub elapsed_ms: u128,
}

/// Resolves sources, creates outputs and drives the engine in the configured
/// mode.
pub struct IndexProcessor {
    options: ProcessingOptions,
    table: BandTable,
}

impl IndexProcessor {
    pub fn new(options: ProcessingOptions) -> Self {
        Self::with_table(options, BandTable::builtin())
    }

    pub fn with_table(options: ProcessingOptions, table: BandTable) -> Self {
        Self { options, table }
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    pub fn process(&self, job: &IndexJob) -> Result<RunSummary> {
        let started = Instant::now();
        let params = job.effective_params()?;
        let with_aux = params.threshold.is_some() && job.spec.aux_role.is_some();
        params.validate(with_aux)?;

        // Every input is checked before the first output is created
        let resolved = loader::resolve(&self.table, &job.spec, &job.sources, with_aux)?;
        let profile = loader::inspect(&resolved)?;
        info!(
            index = job.spec.name(),
            width = profile.width,
            height = profile.height,
            mode = ?self.options.mode,
            output = %job.output.display(),
            "computing index"
        );

        let paths = job.output_paths(&params);
        let mut outputs = create_outputs(&paths, &profile, &params, job.spec.name())?;

        let (stats, blocks) = match self.options.mode {
            Mode::Whole => {
                let loaded = loader::load(&resolved, profile.clone())?;
                self.execute(&loaded.bands, &params, &mut outputs)?
            }
            Mode::Blocks => self.execute(&resolved.band_set(), &params, &mut outputs)?,
        };
        outputs.finish()?;

        let summary = RunSummary {
            index: job.spec.name().to_string(),
            outputs: paths.paths(),
            width: profile.width,
            height: profile.height,
            blocks,
            stats,
            elapsed_ms: started.elapsed().as_millis(),
        };
        info!(
            index = %summary.index,
            blocks = summary.blocks,
            valid = stats.valid,
            nodata = stats.nodata,
            invalid = stats.invalid,
            rejected = stats.rejected,
            elapsed_ms = summary.elapsed_ms,
            "index complete"
        );
        Ok(summary)
    }

    /// Run the engine over already-resolved bands in the configured mode.
    /// Returns the cell counts and the number of windows written.
    pub fn execute<O, W>(
        &self,
        bands: &BandSet<O>,
        params: &IndexParams,
        outputs: &mut OutputSet<W>,
    ) -> Result<(MaskStats, usize)>
    where
        O: BandOpener,
        W: RasterWriter,
    {
        match self.options.mode {
            Mode::Whole => Ok((run_whole(bands, params, outputs)?, 1)),
            Mode::Blocks => match self.options.effective_workers() {
                1 => run_blocks(bands, params, self.options.block_size, outputs),
                workers => run_pipelined(bands, params, self.options.block_size, workers, outputs),
            },
        }
    }
}

fn create_outputs(
    paths: &OutputSet<PathBuf>,
    profile: &RasterProfile,
    params: &IndexParams,
    name: &str,
) -> Result<OutputSet<GdalWriter>> {
    // Each output gets its own copy of the profile
    let create = |path: &Path, description: String| {
        GdalWriter::create(path, &profile.for_output(params.output_nodata), &description)
    };

    Ok(OutputSet {
        raw: create(&paths.raw, name.to_string())?,
        normalized: paths
            .normalized
            .as_deref()
            .map(|path| create(path, format!("{name} (min-max normalized)")))
            .transpose()?,
        thresholded: paths
            .thresholded
            .as_deref()
            .map(|path| create(path, format!("{name} (thresholded)")))
            .transpose()?,
    })
}
