use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::loader::{Sensor, SourceRequest};
use crate::processing::indices::ndsi;
use crate::processing::kernel::{DEFAULT_INVALID_VALUE, DEFAULT_OUTPUT_NODATA};
use crate::processing::{
    BandRole, BlockSize, IndexJob, IndexKind, IndexSpec, Mode, ProcessingOptions, Threshold,
    Variant,
};

#[derive(Parser)]
#[command(name = "ndxi")]
#[command(about = "Normalized-difference spectral index calculator", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output file path
    #[arg(short, long, default_value = "output.tif", global = true)]
    pub output: PathBuf,

    /// Which outputs to write
    #[arg(long, value_enum, default_value_t = Variant::Raw, global = true)]
    pub variant: Variant,

    /// Whole-array or block-streaming processing
    #[arg(long, value_enum, default_value_t = Mode::Blocks, global = true)]
    pub mode: Mode,

    /// Block size as WIDTHxHEIGHT (default: native block size of the inputs)
    #[arg(long, global = true)]
    pub block_size: Option<BlockSize>,

    /// Block workers (0 = one per CPU)
    #[arg(long, default_value_t = 1, global = true)]
    pub workers: usize,

    /// Output no-data value
    #[arg(long, default_value_t = DEFAULT_OUTPUT_NODATA, allow_negative_numbers = true, global = true)]
    pub nodata: f32,

    /// Output value where the index is undefined
    #[arg(long, default_value_t = DEFAULT_INVALID_VALUE, allow_negative_numbers = true, global = true)]
    pub invalid: f32,

    /// Mask cells with reflectance outside [0, 1]
    #[arg(long, global = true)]
    pub reject_out_of_range: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Normalized Difference Vegetation Index: (NIR-RED)/(NIR+RED)
    Ndvi {
        /// Red band
        #[arg(long)]
        red: Option<PathBuf>,

        /// NIR band
        #[arg(long)]
        nir: Option<PathBuf>,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Normalized Difference Water Index: (GREEN-NIR)/(GREEN+NIR)
    Ndwi {
        /// Green band
        #[arg(long)]
        green: Option<PathBuf>,

        /// NIR band
        #[arg(long)]
        nir: Option<PathBuf>,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Normalized Difference Snow Index: (GREEN-SWIR)/(GREEN+SWIR)
    Ndsi {
        /// Green band
        #[arg(long)]
        green: Option<PathBuf>,

        /// SWIR band
        #[arg(long)]
        swir: Option<PathBuf>,

        /// NIR band, read only for the thresholded variant
        #[arg(long)]
        nir: Option<PathBuf>,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        threshold: ThresholdArgs,
    },

    /// Normalized Difference Forest-Snow Index: (NIR-SWIR)/(NIR+SWIR)
    Ndfsi {
        /// NIR band
        #[arg(long)]
        nir: Option<PathBuf>,

        /// SWIR band
        #[arg(long)]
        swir: Option<PathBuf>,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Normalized Difference Index: (A-B)/(A+B)
    Ndi {
        /// First band (A)
        #[arg(short = 'a', long = "band2")]
        band_a: PathBuf,

        /// Second band (B)
        #[arg(short = 'b', long = "band1")]
        band_b: PathBuf,
    },

    /// Run the jobs of a JSON batch file
    Batch {
        /// Batch configuration file
        config: PathBuf,
    },
}

/// Where bands come from when no explicit per-band path is given.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Multi-band multispectral source
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Multi-band SWIR source
    #[arg(long)]
    pub input2: Option<PathBuf>,

    /// Sensor whose band table locates the bands
    #[arg(long, value_enum)]
    pub sensor: Option<Sensor>,

    /// Pixel resolution used in per-band file names
    #[arg(long = "res")]
    pub resolution: Option<String>,

    /// Read bands by index from the input rasters
    #[arg(long)]
    pub stacked: bool,
}

impl SourceArgs {
    fn request(&self, bands: &[(BandRole, &Option<PathBuf>)]) -> SourceRequest {
        SourceRequest {
            primary: self.input.clone(),
            secondary: self.input2.clone(),
            sensor: self.sensor,
            resolution: self.resolution.clone(),
            stacked: self.stacked,
            bands: bands
                .iter()
                .filter_map(|(role, path)| path.as_ref().map(|p| (*role, p.clone())))
                .collect(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ThresholdArgs {
    /// Lowest NDSI kept by the thresholded variant
    #[arg(long, default_value_t = 0.4, allow_negative_numbers = true)]
    pub min_index: f64,

    /// Highest NDSI kept by the thresholded variant
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    pub max_index: f64,

    /// Minimum green and NIR reflectance of a snow pixel
    #[arg(long, default_value_t = ndsi::DEFAULT_MIN_REFLECTANCE)]
    pub min_reflectance: f32,
}

impl ThresholdArgs {
    fn threshold(&self) -> Threshold {
        Threshold {
            min_index: self.min_index,
            max_index: self.max_index,
            ..Threshold::hall(self.min_reflectance)
        }
    }
}

impl Cli {
    pub fn processing_options(&self) -> ProcessingOptions {
        ProcessingOptions {
            mode: self.mode,
            block_size: self.block_size,
            workers: self.workers,
        }
    }

    /// Apply the global masking options to an index's defaults.
    fn with_params(&self, mut spec: IndexSpec) -> IndexSpec {
        spec.params.output_nodata = self.nodata;
        spec.params.invalid_value = self.invalid;
        spec.params.reject_out_of_range = self.reject_out_of_range;
        spec
    }

    /// The single-index job described by the command line, or `None` for
    /// `batch`.
    pub fn index_job(&self) -> Option<IndexJob> {
        let (spec, sources) = match &self.command {
            Commands::Ndvi { red, nir, source } => (
                IndexKind::Ndvi.spec(),
                source.request(&[(BandRole::Red, red), (BandRole::Nir, nir)]),
            ),
            Commands::Ndwi { green, nir, source } => (
                IndexKind::Ndwi.spec(),
                source.request(&[(BandRole::Green, green), (BandRole::Nir, nir)]),
            ),
            Commands::Ndsi {
                green,
                swir,
                nir,
                source,
                threshold,
            } => {
                let mut spec = ndsi::spec(threshold.min_reflectance);
                spec.params.threshold = Some(threshold.threshold());
                let request = source.request(&[
                    (BandRole::Green, green),
                    (BandRole::Swir, swir),
                    (BandRole::Nir, nir),
                ]);
                (spec, request)
            }
            Commands::Ndfsi { nir, swir, source } => (
                IndexKind::Ndfsi.spec(),
                source.request(&[(BandRole::Nir, nir), (BandRole::Swir, swir)]),
            ),
            Commands::Ndi { band_a, band_b } => {
                let mut request = SourceRequest::default();
                request.bands.insert(BandRole::Band2, band_a.clone());
                request.bands.insert(BandRole::Band1, band_b.clone());
                (IndexKind::Ndi.spec(), request)
            }
            Commands::Batch { .. } => return None,
        };

        Some(IndexJob {
            spec: self.with_params(spec),
            sources,
            output: self.output.clone(),
            variant: self.variant,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndi_maps_a_to_band2() {
        let cli = Cli::try_parse_from(["ndxi", "ndi", "-a", "nir.tif", "-b", "red.tif"]).unwrap();
        let job = cli.index_job().unwrap();

        assert_eq!(job.sources.bands[&BandRole::Band2], PathBuf::from("nir.tif"));
        assert_eq!(job.sources.bands[&BandRole::Band1], PathBuf::from("red.tif"));
        assert_eq!(job.output, PathBuf::from("output.tif"));
    }

    #[test]
    fn global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ndxi", "ndvi", "-i", "scene.tif", "--sensor", "wv3", "--nodata", "-1e20",
            "--block-size", "256x128", "--workers", "4", "-o", "ndvi.tif",
        ])
        .unwrap();

        let options = cli.processing_options();
        assert_eq!(options.block_size, Some(BlockSize::new(256, 128)));
        assert_eq!(options.workers, 4);

        let job = cli.index_job().unwrap();
        assert_eq!(job.spec.params.output_nodata, -1e20);
        assert_eq!(job.sources.sensor, Some(Sensor::Wv3));
        assert_eq!(job.sources.primary, Some(PathBuf::from("scene.tif")));
        assert!(job.sources.bands.is_empty());
    }

    #[test]
    fn ndsi_threshold_options() {
        let cli = Cli::try_parse_from([
            "ndxi", "ndsi", "--green", "g.tif", "--swir", "s.tif", "--nir", "n.tif",
            "--variant", "thresholded", "--min-index", "0.3", "--min-reflectance", "0.2",
        ])
        .unwrap();

        let job = cli.index_job().unwrap();
        let threshold = job.spec.params.threshold.unwrap();
        assert_eq!(job.variant, Variant::Thresholded);
        assert_eq!(threshold.min_index, 0.3);
        assert_eq!(threshold.max_index, 1.0);
        assert_eq!(threshold.min_band2, Some(0.2));
        assert_eq!(threshold.min_aux, Some(0.2));
        assert_eq!(job.sources.bands.len(), 3);
    }

    #[test]
    fn batch_has_no_single_job() {
        let cli = Cli::try_parse_from(["ndxi", "batch", "jobs.json"]).unwrap();
        assert!(cli.index_job().is_none());
    }

    #[test]
    fn malformed_block_size_is_rejected() {
        assert!(Cli::try_parse_from(["ndxi", "ndvi", "--block-size", "256"]).is_err());
    }
}
