// src/batch.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::loader::{Sensor, SourceRequest};
use crate::processing::kernel::{DEFAULT_INVALID_VALUE, DEFAULT_OUTPUT_NODATA};
use crate::processing::{
    BandRole, BlockSize, IndexJob, IndexKind, IndexProcessor, Mode, ProcessingOptions, RunSummary,
    Threshold, Variant,
};

#[derive(Deserialize, Serialize, Debug)]
pub struct BatchConfig {
    #[serde(default)]
    pub global: GlobalParams,
    pub jobs: Vec<JobConfig>,
    /// Where to write the JSON run summaries.
    #[serde(default)]
    pub report: Option<PathBuf>,
}

/// Defaults shared by every job of a batch.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GlobalParams {
    pub mode: Mode,
    pub block_size: Option<BlockSize>,
    pub workers: usize,
    pub variant: Variant,
    pub nodata: f32,
    pub invalid: f32,
    pub reject_out_of_range: bool,
    pub sensor: Option<Sensor>,
    pub resolution: Option<String>,
    pub stacked: bool,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            mode: Mode::Blocks,
            block_size: None,
            workers: 1,
            variant: Variant::Raw,
            nodata: DEFAULT_OUTPUT_NODATA,
            invalid: DEFAULT_INVALID_VALUE,
            reject_out_of_range: false,
            sensor: None,
            resolution: None,
            stacked: false,
        }
    }
}

/// One index computation. Unset options fall back to [`GlobalParams`].
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct JobConfig {
    pub index: IndexKind,
    pub output: PathBuf,
    pub input: Option<PathBuf>,
    pub input2: Option<PathBuf>,
    #[serde(default)]
    pub bands: BTreeMap<BandRole, PathBuf>,
    pub sensor: Option<Sensor>,
    pub resolution: Option<String>,
    pub stacked: Option<bool>,
    pub variant: Option<Variant>,
    pub mode: Option<Mode>,
    pub block_size: Option<BlockSize>,
    pub workers: Option<usize>,
    pub nodata: Option<f32>,
    pub invalid: Option<f32>,
    pub reject_out_of_range: Option<bool>,
    pub threshold: Option<Threshold>,
}

impl JobConfig {
    pub fn options(&self, global: &GlobalParams) -> ProcessingOptions {
        ProcessingOptions {
            mode: self.mode.unwrap_or(global.mode),
            block_size: self.block_size.or(global.block_size),
            workers: self.workers.unwrap_or(global.workers),
        }
    }

    pub fn job(&self, global: &GlobalParams) -> IndexJob {
        let mut spec = self.index.spec();
        spec.params.output_nodata = self.nodata.unwrap_or(global.nodata);
        spec.params.invalid_value = self.invalid.unwrap_or(global.invalid);
        spec.params.reject_out_of_range = self
            .reject_out_of_range
            .unwrap_or(global.reject_out_of_range);
        if let Some(threshold) = self.threshold {
            spec.params.threshold = Some(threshold);
        }

        IndexJob {
            spec,
            sources: SourceRequest {
                primary: self.input.clone(),
                secondary: self.input2.clone(),
                sensor: self.sensor.or(global.sensor),
                resolution: self.resolution.clone().or_else(|| global.resolution.clone()),
                stacked: self.stacked.unwrap_or(global.stacked),
                bands: self.bands.clone(),
            },
            output: self.output.clone(),
            variant: self.variant.unwrap_or(global.variant),
        }
    }
}

pub fn load_config(config_path: &Path) -> Result<BatchConfig> {
    let config_content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read batch file {}", config_path.display()))?;
    serde_json::from_str(&config_content)
        .with_context(|| format!("Failed to parse batch file {}", config_path.display()))
}

/// Run every job in order, stopping at the first failure.
pub fn run_batch(config: &BatchConfig) -> Result<Vec<RunSummary>> {
    info!("Starting batch processing with {} jobs", config.jobs.len());

    let mut summaries = Vec::with_capacity(config.jobs.len());
    for (i, job_config) in config.jobs.iter().enumerate() {
        info!(
            "[{}/{}] Processing {} -> {}",
            i + 1,
            config.jobs.len(),
            job_config.index,
            job_config.output.display()
        );

        let processor = IndexProcessor::new(job_config.options(&config.global));
        let summary = processor
            .process(&job_config.job(&config.global))
            .with_context(|| {
                format!(
                    "Job {} ({} -> {}) failed",
                    i + 1,
                    job_config.index,
                    job_config.output.display()
                )
            })?;
        summaries.push(summary);
    }

    if let Some(report) = &config.report {
        let json = serde_json::to_string_pretty(&summaries)?;
        fs::write(report, json)
            .with_context(|| format!("Failed to write report {}", report.display()))?;
    }

    info!("Batch processing complete");
    Ok(summaries)
}

pub fn process_batch(config_path: &Path) -> Result<Vec<RunSummary>> {
    let config = load_config(config_path)?;
    run_batch(&config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn job_overrides_global_params() {
        let config: BatchConfig = serde_json::from_str(
            r#"{
                "global": { "sensor": "wv3", "resolution": "1.2", "block_size": "256x256", "nodata": -1000 },
                "jobs": [
                    { "index": "ndvi", "input": "scene.tif", "output": "ndvi.tif" },
                    { "index": "ndsi", "input": "stack.tif", "output": "ndsi.tif",
                      "sensor": "l8", "stacked": true, "workers": 4, "variant": "thresholded",
                      "threshold": { "min_index": 0.3, "max_index": 1.0, "min_band2": 0.2 } }
                ]
            }"#,
        )
        .unwrap();

        let first = config.jobs[0].job(&config.global);
        assert_eq!(first.sources.sensor, Some(Sensor::Wv3));
        assert_eq!(first.sources.resolution.as_deref(), Some("1.2"));
        assert_eq!(first.spec.params.output_nodata, -1000.0);
        assert_eq!(first.variant, Variant::Raw);
        assert_eq!(
            config.jobs[0].options(&config.global).block_size,
            Some(BlockSize::new(256, 256))
        );

        let second = config.jobs[1].job(&config.global);
        assert_eq!(second.sources.sensor, Some(Sensor::L8));
        assert!(second.sources.stacked);
        assert_eq!(second.variant, Variant::Thresholded);
        let threshold = second.spec.params.threshold.unwrap();
        assert_eq!(threshold.min_index, 0.3);
        assert_eq!(threshold.min_aux, None);
        assert_eq!(config.jobs[1].options(&config.global).workers, 4);
    }

    #[test]
    fn explicit_band_paths_by_role() {
        let config: BatchConfig = serde_json::from_str(
            r#"{ "jobs": [ { "index": "ndi", "output": "out.tif",
                 "bands": { "band1": "a.tif", "band2": "b.tif" } } ] }"#,
        )
        .unwrap();

        assert_eq!(config.global, GlobalParams::default());
        let job = config.jobs[0].job(&config.global);
        assert_eq!(job.sources.bands[&BandRole::Band1], PathBuf::from("a.tif"));
        assert_eq!(job.sources.bands[&BandRole::Band2], PathBuf::from("b.tif"));
    }

    #[test]
    fn first_failure_aborts_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let second_output = dir.path().join("second.tif");
        let config = BatchConfig {
            global: GlobalParams::default(),
            jobs: vec![
                serde_json::from_value(serde_json::json!({
                    "index": "ndi",
                    "output": dir.path().join("first.tif"),
                    "bands": { "band1": dir.path().join("missing1.tif"), "band2": dir.path().join("missing2.tif") }
                }))
                .unwrap(),
                serde_json::from_value(serde_json::json!({
                    "index": "ndvi",
                    "output": second_output,
                    "sensor": "planet",
                    "input": dir.path().join("planet.tif"),
                }))
                .unwrap(),
            ],
            report: None,
        };

        let err = run_batch(&config).unwrap_err();
        assert!(err.to_string().starts_with("Job 1 (NDI"));
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::SourceNotFound { .. })
        ));
        assert!(!second_output.exists());
    }

    #[test]
    fn unreadable_config_has_context() {
        let err = load_config(Path::new("/nonexistent/batch.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/batch.json"));
    }
}
