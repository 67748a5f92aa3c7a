// src/processing/kernel.rs
use std::ops::AddAssign;

use gdal::raster::Buffer;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Output value for cells where an input is no-data, an input is outside the
/// reflectance range, or a threshold predicate rejects the cell.
pub const DEFAULT_OUTPUT_NODATA: f32 = -9999.0;

/// Output value for cells whose index is undefined (`b1 + b2 == 0`).
pub const DEFAULT_INVALID_VALUE: f32 = -32768.0;

/// Inclusive acceptance bounds for the thresholded companion output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub min_index: f64,
    pub max_index: f64,
    #[serde(default)]
    pub min_band1: Option<f32>,
    #[serde(default)]
    pub min_band2: Option<f32>,
    #[serde(default)]
    pub min_aux: Option<f32>,
}

impl Threshold {
    /// Snow mapping threshold of Hall et al.: `0.4 <= NDSI <= 1.0` with green
    /// (band2) and NIR (aux) reflectance of at least `min_reflectance`.
    pub fn hall(min_reflectance: f32) -> Self {
        Self {
            min_index: 0.4,
            max_index: 1.0,
            min_band1: None,
            min_band2: Some(min_reflectance),
            min_aux: Some(min_reflectance),
        }
    }

    fn accepts(&self, index: f64, band1: f32, band2: f32, aux: Option<f32>) -> bool {
        let at_least = |value: Option<f32>, min: Option<f32>| match (value, min) {
            (_, None) => true,
            (Some(v), Some(m)) => v >= m,
            (None, Some(_)) => false,
        };

        index >= self.min_index
            && index <= self.max_index
            && at_least(Some(band1), self.min_band1)
            && at_least(Some(band2), self.min_band2)
            && at_least(aux, self.min_aux)
    }
}

/// Masking and output configuration shared by every index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub output_nodata: f32,
    pub invalid_value: f32,
    /// Mask cells where either input lies outside `[0, 1]`.
    pub reject_out_of_range: bool,
    /// Produce the `(raw + 1) / 2` companion.
    pub emit_normalized: bool,
    /// Produce the thresholded companion.
    pub threshold: Option<Threshold>,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            output_nodata: DEFAULT_OUTPUT_NODATA,
            invalid_value: DEFAULT_INVALID_VALUE,
            reject_out_of_range: false,
            emit_normalized: false,
            threshold: None,
        }
    }
}

impl IndexParams {
    /// Check that the sentinels can be told apart from each other and from
    /// valid output, and that the threshold is usable with the given inputs.
    pub fn validate(&self, has_aux: bool) -> Result<()> {
        let in_range = |v: f32| (-1.0..=1.0).contains(&v);

        // A NaN or infinite sentinel would leak into the output
        for (name, value) in [("no-data", self.output_nodata), ("invalid", self.invalid_value)] {
            if !value.is_finite() {
                return Err(Error::InvalidParams(format!(
                    "{name} value {value} must be finite"
                )));
            }
        }
        if in_range(self.output_nodata) {
            return Err(Error::InvalidParams(format!(
                "no-data value {} lies inside the index range [-1, 1]",
                self.output_nodata
            )));
        }
        if in_range(self.invalid_value) {
            return Err(Error::InvalidParams(format!(
                "invalid value {} lies inside the index range [-1, 1]",
                self.invalid_value
            )));
        }
        if self.output_nodata == self.invalid_value {
            return Err(Error::InvalidParams(format!(
                "no-data and invalid values must differ (both {})",
                self.output_nodata
            )));
        }

        if let Some(threshold) = &self.threshold {
            if !(threshold.min_index <= threshold.max_index) {
                return Err(Error::InvalidParams(format!(
                    "threshold range [{}, {}] is empty",
                    threshold.min_index, threshold.max_index
                )));
            }
            if threshold.min_aux.is_some() && !has_aux {
                return Err(Error::InvalidParams(
                    "threshold tests an auxiliary band but none is loaded".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Per-band no-data sentinels of the inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodataValues {
    pub band1: Option<f64>,
    pub band2: Option<f64>,
    pub aux: Option<f64>,
}

/// Co-registered input windows. `aux` only feeds the threshold predicate.
#[derive(Debug, Clone, Copy)]
pub struct BandInputs<'a> {
    pub band1: &'a Buffer<f32>,
    pub band2: &'a Buffer<f32>,
    pub aux: Option<&'a Buffer<f32>>,
}

/// Cell counts of one computation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaskStats {
    pub valid: usize,
    pub nodata: usize,
    pub invalid: usize,
    /// Valid cells the threshold predicate rejected.
    pub rejected: usize,
}

impl MaskStats {
    pub fn total(&self) -> usize {
        self.valid + self.nodata + self.invalid
    }

    fn record(&mut self, cell: &Cell) {
        match cell {
            Cell::NoData => self.nodata += 1,
            Cell::Invalid => self.invalid += 1,
            Cell::Valid { passes, .. } => {
                self.valid += 1;
                if !passes {
                    self.rejected += 1;
                }
            }
        }
    }
}

impl AddAssign for MaskStats {
    fn add_assign(&mut self, other: Self) {
        self.valid += other.valid;
        self.nodata += other.nodata;
        self.invalid += other.invalid;
        self.rejected += other.rejected;
    }
}

/// Output grids for one window.
#[derive(Debug)]
pub struct IndexResult {
    pub raw: Buffer<f32>,
    pub normalized: Option<Buffer<f32>>,
    pub thresholded: Option<Buffer<f32>>,
    pub stats: MaskStats,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cell {
    NoData,
    Invalid,
    Valid { index: f64, passes: bool },
}

impl Cell {
    fn raw(&self, params: &IndexParams) -> f32 {
        match *self {
            Cell::NoData => params.output_nodata,
            Cell::Invalid => params.invalid_value,
            Cell::Valid { index, .. } => index as f32,
        }
    }

    fn normalized(&self, params: &IndexParams) -> f32 {
        match *self {
            Cell::Valid { index, .. } => ((index + 1.0) / 2.0) as f32,
            _ => self.raw(params),
        }
    }

    fn thresholded(&self, params: &IndexParams) -> f32 {
        match *self {
            Cell::Valid { passes: false, .. } => params.output_nodata,
            _ => self.raw(params),
        }
    }
}

fn is_nodata(value: f32, nodata: Option<f64>) -> bool {
    match nodata {
        Some(nd) if nd.is_nan() => value.is_nan(),
        Some(nd) => value == nd as f32,
        None => false,
    }
}

fn is_reflectance(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

fn classify(
    band1: f32,
    band2: f32,
    aux: Option<f32>,
    nodata: &NodataValues,
    params: &IndexParams,
) -> Cell {
    if is_nodata(band1, nodata.band1) || is_nodata(band2, nodata.band2) {
        return Cell::NoData;
    }
    if params.reject_out_of_range && !(is_reflectance(band1) && is_reflectance(band2)) {
        return Cell::NoData;
    }

    let (a, b) = (f64::from(band1), f64::from(band2));
    let sum = b + a;
    if sum == 0.0 {
        return Cell::Invalid;
    }
    let index = (b - a) / sum;
    // Only reachable with negative or non-finite inputs
    if !index.is_finite() || !(-1.0..=1.0).contains(&index) {
        return Cell::Invalid;
    }

    let passes = match &params.threshold {
        None => true,
        Some(threshold) => {
            let aux = aux.filter(|v| !is_nodata(*v, nodata.aux));
            threshold.accepts(index, band1, band2, aux)
        }
    };
    Cell::Valid { index, passes }
}

fn ensure_same_shape(name: &str, expected: (usize, usize), actual: (usize, usize)) -> Result<()> {
    if expected != actual {
        return Err(Error::ShapeMismatch {
            first: "band1".to_string(),
            first_size: expected,
            second: name.to_string(),
            second_size: actual,
        });
    }
    Ok(())
}

/// Compute `(b2 - b1) / (b2 + b1)` with masking.
///
/// Cells are classified independently:
/// 1. either input equal to its band's no-data value → `output_nodata`;
/// 2. with `reject_out_of_range`, either input outside `[0, 1]` → `output_nodata`;
/// 3. zero denominator or a non-finite / out-of-range quotient → `invalid_value`;
/// 4. otherwise the index, computed in f64 and stored as f32.
///
/// The normalized companion maps valid cells to `(index + 1) / 2` and keeps
/// the raw sentinels, so both share one mask. The thresholded companion keeps
/// valid cells that pass the predicate and sets the rest to `output_nodata`.
///
/// Only shape disagreement is an error; numeric edge cases are masked.
pub fn compute_index(
    inputs: BandInputs<'_>,
    nodata: &NodataValues,
    params: &IndexParams,
) -> Result<IndexResult> {
    let shape = inputs.band1.shape();
    ensure_same_shape("band2", shape, inputs.band2.shape())?;
    if let Some(aux) = inputs.aux {
        ensure_same_shape("aux", shape, aux.shape())?;
    }

    let band1 = inputs.band1.data();
    let band2 = inputs.band2.data();
    let aux = inputs.aux.map(|b| b.data());

    let cells: Vec<Cell> = (0..band1.len())
        .into_par_iter()
        .map(|i| classify(band1[i], band2[i], aux.map(|a| a[i]), nodata, params))
        .collect();

    let stats = cells.iter().fold(MaskStats::default(), |mut stats, cell| {
        stats.record(cell);
        stats
    });

    let render = |value: fn(&Cell, &IndexParams) -> f32| {
        let data: Vec<f32> = cells.par_iter().map(|cell| value(cell, params)).collect();
        Buffer::new(shape, data)
    };

    Ok(IndexResult {
        raw: render(Cell::raw),
        normalized: params.emit_normalized.then(|| render(Cell::normalized)),
        thresholded: params.threshold.is_some().then(|| render(Cell::thresholded)),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[f32]) -> Buffer<f32> {
        Buffer::new((values.len(), 1), values.to_vec())
    }

    fn raw_values(b1: &[f32], b2: &[f32], nodata: NodataValues, params: &IndexParams) -> Vec<f32> {
        let (b1, b2) = (row(b1), row(b2));
        let inputs = BandInputs {
            band1: &b1,
            band2: &b2,
            aux: None,
        };
        compute_index(inputs, &nodata, params).unwrap().raw.data().to_vec()
    }

    #[test]
    fn nan_sentinel_matches_nan_cells() {
        assert!(is_nodata(f32::NAN, Some(f64::NAN)));
        assert!(!is_nodata(0.5, Some(f64::NAN)));
        assert!(!is_nodata(f32::NAN, None));
    }

    #[test]
    fn opposite_inputs_are_invalid() {
        let params = IndexParams::default();
        let out = raw_values(&[0.25, -0.3], &[-0.25, 0.3], NodataValues::default(), &params);
        assert_eq!(out, vec![DEFAULT_INVALID_VALUE, DEFAULT_INVALID_VALUE]);
    }

    #[test]
    fn negative_inputs_beyond_range_are_invalid() {
        // (0.5 - -0.2) / (0.5 + -0.2) = 2.33
        let params = IndexParams::default();
        let out = raw_values(&[-0.2], &[0.5], NodataValues::default(), &params);
        assert_eq!(out, vec![DEFAULT_INVALID_VALUE]);
    }

    #[test]
    fn non_finite_inputs_never_leak() {
        let params = IndexParams::default();
        let out = raw_values(
            &[f32::NAN, f32::INFINITY, 0.2],
            &[0.4, f32::INFINITY, f32::NAN],
            NodataValues::default(),
            &params,
        );
        assert!(out.iter().all(|v| *v == DEFAULT_INVALID_VALUE));
    }

    #[test]
    fn out_of_range_reflectance_masked_when_enabled() {
        let params = IndexParams {
            reject_out_of_range: true,
            ..IndexParams::default()
        };
        let out = raw_values(&[1.2, 0.2], &[0.4, 0.4], NodataValues::default(), &params);
        assert_eq!(out[0], DEFAULT_OUTPUT_NODATA);
        assert!((out[1] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn nodata_takes_precedence_over_invalid() {
        let params = IndexParams::default();
        let nodata = NodataValues {
            band1: Some(0.0),
            ..NodataValues::default()
        };
        let out = raw_values(&[0.0], &[0.0], nodata, &params);
        assert_eq!(out, vec![DEFAULT_OUTPUT_NODATA]);
    }

    #[test]
    fn threshold_uses_aux_band() {
        let params = IndexParams {
            threshold: Some(Threshold::hall(0.1)),
            ..IndexParams::default()
        };
        // swir, green, nir
        let (b1, b2, nir) = (row(&[0.1, 0.1, 0.1]), row(&[0.5, 0.5, 0.12]), row(&[0.3, 0.05, 0.3]));
        let result = compute_index(
            BandInputs {
                band1: &b1,
                band2: &b2,
                aux: Some(&nir),
            },
            &NodataValues::default(),
            &params,
        )
        .unwrap();

        let thresholded = result.thresholded.unwrap();
        let data = thresholded.data();
        assert!((data[0] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(data[1], DEFAULT_OUTPUT_NODATA);
        // index 0.09 is below 0.4
        assert_eq!(data[2], DEFAULT_OUTPUT_NODATA);
        assert_eq!(result.stats.rejected, 2);
        assert_eq!(result.stats.valid, 3);
    }

    #[test]
    fn aux_nodata_fails_threshold_but_not_raw() {
        let params = IndexParams {
            threshold: Some(Threshold::hall(0.1)),
            ..IndexParams::default()
        };
        let (b1, b2, nir) = (row(&[0.1]), row(&[0.5]), row(&[-1.0]));
        let nodata = NodataValues {
            aux: Some(-1.0),
            ..NodataValues::default()
        };
        let result = compute_index(
            BandInputs {
                band1: &b1,
                band2: &b2,
                aux: Some(&nir),
            },
            &nodata,
            &params,
        )
        .unwrap();

        assert!((result.raw.data()[0] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(result.thresholded.unwrap().data()[0], DEFAULT_OUTPUT_NODATA);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let (b1, b2) = (row(&[0.1, 0.2]), row(&[0.1, 0.2, 0.3]));
        let err = compute_index(
            BandInputs {
                band1: &b1,
                band2: &b2,
                aux: None,
            },
            &NodataValues::default(),
            &IndexParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn validate_rejects_sentinels_in_range() {
        let params = IndexParams {
            output_nodata: 0.0,
            ..IndexParams::default()
        };
        assert!(params.validate(false).is_err());
    }

    #[test]
    fn validate_rejects_equal_sentinels() {
        let params = IndexParams {
            output_nodata: 9999.0,
            invalid_value: 9999.0,
            ..IndexParams::default()
        };
        assert!(params.validate(false).is_err());
    }

    #[test]
    fn validate_rejects_non_finite_sentinels() {
        let sentinels = [
            (f32::NAN, DEFAULT_INVALID_VALUE),
            (DEFAULT_OUTPUT_NODATA, f32::NAN),
            (f32::INFINITY, DEFAULT_INVALID_VALUE),
            (DEFAULT_OUTPUT_NODATA, f32::NEG_INFINITY),
        ];
        for (i, (output_nodata, invalid_value)) in sentinels.into_iter().enumerate() {
            let params = IndexParams {
                output_nodata,
                invalid_value,
                ..IndexParams::default()
            };
            assert!(
                matches!(params.validate(false), Err(Error::InvalidParams(_))),
                "Expected rejection of ({}, {}) at index {}",
                output_nodata,
                invalid_value,
                i
            );
        }
    }

    #[test]
    fn validate_requires_aux_for_aux_threshold() {
        let params = IndexParams {
            threshold: Some(Threshold::hall(0.1)),
            ..IndexParams::default()
        };
        assert!(params.validate(false).is_err());
        assert!(params.validate(true).is_ok());
    }
}
