// src/processing/indices/ndsi.rs
use super::{BandRole, IndexKind, IndexSpec};
use crate::processing::kernel::{IndexParams, Threshold};

/// Minimum green and NIR reflectance for a snow pixel.
pub const DEFAULT_MIN_REFLECTANCE: f32 = 0.1;

/// Normalized Difference Snow Index: (GREEN - SWIR) / (GREEN + SWIR).
///
/// NIR is read only for the thresholded variant, which keeps pixels with
/// `0.4 <= NDSI <= 1.0` and green and NIR reflectance of at least
/// `min_reflectance`.
pub fn spec(min_reflectance: f32) -> IndexSpec {
    IndexSpec {
        kind: IndexKind::Ndsi,
        band1_role: BandRole::Swir,
        band2_role: BandRole::Green,
        aux_role: Some(BandRole::Nir),
        params: IndexParams {
            threshold: Some(Threshold::hall(min_reflectance)),
            ..IndexParams::default()
        },
    }
}
