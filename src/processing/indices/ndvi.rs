// src/processing/indices/ndvi.rs
use super::{BandRole, IndexKind, IndexSpec};
use crate::processing::kernel::IndexParams;

/// Normalized Difference Vegetation Index: (NIR - RED) / (NIR + RED)
pub fn spec() -> IndexSpec {
    IndexSpec {
        kind: IndexKind::Ndvi,
        band1_role: BandRole::Red,
        band2_role: BandRole::Nir,
        aux_role: None,
        params: IndexParams::default(),
    }
}
