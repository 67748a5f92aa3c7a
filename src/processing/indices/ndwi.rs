// src/processing/indices/ndwi.rs
use super::{BandRole, IndexKind, IndexSpec};
use crate::processing::kernel::IndexParams;

/// Normalized Difference Water Index (McFeeters): (GREEN - NIR) / (GREEN + NIR)
pub fn spec() -> IndexSpec {
    IndexSpec {
        kind: IndexKind::Ndwi,
        band1_role: BandRole::Nir,
        band2_role: BandRole::Green,
        aux_role: None,
        params: IndexParams::default(),
    }
}
