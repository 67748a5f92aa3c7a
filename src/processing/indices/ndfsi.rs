// src/processing/indices/ndfsi.rs
use super::{BandRole, IndexKind, IndexSpec};
use crate::processing::kernel::IndexParams;

/// Normalized Difference Forest-Snow Index: (NIR - SWIR) / (NIR + SWIR).
///
/// Separates snow under forest canopy from open snow; on WorldView-3 the SWIR
/// term is SWIR-2 (1550-1590 nm), on Landsat 8 OLI band 6.
pub fn spec() -> IndexSpec {
    IndexSpec {
        kind: IndexKind::Ndfsi,
        band1_role: BandRole::Swir,
        band2_role: BandRole::Nir,
        aux_role: None,
        params: IndexParams::default(),
    }
}
