// src/processing/indices/ndi.rs
use super::{BandRole, IndexKind, IndexSpec};
use crate::processing::kernel::IndexParams;

/// Normalized Difference Index of two explicit bands: (A - B) / (A + B),
/// where A is `band2` and B is `band1`.
pub fn spec() -> IndexSpec {
    IndexSpec {
        kind: IndexKind::Ndi,
        band1_role: BandRole::Band1,
        band2_role: BandRole::Band2,
        aux_role: None,
        params: IndexParams::default(),
    }
}
