// src/processing/indices/mod.rs
pub mod ndfsi;
pub mod ndi;
pub mod ndsi;
pub mod ndvi;
pub mod ndwi;

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::processing::kernel::IndexParams;

/// Spectral role of an input band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandRole {
    Green,
    Red,
    Nir,
    Swir,
    /// Generic first operand of [`IndexKind::Ndi`].
    Band1,
    /// Generic second operand of [`IndexKind::Ndi`].
    Band2,
}

impl fmt::Display for BandRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BandRole::Green => "green",
            BandRole::Red => "red",
            BandRole::Nir => "nir",
            BandRole::Swir => "swir",
            BandRole::Band1 => "band1",
            BandRole::Band2 => "band2",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Normalized Difference Vegetation Index
    Ndvi,
    /// Normalized Difference Water Index (McFeeters)
    Ndwi,
    /// Normalized Difference Snow Index
    Ndsi,
    /// Normalized Difference Forest-Snow Index
    Ndfsi,
    /// Generic normalized difference of two explicit bands
    Ndi,
}

impl IndexKind {
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Ndvi => "NDVI",
            IndexKind::Ndwi => "NDWI",
            IndexKind::Ndsi => "NDSI",
            IndexKind::Ndfsi => "NDFSI",
            IndexKind::Ndi => "NDI",
        }
    }

    /// Default configuration record for this index.
    pub fn spec(&self) -> IndexSpec {
        match self {
            IndexKind::Ndvi => ndvi::spec(),
            IndexKind::Ndwi => ndwi::spec(),
            IndexKind::Ndsi => ndsi::spec(ndsi::DEFAULT_MIN_REFLECTANCE),
            IndexKind::Ndfsi => ndfsi::spec(),
            IndexKind::Ndi => ndi::spec(),
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything that distinguishes one normalized-difference index from
/// another: which bands feed `(band2 - band1) / (band2 + band1)`, which
/// optional band the threshold predicate reads, and the masking parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub kind: IndexKind,
    pub band1_role: BandRole,
    pub band2_role: BandRole,
    pub aux_role: Option<BandRole>,
    pub params: IndexParams,
}

impl IndexSpec {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}
