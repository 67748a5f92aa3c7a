// src/loader/mod.rs
//! Band source resolution.
//!
//! A band is taken from an explicit single-band path when one is given for
//! its role. Otherwise the sensor's [`BandTable`] entry locates it, either as
//! a per-band reflectance file derived from the multi-band source name
//! (`<stem>_<tag>_<res>_refl.tif`) or, for stacked sources, as a band index
//! inside the multi-band raster itself.

pub mod table;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::io::{BandReader, GdalBand, MemoryBand, RasterProfile};
use crate::processing::engine::BandSet;
use crate::processing::grid::Window;
use crate::processing::indices::{BandRole, IndexSpec};

pub use table::{BandLocator, BandPair, BandTable, Sensor, SourceSlot};

/// Pixel resolution assumed when none is given.
pub const DEFAULT_RESOLUTION: &str = "1.2";

/// What the caller told us about where the bands live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceRequest {
    /// Multi-band multispectral source.
    pub primary: Option<PathBuf>,
    /// Multi-band SWIR source.
    pub secondary: Option<PathBuf>,
    pub sensor: Option<Sensor>,
    /// Pixel resolution such as `"1.2"`, used in derived file names.
    pub resolution: Option<String>,
    /// Read bands by index from the multi-band sources instead of deriving
    /// per-band file names.
    pub stacked: bool,
    /// Explicit single-band paths keyed by role.
    pub bands: BTreeMap<BandRole, PathBuf>,
}

/// One resolved band: a raster path and a 1-based band index within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandSource {
    pub role: BandRole,
    pub path: PathBuf,
    pub band_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBands {
    pub band1: BandSource,
    pub band2: BandSource,
    pub aux: Option<BandSource>,
}

impl ResolvedBands {
    pub fn iter(&self) -> impl Iterator<Item = &BandSource> {
        [Some(&self.band1), Some(&self.band2), self.aux.as_ref()]
            .into_iter()
            .flatten()
    }

    pub fn band_set(&self) -> BandSet<BandSource> {
        BandSet {
            band1: self.band1.clone(),
            band2: self.band2.clone(),
            aux: self.aux.clone(),
        }
    }
}

/// Whole bands read into memory with the primary band's profile.
#[derive(Debug, Clone)]
pub struct LoadedBands {
    pub bands: BandSet<MemoryBand>,
    pub profile: RasterProfile,
}

/// Reduce a pixel resolution to the two-character file name tag: its first
/// and last characters (`"1.2"` → `"12"`, `"30"` → `"30"`).
pub fn resolution_tag(resolution: Option<&str>) -> String {
    let resolution = resolution.unwrap_or(DEFAULT_RESOLUTION).trim();
    match (resolution.chars().next(), resolution.chars().last()) {
        (Some(first), Some(last)) => format!("{first}{last}"),
        _ => String::new(),
    }
}

/// `<dir>/<stem>_<tag>_<res>_refl.tif` next to the multi-band `source`.
pub fn derived_path(source: &Path, tag: &str, resolution_tag: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}_{tag}_{resolution_tag}_refl.tif"))
}

fn resolve_role(
    role: BandRole,
    locator: Option<&BandLocator>,
    request: &SourceRequest,
) -> Result<BandSource> {
    if let Some(path) = request.bands.get(&role) {
        return Ok(BandSource {
            role,
            path: path.clone(),
            band_index: 1,
        });
    }

    let resolution_err = |reason: String| Error::Resolution {
        role: role.to_string(),
        reason,
    };

    let locator = match (request.sensor, locator) {
        (_, Some(locator)) => locator,
        (None, None) => {
            return Err(resolution_err(
                "no explicit band path and no sensor to look it up".to_string(),
            ))
        }
        (Some(sensor), None) => {
            return Err(resolution_err(format!(
                "no explicit band path and no {sensor} band table entry"
            )))
        }
    };

    let source = match locator.slot {
        SourceSlot::Primary => request.primary.as_ref(),
        SourceSlot::Secondary => request.secondary.as_ref().or(request.primary.as_ref()),
    }
    .ok_or_else(|| {
        resolution_err("no explicit band path and no multi-band source".to_string())
    })?;

    let band = if request.stacked {
        BandSource {
            role,
            path: source.clone(),
            band_index: locator.index,
        }
    } else {
        let res = resolution_tag(request.resolution.as_deref());
        BandSource {
            role,
            path: derived_path(source, &locator.tag, &res),
            band_index: 1,
        }
    };
    Ok(band)
}

/// Resolve the sources of every band `spec` needs and check they exist.
///
/// The auxiliary band is only resolved when `with_aux` is set.
pub fn resolve(
    table: &BandTable,
    spec: &IndexSpec,
    request: &SourceRequest,
    with_aux: bool,
) -> Result<ResolvedBands> {
    let entry = request.sensor.and_then(|sensor| table.get(sensor, spec.kind));

    let band1 = resolve_role(spec.band1_role, entry.map(|e| &e.band1), request)?;
    let band2 = resolve_role(spec.band2_role, entry.map(|e| &e.band2), request)?;
    let aux = match spec.aux_role {
        Some(role) if with_aux => Some(resolve_role(
            role,
            entry.and_then(|e| e.aux.as_ref()),
            request,
        )?),
        _ => None,
    };

    let resolved = ResolvedBands { band1, band2, aux };
    for band in resolved.iter() {
        if !band.path.exists() {
            return Err(Error::SourceNotFound {
                path: band.path.clone(),
            });
        }
        debug!(role = %band.role, path = %band.path.display(), band = band.band_index, "resolved band");
    }
    Ok(resolved)
}

/// Open every resolved band, check they share the primary band's shape and
/// return the primary band's profile.
pub fn inspect(resolved: &ResolvedBands) -> Result<RasterProfile> {
    let primary = GdalBand::open(&resolved.band1.path, resolved.band1.band_index)?;
    let profile = primary.profile()?;

    for source in resolved.iter().skip(1) {
        let band = GdalBand::open(&source.path, source.band_index)?;
        check_alignment(&primary, &band)?;
    }
    Ok(profile)
}

/// Verify `other` has the same shape as `primary`. Differing geotransforms
/// are only reported.
pub fn check_alignment<A: BandReader, B: BandReader>(primary: &A, other: &B) -> Result<()> {
    if primary.size() != other.size() {
        return Err(Error::ShapeMismatch {
            first: primary.describe(),
            first_size: primary.size(),
            second: other.describe(),
            second_size: other.size(),
        });
    }
    if primary.geo_transform() != other.geo_transform() {
        warn!(
            first = %primary.describe(),
            second = %other.describe(),
            "bands have different geotransforms; assuming they are co-registered"
        );
    }
    Ok(())
}

/// Read every resolved band whole. `profile` is the primary band's profile
/// as returned by [`inspect`], which has already checked the shapes.
pub fn load(resolved: &ResolvedBands, profile: RasterProfile) -> Result<LoadedBands> {
    let read = |source: &BandSource| -> Result<MemoryBand> {
        let band = GdalBand::open(&source.path, source.band_index)?;
        let buffer = band.read_window(Window::full(band.size()))?;
        let mut memory = MemoryBand::from_buffer(band.describe(), buffer)
            .with_nodata(band.nodata())
            .with_block_size(band.block_size());
        if let Some(geo_transform) = band.geo_transform() {
            memory = memory.with_geo_transform(geo_transform);
        }
        Ok(memory)
    };

    Ok(LoadedBands {
        bands: BandSet {
            band1: read(&resolved.band1)?,
            band2: read(&resolved.band2)?,
            aux: resolved.aux.as_ref().map(read).transpose()?,
        },
        profile,
    })
}
