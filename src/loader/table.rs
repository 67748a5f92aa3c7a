// src/loader/table.rs
use std::collections::HashMap;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::processing::indices::IndexKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensor {
    /// WorldView-3 (8-band VNIR plus separate SWIR product)
    #[value(alias = "WV3")]
    Wv3,
    /// Landsat 8 OLI
    #[value(alias = "L8")]
    L8,
    /// PlanetScope 4-band
    Planet,
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensor::Wv3 => "WV3",
            Sensor::L8 => "L8",
            Sensor::Planet => "Planet",
        };
        f.write_str(name)
    }
}

/// Which multi-band source a band lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSlot {
    /// The multispectral (VNIR) source.
    Primary,
    /// The SWIR source; the primary source stands in when none is given.
    Secondary,
}

/// Where to find one band: its filename tag for per-band files
/// (`<stem>_<tag>_<res>_refl.tif`) and its 1-based index in a stacked raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandLocator {
    pub tag: String,
    pub index: usize,
    pub slot: SourceSlot,
}

impl BandLocator {
    pub fn primary(tag: &str, index: usize) -> Self {
        Self {
            tag: tag.to_string(),
            index,
            slot: SourceSlot::Primary,
        }
    }

    pub fn secondary(tag: &str, index: usize) -> Self {
        Self {
            tag: tag.to_string(),
            index,
            slot: SourceSlot::Secondary,
        }
    }
}

/// Band locations for one (sensor, index) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandPair {
    pub band1: BandLocator,
    pub band2: BandLocator,
    pub aux: Option<BandLocator>,
}

/// Lookup from (sensor, index) to the bands feeding the index.
#[derive(Debug, Clone, Default)]
pub struct BandTable {
    entries: HashMap<(Sensor, IndexKind), BandPair>,
}

impl BandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Known sensors.
    ///
    /// Stacked indices follow the band order of the products the tags refer
    /// to: WorldView-3 stacks are green, red, NIR1, SWIR; Landsat 8 uses OLI
    /// band numbers; PlanetScope is blue, green, red, NIR.
    pub fn builtin() -> Self {
        use BandLocator as B;
        use IndexKind::*;
        use Sensor::*;

        let mut table = Self::new();

        // WorldView-3: VNIR b3 green, b5 red, b7 NIR1; SWIR b2 SWIR-2, b3 SWIR-3
        table.insert(Wv3, Ndvi, B::primary("b5", 2), B::primary("b7", 3), None);
        table.insert(Wv3, Ndwi, B::primary("b7", 3), B::primary("b3", 1), None);
        table.insert(
            Wv3,
            Ndsi,
            B::secondary("b3", 4),
            B::primary("b3", 1),
            Some(B::primary("b7", 3)),
        );
        table.insert(Wv3, Ndfsi, B::secondary("b2", 4), B::primary("b7", 3), None);

        table.insert(L8, Ndvi, B::primary("b4", 4), B::primary("b5", 5), None);
        table.insert(L8, Ndwi, B::primary("b5", 5), B::primary("b3", 3), None);
        table.insert(
            L8,
            Ndsi,
            B::primary("b6", 6),
            B::primary("b3", 3),
            Some(B::primary("b5", 5)),
        );
        table.insert(L8, Ndfsi, B::primary("b6", 6), B::primary("b5", 5), None);

        table.insert(Planet, Ndvi, B::primary("b3", 3), B::primary("b4", 4), None);
        table.insert(Planet, Ndwi, B::primary("b4", 4), B::primary("b2", 2), None);

        table
    }

    pub fn insert(
        &mut self,
        sensor: Sensor,
        kind: IndexKind,
        band1: BandLocator,
        band2: BandLocator,
        aux: Option<BandLocator>,
    ) {
        self.entries
            .insert((sensor, kind), BandPair { band1, band2, aux });
    }

    pub fn get(&self, sensor: Sensor, kind: IndexKind) -> Option<&BandPair> {
        self.entries.get(&(sensor, kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wv3_ndsi_reads_swir_from_secondary_source() {
        let table = BandTable::builtin();
        let pair = table.get(Sensor::Wv3, IndexKind::Ndsi).unwrap();

        assert_eq!(pair.band1.slot, SourceSlot::Secondary);
        assert_eq!(pair.band1.tag, "b3");
        assert_eq!(pair.band2, BandLocator::primary("b3", 1));
        assert_eq!(pair.aux.as_ref().map(|b| b.tag.as_str()), Some("b7"));
    }

    #[test]
    fn planet_has_no_swir_indices() {
        let table = BandTable::builtin();
        assert!(table.get(Sensor::Planet, IndexKind::Ndvi).is_some());
        assert!(table.get(Sensor::Planet, IndexKind::Ndsi).is_none());
        assert!(table.get(Sensor::Planet, IndexKind::Ndfsi).is_none());
    }

    #[test]
    fn generic_index_is_never_tabulated() {
        let table = BandTable::builtin();
        for sensor in [Sensor::Wv3, Sensor::L8, Sensor::Planet] {
            assert!(table.get(sensor, IndexKind::Ndi).is_none());
        }
    }

    #[test]
    fn custom_table_can_be_injected() {
        let mut table = BandTable::new();
        assert!(table.is_empty());
        table.insert(
            Sensor::L8,
            IndexKind::Ndvi,
            BandLocator::primary("red", 1),
            BandLocator::primary("nir", 2),
            None,
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(Sensor::L8, IndexKind::Ndvi).unwrap().band2.tag, "nir");
    }
}
