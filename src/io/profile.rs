// src/io/profile.rs
use gdal::{Dataset, Metadata};
use serde::Serialize;

/// Georeferencing and layout metadata of a source raster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterProfile {
    pub width: usize,
    pub height: usize,
    pub geo_transform: Option<[f64; 6]>,
    pub projection: String,
    pub nodata: Option<f64>,
    pub band_count: usize,
    pub compression: Option<String>,
}

pub const OUTPUT_COMPRESSION: &str = "LZW";

impl RasterProfile {
    pub fn from_dataset(dataset: &Dataset, band_index: usize) -> gdal::errors::Result<Self> {
        let band = dataset.rasterband(band_index)?;
        let (width, height) = band.size();

        Ok(Self {
            width,
            height,
            // Ungeoreferenced inputs stay ungeoreferenced on output
            geo_transform: dataset.geo_transform().ok(),
            projection: dataset.projection(),
            nodata: band.no_data_value(),
            band_count: dataset.raster_count() as usize,
            compression: dataset.metadata_item("COMPRESSION", "IMAGE_STRUCTURE"),
        })
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Copy of this profile describing a single-band LZW output.
    pub fn for_output(&self, nodata: f32) -> Self {
        Self {
            nodata: Some(f64::from(nodata)),
            band_count: 1,
            compression: Some(OUTPUT_COMPRESSION.to_string()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_profile() -> RasterProfile {
        RasterProfile {
            width: 40,
            height: 30,
            geo_transform: Some([500000.0, 1.2, 0.0, 7000000.0, 0.0, -1.2]),
            projection: "EPSG:32606".to_string(),
            nodata: Some(0.0),
            band_count: 8,
            compression: None,
        }
    }

    #[test]
    fn output_profile_is_single_band_float() {
        let source = source_profile();
        let output = source.for_output(-9999.0);

        assert_eq!(output.band_count, 1);
        assert_eq!(output.compression.as_deref(), Some("LZW"));
        assert_eq!(output.nodata, Some(-9999.0));
        assert_eq!(output.geo_transform, source.geo_transform);
        assert_eq!(output.size(), (40, 30));
    }

    #[test]
    fn output_profile_leaves_source_untouched() {
        let source = source_profile();
        let first = source.for_output(-9999.0);
        let second = source.for_output(9999.0);

        assert_eq!(source, source_profile());
        assert_ne!(first.nodata, second.nodata);
    }
}
