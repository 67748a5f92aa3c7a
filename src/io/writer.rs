// src/io/writer.rs
use std::path::{Path, PathBuf};

use gdal::raster::{Buffer, RasterCreationOptions};
use gdal::{Dataset, DriverManager, Metadata};
use tracing::debug;

use super::{check_window, RasterProfile, RasterWriter};
use crate::error::{Error, Result};
use crate::processing::grid::Window;

/// Default GeoTIFF tile edge.
const OUTPUT_TILE_SIZE: usize = 256;

/// Float32 GeoTIFF output; windows are written to band 1.
pub struct GdalWriter {
    path: PathBuf,
    dataset: Dataset,
    size: (usize, usize),
}

impl GdalWriter {
    /// Create (or overwrite) `path` from an output profile, copying its
    /// geotransform, projection and no-data value.
    pub fn create(path: &Path, profile: &RasterProfile, description: &str) -> Result<Self> {
        let write_err = |source| Error::Write {
            path: path.to_path_buf(),
            source,
        };

        let driver = DriverManager::get_driver_by_name("GTiff").map_err(write_err)?;

        let mut options = vec!["BIGTIFF=IF_SAFER".to_string()];
        // Tiles smaller than the raster only pad the file
        if profile.width >= OUTPUT_TILE_SIZE && profile.height >= OUTPUT_TILE_SIZE {
            options.push("TILED=YES".to_string());
        }
        if let Some(compress) = &profile.compression {
            options.push(format!("COMPRESS={}", compress.to_uppercase()));
        }
        let creation_options = RasterCreationOptions::from_iter(options);

        let mut dataset = driver
            .create_with_band_type_with_options::<f32, _>(
                path,
                profile.width,
                profile.height,
                profile.band_count,
                &creation_options,
            )
            .map_err(write_err)?;

        if let Some(geo_transform) = &profile.geo_transform {
            dataset.set_geo_transform(geo_transform).map_err(write_err)?;
        }
        if !profile.projection.is_empty() {
            dataset
                .set_projection(&profile.projection)
                .map_err(write_err)?;
        }

        for index in 1..=profile.band_count {
            let mut band = dataset.rasterband(index).map_err(write_err)?;
            band.set_no_data_value(profile.nodata).map_err(write_err)?;
            band.set_description(description).map_err(write_err)?;
        }

        debug!(path = %path.display(), width = profile.width, height = profile.height, "created output raster");

        Ok(Self {
            path: path.to_path_buf(),
            dataset,
            size: profile.size(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RasterWriter for GdalWriter {
    fn write_window(&mut self, window: Window, data: &mut Buffer<f32>) -> Result<()> {
        check_window(window, self.size)?;
        let write_err = |source| Error::Write {
            path: self.path.clone(),
            source,
        };

        let mut band = self.dataset.rasterband(1).map_err(write_err)?;
        band.write((window.x as isize, window.y as isize), window.size(), data)
            .map_err(write_err)
    }

    fn finish(mut self) -> Result<()> {
        self.dataset.flush_cache().map_err(|source| Error::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Sibling of `path` with `_<suffix>` appended to the file stem, keeping the
/// extension: `ndsi.tif` becomes `ndsi_minmax.tif`.
pub fn companion_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companion_keeps_directory_and_extension() {
        assert_eq!(
            companion_path(Path::new("/data/out/ndsi.tif"), "minmax"),
            PathBuf::from("/data/out/ndsi_minmax.tif")
        );
    }

    #[test]
    fn companion_without_extension() {
        assert_eq!(
            companion_path(Path::new("scene_ndvi"), "thresh"),
            PathBuf::from("scene_ndvi_thresh")
        );
    }

    #[test]
    fn companion_only_replaces_last_extension() {
        assert_eq!(
            companion_path(Path::new("wv3.scene.tif"), "minmax"),
            PathBuf::from("wv3.scene_minmax.tif")
        );
    }
}
