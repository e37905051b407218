use crate::io::ingest::{stack_scene, SceneReader};
use crate::types::{FillError, FillResult, RasterImage};
use gdal::Dataset;
use ndarray::{Array2, Array3, Axis};
use std::path::{Path, PathBuf};

/// Reads paired band/mask GeoTIFFs sharing a file name across two directories
pub struct GdalSceneReader {
    image_dir: PathBuf,
    mask_dir: PathBuf,
    extension: String,
}

impl GdalSceneReader {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(image_dir: P, mask_dir: Q) -> Self {
        Self {
            image_dir: image_dir.as_ref().to_path_buf(),
            mask_dir: mask_dir.as_ref().to_path_buf(),
            extension: "tif".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    fn file_name(&self, id: &str) -> String {
        format!("{}.{}", id, self.extension)
    }

    /// Read every band of a raster as i16, band-major
    fn read_stack(path: &Path) -> FillResult<RasterImage> {
        log::debug!("Reading raster {}", path.display());
        let gdal_err = |e: gdal::errors::GdalError| {
            FillError::Processing(format!("GDAL error reading {}: {}", path.display(), e))
        };

        let dataset = Dataset::open(path).map_err(gdal_err)?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count();

        let mut stack = Array3::<i16>::zeros((band_count as usize, height, width));
        for band in 1..=band_count {
            let rasterband = dataset.rasterband(band).map_err(gdal_err)?;
            let buffer = rasterband
                .read_as::<i16>((0, 0), (width, height), (width, height), None)
                .map_err(gdal_err)?;
            let plane = Array2::from_shape_vec((height, width), buffer.data)
                .map_err(|e| FillError::Processing(format!("Failed to reshape band {}: {}", band, e)))?;
            stack.index_axis_mut(Axis(0), (band - 1) as usize).assign(&plane);
        }

        Ok(stack)
    }
}

impl SceneReader for GdalSceneReader {
    fn read_scene(&self, id: &str) -> FillResult<RasterImage> {
        let name = self.file_name(id);
        let bands = Self::read_stack(&self.image_dir.join(&name))?;
        let mask = Self::read_stack(&self.mask_dir.join(&name))?;
        stack_scene(bands, mask)
    }
}
