//! Capability interface to the raster compute engine
//!
//! Only data access is required of an engine. Every compute capability has a
//! local `ndarray` implementation that a remote engine may override.

use crate::core::composite::{self, Statistic};
use crate::core::harmonize::Sensor;
use crate::core::kernel::Kernel;
use crate::core::neighborhood;
use crate::core::sampling::{self, Sample, SampleParams, StratifiedSampleParams};
use crate::core::terrain;
use crate::core::texture;
use crate::raster::{RasterImage, RasterTimeSeries};
use crate::types::{DateRange, PropertyMap, RsrResult};
use geo::Geometry;
use serde::{Deserialize, Serialize};

/// Dataset identifiers consumed by the feature assembler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetCatalog {
    pub landsat4: String,
    pub landsat5: String,
    pub landsat7: String,
    pub landsat8: String,
    /// Static elevation model
    pub dem: String,
    /// Binary conifer/non-conifer classification
    pub conifer: String,
    /// Band of the conifer raster holding the class
    pub conifer_band: String,
    /// Daily gridded surface meteorology
    pub gridmet: String,
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        Self {
            landsat4: "LANDSAT/LT04/C01/T1_SR".to_string(),
            landsat5: "LANDSAT/LT05/C01/T1_SR".to_string(),
            landsat7: "LANDSAT/LE07/C01/T1_SR".to_string(),
            landsat8: "LANDSAT/LC08/C01/T1_SR".to_string(),
            dem: "USGS/SRTMGL1_003".to_string(),
            conifer: "users/mkoontz/mixed_conifer".to_string(),
            conifer_band: "b1".to_string(),
            gridmet: "IDAHO_EPSCOR/GRIDMET".to_string(),
        }
    }
}

impl DatasetCatalog {
    pub fn sensor_dataset(&self, sensor: Sensor) -> &str {
        match sensor {
            Sensor::Landsat4 => &self.landsat4,
            Sensor::Landsat5 => &self.landsat5,
            Sensor::Landsat7 => &self.landsat7,
            Sensor::Landsat8 => &self.landsat8,
        }
    }
}

/// Data access and compute primitives used by the pipeline
pub trait RasterBackend: Send + Sync {
    /// Images of `dataset` acquired in `range` whose footprint meets `bounds`
    fn fetch_series(
        &self,
        dataset: &str,
        range: &DateRange,
        bounds: &Geometry<f64>,
    ) -> RsrResult<RasterTimeSeries>;

    /// A static (single-date) raster such as an elevation model
    fn fetch_image(&self, dataset: &str) -> RsrResult<RasterImage>;

    /// Bandless output for an empty series
    fn reduce_series(
        &self,
        series: &RasterTimeSeries,
        statistic: Statistic,
    ) -> RsrResult<RasterImage> {
        composite::reduce_series(series, statistic)
    }

    fn neighborhood_reduce(
        &self,
        image: &RasterImage,
        kernel: &Kernel,
        statistic: Statistic,
    ) -> RsrResult<RasterImage> {
        neighborhood::neighborhood_reduce(image, kernel, statistic)
    }

    fn sample_image(&self, image: &RasterImage, params: &SampleParams) -> RsrResult<Vec<Sample>> {
        sampling::sample_image(image, params)
    }

    fn stratified_sample(
        &self,
        image: &RasterImage,
        params: &StratifiedSampleParams,
    ) -> RsrResult<Vec<Sample>> {
        sampling::stratified_sample(image, params)
    }

    /// Slope and aspect bands in degrees
    fn terrain(&self, dem: &RasterImage) -> RsrResult<RasterImage> {
        terrain::slope_aspect(dem)
    }

    /// Grey-level co-occurrence measures of a quantised image
    fn glcm_texture(&self, image: &RasterImage, size: usize) -> RsrResult<RasterImage> {
        texture::glcm_texture(image, size)
    }

    /// Per-band mean over `geometry`; `None` for a bandless image
    fn reduce_region(
        &self,
        image: &RasterImage,
        geometry: &Geometry<f64>,
        scale: f64,
    ) -> RsrResult<Option<PropertyMap>> {
        sampling::reduce_region(image, geometry, scale)
    }
}
