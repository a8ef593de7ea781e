use crate::core::indices::CANONICAL_BANDS;
use crate::io::backend::{DatasetCatalog, RasterBackend};
use crate::raster::{RasterImage, RasterTimeSeries, ResampleMethod};
use crate::types::{DateRange, RsrError, RsrResult};
use geo::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Packed per-pixel quality band
pub const QA_BAND: &str = "pixel_qa";

/// Image property recording which sensor mapping produced the canonical bands
pub const HARMONIZED_FROM: &str = "harmonized_from";

/// Landsat sensor generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sensor {
    Landsat4,
    Landsat5,
    Landsat7,
    Landsat8,
}

impl Sensor {
    pub const ALL: [Sensor; 4] = [
        Sensor::Landsat4,
        Sensor::Landsat5,
        Sensor::Landsat7,
        Sensor::Landsat8,
    ];

    pub fn code(&self) -> char {
        match self {
            Sensor::Landsat4 => '4',
            Sensor::Landsat5 => '5',
            Sensor::Landsat7 => '7',
            Sensor::Landsat8 => '8',
        }
    }

    pub fn from_code(code: char) -> RsrResult<Self> {
        match code {
            '4' => Ok(Sensor::Landsat4),
            '5' => Ok(Sensor::Landsat5),
            '7' => Ok(Sensor::Landsat7),
            '8' => Ok(Sensor::Landsat8),
            other => Err(RsrError::Configuration(format!(
                "Unknown sensor code '{}' (expected 4, 5, 7 or 8)",
                other
            ))),
        }
    }

    /// Native band feeding each canonical slot B1..B7
    ///
    /// The OLI sensor shifts its visible bands up by one and has its
    /// thermal band at B10.
    pub fn native_bands(&self) -> [&'static str; 7] {
        match self {
            Sensor::Landsat8 => ["B2", "B3", "B4", "B5", "B6", "B10", "B7"],
            _ => CANONICAL_BANDS,
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Landsat {}", self.code())
    }
}

/// Enabled sensors, written as a string of codes such as "4578"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SensorSet(BTreeSet<Sensor>);

impl SensorSet {
    pub fn all() -> Self {
        Self(Sensor::ALL.into_iter().collect())
    }

    pub fn contains(&self, sensor: Sensor) -> bool {
        self.0.contains(&sensor)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SensorSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for SensorSet {
    type Err = RsrError;

    fn from_str(s: &str) -> RsrResult<Self> {
        let sensors = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .map(Sensor::from_code)
            .collect::<RsrResult<BTreeSet<_>>>()?;
        if sensors.is_empty() {
            return Err(RsrError::Configuration(
                "At least one sensor must be enabled".to_string(),
            ));
        }
        Ok(Self(sensors))
    }
}

impl TryFrom<String> for SensorSet {
    type Error = RsrError;

    fn try_from(s: String) -> RsrResult<Self> {
        s.parse()
    }
}

impl From<SensorSet> for String {
    fn from(set: SensorSet) -> String {
        set.to_string()
    }
}

impl fmt::Display for SensorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sensor in &self.0 {
            write!(f, "{}", sensor.code())?;
        }
        Ok(())
    }
}

impl FromIterator<Sensor> for SensorSet {
    fn from_iter<I: IntoIterator<Item = Sensor>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Quality-band bit tests; a pixel survives only if every enabled flag is clear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityMaskParams {
    pub mask_cloud: bool,
    pub mask_cloud_shadow: bool,
    pub mask_water: bool,
    pub mask_snow: bool,
}

impl QualityMaskParams {
    pub const WATER_BIT: u32 = 1 << 2;
    pub const CLOUD_SHADOW_BIT: u32 = 1 << 3;
    pub const SNOW_BIT: u32 = 1 << 4;
    pub const CLOUD_BIT: u32 = 1 << 5;

    /// Union of the enabled flag bits
    pub fn bitmask(&self) -> u32 {
        let mut bits = 0;
        if self.mask_cloud {
            bits |= Self::CLOUD_BIT;
        }
        if self.mask_cloud_shadow {
            bits |= Self::CLOUD_SHADOW_BIT;
        }
        if self.mask_water {
            bits |= Self::WATER_BIT;
        }
        if self.mask_snow {
            bits |= Self::SNOW_BIT;
        }
        bits
    }
}

impl Default for QualityMaskParams {
    fn default() -> Self {
        Self {
            mask_cloud: true,
            mask_cloud_shadow: true,
            mask_water: true,
            mask_snow: true,
        }
    }
}

/// Project a native sensor image onto `B1..B7` plus the quality band
///
/// Images already carrying the harmonisation marker are returned unchanged.
pub fn harmonize_image(image: &RasterImage, sensor: Sensor) -> RsrResult<RasterImage> {
    if image.property(HARMONIZED_FROM).is_some() {
        return Ok(image.clone());
    }

    let native = sensor.native_bands();
    let mut pairs: Vec<(&str, &str)> = native
        .iter()
        .copied()
        .zip(CANONICAL_BANDS.iter().copied())
        .collect();
    pairs.push((QA_BAND, QA_BAND));

    Ok(image
        .select_renamed(&pairs)?
        .with_property(HARMONIZED_FROM, sensor.code().to_string()))
}

/// Mask pixels whose quality code has any enabled flag set
///
/// A masked quality value masks the pixel too.
pub fn quality_mask(image: RasterImage, params: &QualityMaskParams) -> RsrResult<RasterImage> {
    let bits = params.bitmask();
    let qa = image.require_band(QA_BAND)?;
    let keep = qa.mapv(|v| v.is_finite() && (v as u32) & bits == 0);
    image.update_mask(&keep)
}

/// Merges the enabled sensors into one masked, canonical series
pub struct SourceHarmonizer {
    sensors: SensorSet,
    resample: ResampleMethod,
    quality: QualityMaskParams,
    catalog: DatasetCatalog,
}

impl SourceHarmonizer {
    pub fn new(sensors: SensorSet, resample: ResampleMethod, catalog: DatasetCatalog) -> Self {
        Self {
            sensors,
            resample,
            quality: QualityMaskParams::default(),
            catalog,
        }
    }

    pub fn with_quality(mut self, quality: QualityMaskParams) -> Self {
        self.quality = quality;
        self
    }

    /// Concatenate the harmonised series of every enabled sensor
    pub fn merge_collections(
        &self,
        backend: &dyn RasterBackend,
        range: &DateRange,
        bounds: &Geometry<f64>,
    ) -> RsrResult<RasterTimeSeries> {
        let mut merged = RasterTimeSeries::empty();
        for sensor in Sensor::ALL {
            if !self.sensors.contains(sensor) {
                continue;
            }
            let dataset = self.catalog.sensor_dataset(sensor);
            let series = backend.fetch_series(dataset, range, bounds)?;
            log::debug!("{}: {} images in {}", sensor, series.len(), range);
            let harmonized = series.try_map(|img| harmonize_image(img, sensor))?;
            merged = merged.merge(harmonized);
        }
        Ok(merged)
    }

    /// Resample then quality-mask one harmonised image
    pub fn prepare_image(&self, image: &RasterImage) -> RsrResult<RasterImage> {
        let image = match self.resample {
            ResampleMethod::None => image.clone(),
            method => image.clone().resample(method),
        };
        quality_mask(image, &self.quality)
    }

    /// Masked canonical series for `range` over `bounds`
    pub fn collect(
        &self,
        backend: &dyn RasterBackend,
        range: &DateRange,
        bounds: &Geometry<f64>,
    ) -> RsrResult<RasterTimeSeries> {
        let merged = self.merge_collections(backend, range, bounds)?;
        merged.try_map(|img| self.prepare_image(img))
    }
}
