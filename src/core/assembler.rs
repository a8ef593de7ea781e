use crate::core::composite::Statistic;
use crate::core::harmonize::{QualityMaskParams, SensorSet, SourceHarmonizer};
use crate::core::indices::{raw_bands, SpectralIndex};
use crate::core::neighborhood::{pre_fire_neighborhood, NeighborhoodMetric, PIXEL_RADII};
use crate::core::severity::{FireSeries, SeverityMetrics};
use crate::core::terrain::TerrainLayers;
use crate::core::texture::{gearys_c, quantize, TEXTURE_SIZES};
use crate::core::weather::{weather_group, WeatherParams, WeatherVariable};
use crate::core::window::{resolve_windows, TimeWindow};
use crate::io::backend::{DatasetCatalog, RasterBackend};
use crate::raster::{build_grid, RasterImage, RasterTimeSeries, ResampleMethod};
use crate::types::{Feature, PropertyMap, RsrError, RsrResult};
use chrono::Datelike;
use geo::Geometry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Variable set produced per feature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AssemblyMode {
    /// Omits EVI, texture and spatial autocorrelation bands
    #[default]
    Lite,
    Full {
        /// Quantisation factor for NDVI texture (1..=255)
        gray_levels: u8,
    },
}

/// Per-invocation assembly configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyParams {
    pub time_window: TimeWindow,
    pub resample: ResampleMethod,
    pub sensors: SensorSet,
    pub mode: AssemblyMode,
    pub quality_mask: QualityMaskParams,
    pub weather: WeatherParams,
}

impl Default for AssemblyParams {
    fn default() -> Self {
        Self {
            time_window: TimeWindow::Days(48),  // Reference compositing window
            resample: ResampleMethod::None,
            sensors: SensorSet::all(),
            mode: AssemblyMode::Lite,
            quality_mask: QualityMaskParams::default(),
            weather: WeatherParams::default(),
        }
    }
}

impl AssemblyParams {
    pub fn validate(&self) -> RsrResult<()> {
        self.time_window.validate()?;
        if self.sensors.is_empty() {
            return Err(RsrError::Configuration(
                "At least one sensor must be enabled".to_string(),
            ));
        }
        if let AssemblyMode::Full { gray_levels: 0 } = self.mode {
            return Err(RsrError::Configuration(
                "gray_levels must be between 1 and 255".to_string(),
            ));
        }
        Ok(())
    }
}

/// All variables for one feature on a common grid
#[derive(Debug, Clone)]
pub struct VariableBundle {
    image: RasterImage,
}

impl VariableBundle {
    pub fn image(&self) -> &RasterImage {
        &self.image
    }

    pub fn into_image(self) -> RasterImage {
        self.image
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.image.band_names()
    }

    pub fn properties(&self) -> &PropertyMap {
        self.image.properties()
    }

    /// Mask everything outside `geometry`
    pub fn clip(self, geometry: &Geometry<f64>) -> RsrResult<Self> {
        Ok(Self {
            image: self.image.clip(geometry)?,
        })
    }
}

/// Ordered band stack that collapses if any required layer is absent
struct BandStack {
    image: Option<RasterImage>,
    missing: Vec<String>,
}

impl BandStack {
    fn new() -> Self {
        Self {
            image: None,
            missing: Vec::new(),
        }
    }

    fn push(&mut self, label: &str, layer: Option<RasterImage>) -> RsrResult<()> {
        match layer {
            Some(layer) => {
                self.image = Some(match self.image.take() {
                    Some(acc) => acc.add_bands(&layer)?,
                    None => layer,
                });
            }
            None => self.missing.push(label.to_string()),
        }
        Ok(())
    }

    fn push_present(&mut self, layer: RasterImage) -> RsrResult<()> {
        self.push("", Some(layer))
    }

    fn finish(self) -> Result<RasterImage, Vec<String>> {
        match (self.image, self.missing.is_empty()) {
            (Some(image), true) => Ok(image),
            (_, true) => Err(vec!["bands".to_string()]),
            (_, false) => Err(self.missing),
        }
    }
}

/// Composes every variable of a feature into one multi-band image
///
/// Data access goes through the injected backend and dataset catalog.
pub struct FeatureAssembler {
    backend: Arc<dyn RasterBackend>,
    catalog: DatasetCatalog,
}

impl FeatureAssembler {
    pub fn new(backend: Arc<dyn RasterBackend>, catalog: DatasetCatalog) -> Self {
        Self { backend, catalog }
    }

    pub fn backend(&self) -> &dyn RasterBackend {
        self.backend.as_ref()
    }

    pub fn catalog(&self) -> &DatasetCatalog {
        &self.catalog
    }

    /// Masked, harmonised pre- and post-fire series for a feature
    pub fn fire_series(&self, feature: &Feature, params: &AssemblyParams) -> RsrResult<FireSeries> {
        let windows = resolve_windows(feature, params.time_window)?;
        let harmonizer = SourceHarmonizer::new(
            params.sensors.clone(),
            params.resample,
            self.catalog.clone(),
        )
        .with_quality(params.quality_mask);

        let backend = self.backend();
        Ok(FireSeries {
            pre: harmonizer.collect(backend, &windows.pre, &feature.geometry)?,
            post: harmonizer.collect(backend, &windows.post, &feature.geometry)?,
        })
    }

    /// Assemble the variable bundle; `None` when any required input is absent
    pub fn assemble(
        &self,
        feature: &Feature,
        params: &AssemblyParams,
    ) -> RsrResult<Option<VariableBundle>> {
        params.validate()?;
        log::debug!(
            "Assembling {:?} variables: window {}, resample {}, sensors {}",
            params.mode,
            params.time_window,
            params.resample,
            params.sensors
        );

        let series = self.fire_series(feature, params)?;
        log::debug!(
            "{} pre-fire and {} post-fire acquisitions",
            series.pre.len(),
            series.post.len()
        );

        let backend = self.backend();
        let nbr = SeverityMetrics::from_series(backend, &series, SpectralIndex::Nbr)?;
        let core = match params.mode {
            AssemblyMode::Full { .. } => &nbr.delta,
            AssemblyMode::Lite => &nbr.relativized,
        };
        let reference = match core {
            Some(img) => img.clone(),
            None => {
                log::warn!(
                    "No severity for feature with alarm date {}: missing imagery",
                    feature.alarm_date
                );
                return Ok(None);
            }
        };

        let stacked = match params.mode {
            AssemblyMode::Full { gray_levels } => {
                self.full_stack(feature, params, &series, nbr, &reference, gray_levels)?
            }
            AssemblyMode::Lite => self.lite_stack(feature, params, &series, nbr, &reference)?,
        };

        match stacked.finish() {
            Ok(image) => {
                let image = image.copy_properties(&feature.scalar_properties());
                log::debug!("Assembled {} bands", image.num_bands());
                Ok(Some(VariableBundle { image }))
            }
            Err(missing) => {
                log::warn!(
                    "Variables absent for feature with alarm date {}: {:?}",
                    feature.alarm_date,
                    missing
                );
                Ok(None)
            }
        }
    }

    fn full_stack(
        &self,
        feature: &Feature,
        params: &AssemblyParams,
        series: &FireSeries,
        nbr: SeverityMetrics,
        reference: &RasterImage,
        gray_levels: u8,
    ) -> RsrResult<BandStack> {
        let backend = self.backend();
        let nbr2 = SeverityMetrics::from_series(backend, series, SpectralIndex::Nbr2)?;
        let ndvi = SeverityMetrics::from_series(backend, series, SpectralIndex::Ndvi)?;
        let evi = SeverityMetrics::from_series(backend, series, SpectralIndex::Evi)?;
        let ndmi = SeverityMetrics::from_series(backend, series, SpectralIndex::Ndmi)?;

        let mut stack = BandStack::new();
        stack.push("dNBR", nbr.delta.clone())?;
        stack.push("preFire_nbr", nbr.composites.pre_named()?)?;
        stack.push("postFire_nbr", nbr.composites.post_named()?)?;
        stack.push("RdNBR", nbr.relativized.clone())?;
        stack.push("dNBR2", nbr2.delta.clone())?;
        stack.push("preFire_nbr2", nbr2.composites.pre_named()?)?;
        stack.push("postFire_nbr2", nbr2.composites.post_named()?)?;
        stack.push("RdNBR2", nbr2.relativized.clone())?;
        stack.push("dNDVI", ndvi.delta.clone())?;
        stack.push("RdNDVI", ndvi.relativized.clone())?;
        stack.push("dEVI", evi.delta.clone())?;
        stack.push("RdEVI", evi.relativized.clone())?;
        stack.push("RBR", nbr.relative_ratio("RBR")?)?;
        stack.push("RVI", ndvi.relative_ratio("RVI")?)?;
        stack.push("preFire_ndvi", ndvi.composites.pre_named()?)?;
        stack.push("postFire_ndvi", ndvi.composites.post_named()?)?;
        stack.push("preFire_ndmi", ndmi.composites.pre_named()?)?;
        stack.push("postFire_ndmi", ndmi.composites.post_named()?)?;
        stack.push("preFire_evi", evi.composites.pre_named()?)?;
        stack.push("postFire_evi", evi.composites.post_named()?)?;

        let per_radius = [
            (NeighborhoodMetric::Heterogeneity, SpectralIndex::Ndvi),
            (NeighborhoodMetric::Heterogeneity, SpectralIndex::Ndmi),
            (NeighborhoodMetric::FocalMean, SpectralIndex::Ndvi),
            (NeighborhoodMetric::FocalMean, SpectralIndex::Ndmi),
        ];
        self.push_neighborhoods(&mut stack, &series.pre, &per_radius)?;

        self.push_static_layers(&mut stack, feature, params, reference)?;

        // Texture and autocorrelation of the quantised pre-fire NDVI
        match ndvi.composites.pre.as_ref() {
            Some(pre_ndvi) => {
                let quantized = quantize(pre_ndvi, gray_levels);
                for size in TEXTURE_SIZES {
                    let texture = backend
                        .glcm_texture(&quantized, size)?
                        .suffix_bands(&format!("_{}", size));
                    stack.push_present(texture)?;
                }
                stack.push_present(gearys_c(&quantized)?)?;
            }
            None => stack.push("texture", None)?,
        }

        self.push_raw_composites(&mut stack, series)?;

        let weather = weather_group(
            backend,
            &self.catalog.gridmet,
            feature,
            &WeatherVariable::FULL,
            &params.weather,
            params.resample,
        )?;
        stack.push("weather", weather)?;
        Ok(stack)
    }

    fn lite_stack(
        &self,
        feature: &Feature,
        params: &AssemblyParams,
        series: &FireSeries,
        nbr: SeverityMetrics,
        reference: &RasterImage,
    ) -> RsrResult<BandStack> {
        let backend = self.backend();
        let ndvi = SeverityMetrics::from_series(backend, series, SpectralIndex::Ndvi)?;

        let mut stack = BandStack::new();
        stack.push("RdNBR", nbr.relativized.clone())?;
        stack.push("preFire_nbr", nbr.composites.pre_named()?)?;
        stack.push("postFire_nbr", nbr.composites.post_named()?)?;
        stack.push("RdNDVI", ndvi.relativized.clone())?;
        stack.push("RBR", nbr.relative_ratio("RBR")?)?;
        stack.push("preFire_ndvi", ndvi.composites.pre_named()?)?;
        stack.push("postFire_ndvi", ndvi.composites.post_named()?)?;

        let per_radius = [
            (NeighborhoodMetric::Heterogeneity, SpectralIndex::Ndvi),
            (NeighborhoodMetric::FocalMean, SpectralIndex::Ndvi),
        ];
        self.push_neighborhoods(&mut stack, &series.pre, &per_radius)?;

        self.push_static_layers(&mut stack, feature, params, reference)?;
        self.push_raw_composites(&mut stack, series)?;

        let weather = weather_group(
            backend,
            &self.catalog.gridmet,
            feature,
            &WeatherVariable::LITE,
            &params.weather,
            params.resample,
        )?;
        stack.push("weather", weather)?;
        Ok(stack)
    }

    fn push_neighborhoods(
        &self,
        stack: &mut BandStack,
        pre_fire: &RasterTimeSeries,
        per_radius: &[(NeighborhoodMetric, SpectralIndex)],
    ) -> RsrResult<()> {
        for radius in PIXEL_RADII {
            for &(metric, index) in per_radius {
                let layer = pre_fire_neighborhood(self.backend(), pre_fire, index, metric, radius)?;
                stack.push(&metric.band_name(index, radius), layer)?;
            }
        }
        Ok(())
    }

    /// Date, location, conifer class and terrain bands
    fn push_static_layers(
        &self,
        stack: &mut BandStack,
        feature: &Feature,
        params: &AssemblyParams,
        reference: &RasterImage,
    ) -> RsrResult<()> {
        for date_band in date_bands(feature, reference)? {
            stack.push_present(date_band)?;
        }
        stack.push_present(lon_lat(reference)?)?;

        let conifer = self
            .backend()
            .fetch_image(&self.catalog.conifer)?
            .select_renamed(&[(self.catalog.conifer_band.as_str(), "conifer_forest")])?
            .map_values(f64::trunc);
        stack.push_present(conifer)?;

        let dem = self.backend().fetch_image(&self.catalog.dem)?;
        let terrain = TerrainLayers::derive(self.backend(), &dem, params.resample)?;
        stack.push_present(terrain.slope)?;
        stack.push_present(terrain.aspect)?;
        for rough in terrain.roughness {
            stack.push_present(rough)?;
        }
        stack.push_present(terrain.elev)?;
        Ok(())
    }

    /// Median `B1..B7` either side of the fire as `B*_pre` / `B*_post`
    fn push_raw_composites(&self, stack: &mut BandStack, series: &FireSeries) -> RsrResult<()> {
        for (label, raw) in [("_pre", &series.pre), ("_post", &series.post)] {
            let layer = self
                .backend()
                .reduce_series(raw, Statistic::Median)?
                .into_present()
                .map(|img| raw_bands(&img))
                .transpose()?
                .map(|img| img.suffix_bands(label));
            stack.push(&format!("raw{}", label), layer)?;
        }
        Ok(())
    }
}

/// Constant alarm-date bands on the reference grid
fn date_bands(feature: &Feature, reference: &RasterImage) -> RsrResult<Vec<RasterImage>> {
    let alarm = feature.alarm_date;
    Ok(vec![
        RasterImage::constant(reference, "date", alarm.timestamp_millis() as f64)?,
        RasterImage::constant(reference, "ordinal_day", alarm.ordinal0() as f64)?,
        RasterImage::constant(reference, "alarm_year", alarm.year() as f64)?,
        RasterImage::constant(reference, "alarm_month", alarm.month() as f64)?,
        RasterImage::constant(reference, "alarm_day", alarm.day() as f64)?,
    ])
}

/// Pixel-centre coordinates of the reference grid
fn lon_lat(reference: &RasterImage) -> RsrResult<RasterImage> {
    let transform = *reference.transform();
    let shape = reference.shape();
    let lon = build_grid(shape, |r, c| transform.pixel_center(r, c).0);
    let lat = build_grid(shape, |r, c| transform.pixel_center(r, c).1);
    RasterImage::from_like(reference, "lon", lon)?.with_band("lat", lat)
}
