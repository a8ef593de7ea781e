use crate::core::composite::{index_composite, Statistic};
use crate::core::indices::SpectralIndex;
use crate::io::backend::RasterBackend;
use crate::raster::{RasterImage, RasterTimeSeries};
use crate::types::RsrResult;

/// Offset in the relative burn ratio denominator
pub const RELATIVE_RATIO_OFFSET: f64 = 1.001;

/// Scale of the pre-fire index in the relativized difference
pub const RELATIVIZED_SCALE: f64 = 1000.0;

/// Masked pre- and post-fire canonical series for one feature
#[derive(Debug, Clone, Default)]
pub struct FireSeries {
    pub pre: RasterTimeSeries,
    pub post: RasterTimeSeries,
}

/// Median index composites either side of the fire
#[derive(Debug, Clone)]
pub struct IndexComposites {
    pub index: SpectralIndex,
    pub pre: Option<RasterImage>,
    pub post: Option<RasterImage>,
}

impl IndexComposites {
    pub fn from_series(
        backend: &dyn RasterBackend,
        series: &FireSeries,
        index: SpectralIndex,
    ) -> RsrResult<Self> {
        Ok(Self {
            index,
            pre: index_composite(backend, &series.pre, index, Statistic::Median)?,
            post: index_composite(backend, &series.post, index, Statistic::Median)?,
        })
    }

    /// `preFire_<index>`
    pub fn pre_named(&self) -> RsrResult<Option<RasterImage>> {
        self.pre
            .as_ref()
            .map(|img| img.clone().rename(&[format!("preFire_{}", self.index.band_name())]))
            .transpose()
    }

    /// `postFire_<index>`
    pub fn post_named(&self) -> RsrResult<Option<RasterImage>> {
        self.post
            .as_ref()
            .map(|img| img.clone().rename(&[format!("postFire_{}", self.index.band_name())]))
            .transpose()
    }
}

/// pre - post; absent if either side is absent
pub fn delta(
    pre: Option<&RasterImage>,
    post: Option<&RasterImage>,
    name: &str,
) -> RsrResult<Option<RasterImage>> {
    match (pre, post) {
        (Some(pre), Some(post)) => Ok(Some(pre.combine(post, name, |a, b| a - b)?)),
        _ => Ok(None),
    }
}

/// delta / sqrt(|pre| / 1000)
pub fn relativized_delta(
    delta: Option<&RasterImage>,
    pre: Option<&RasterImage>,
    name: &str,
) -> RsrResult<Option<RasterImage>> {
    match (delta, pre) {
        (Some(delta), Some(pre)) => Ok(Some(delta.combine(pre, name, |d, p| {
            d / (p.abs() / RELATIVIZED_SCALE).sqrt()
        })?)),
        _ => Ok(None),
    }
}

/// delta / (pre + 1.001); RBR for NBR, RVI for NDVI
pub fn relative_ratio(
    delta: Option<&RasterImage>,
    pre: Option<&RasterImage>,
    name: &str,
) -> RsrResult<Option<RasterImage>> {
    match (delta, pre) {
        (Some(delta), Some(pre)) => Ok(Some(
            delta.combine(pre, name, |d, p| d / (p + RELATIVE_RATIO_OFFSET))?,
        )),
        _ => Ok(None),
    }
}

/// Change metrics of one index
#[derive(Debug, Clone)]
pub struct SeverityMetrics {
    pub composites: IndexComposites,
    /// `d<INDEX>`
    pub delta: Option<RasterImage>,
    /// `Rd<INDEX>`
    pub relativized: Option<RasterImage>,
}

impl SeverityMetrics {
    pub fn derive(composites: IndexComposites) -> RsrResult<Self> {
        let label = composites.index.label();
        let delta = delta(
            composites.pre.as_ref(),
            composites.post.as_ref(),
            &format!("d{}", label),
        )?;
        let relativized = relativized_delta(
            delta.as_ref(),
            composites.pre.as_ref(),
            &format!("Rd{}", label),
        )?;
        Ok(Self {
            composites,
            delta,
            relativized,
        })
    }

    pub fn from_series(
        backend: &dyn RasterBackend,
        series: &FireSeries,
        index: SpectralIndex,
    ) -> RsrResult<Self> {
        Self::derive(IndexComposites::from_series(backend, series, index)?)
    }

    /// Relative ratio named `name` (RBR, RVI)
    pub fn relative_ratio(&self, name: &str) -> RsrResult<Option<RasterImage>> {
        relative_ratio(self.delta.as_ref(), self.composites.pre.as_ref(), name)
    }
}
