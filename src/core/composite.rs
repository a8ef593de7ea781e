use crate::io::backend::RasterBackend;
use crate::core::indices::SpectralIndex;
use crate::raster::{build_grid, RasterImage, RasterTimeSeries};
use crate::types::{RsrError, RsrResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Per-pixel reducer applied across a series or a neighbourhood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    /// Central tendency for composites
    Median,
    /// Cumulative weather totals
    Sum,
    Mean,
    /// Population standard deviation
    StdDev,
}

impl Statistic {
    /// Suffix appended to band names by a neighbourhood reduction
    pub fn suffix(&self) -> &'static str {
        match self {
            Statistic::Median => "median",
            Statistic::Sum => "sum",
            Statistic::Mean => "mean",
            Statistic::StdDev => "stdDev",
        }
    }

    /// Reduce unweighted values; `None` when there are none
    pub fn apply(&self, values: &mut [f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        Some(match self {
            Statistic::Median => median(values),
            Statistic::Sum => values.iter().sum(),
            Statistic::Mean => values.iter().sum::<f64>() / n,
            Statistic::StdDev => {
                let mean = values.iter().sum::<f64>() / n;
                (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
            }
        })
    }

    /// Reduce `(value, weight)` pairs; weights are renormalised over the pairs given
    pub fn apply_weighted(&self, pairs: &mut [(f64, f64)]) -> Option<f64> {
        let total: f64 = pairs.iter().map(|(_, w)| w).sum();
        if pairs.is_empty() || total <= 0.0 {
            return None;
        }
        Some(match self {
            Statistic::Median => {
                let mut values: Vec<f64> = pairs.iter().map(|(v, _)| *v).collect();
                median(&mut values)
            }
            Statistic::Sum => pairs.iter().map(|(v, w)| v * w).sum(),
            Statistic::Mean => pairs.iter().map(|(v, w)| v * w).sum::<f64>() / total,
            Statistic::StdDev => {
                let mean = pairs.iter().map(|(v, w)| v * w).sum::<f64>() / total;
                (pairs.iter().map(|(v, w)| w * (v - mean).powi(2)).sum::<f64>() / total).sqrt()
            }
        })
    }
}

/// Median with the two middle values averaged for even counts
pub(crate) fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Reduce a series to one image, per pixel per band, ignoring masked values
///
/// An empty series yields a bandless image. Pixels with no valid
/// observation stay masked.
pub fn reduce_series(series: &RasterTimeSeries, statistic: Statistic) -> RsrResult<RasterImage> {
    let first = match series.images().first() {
        Some(img) => img,
        None => {
            log::debug!("Reducing empty series with {:?}: no bands", statistic);
            return Ok(RasterImage::bandless());
        }
    };

    let names: Vec<String> = first.band_names().iter().map(|s| s.to_string()).collect();
    for img in series.iter() {
        if img.shape() != first.shape() {
            return Err(RsrError::Processing(format!(
                "Series images are on different grids ({:?} vs {:?})",
                img.shape(),
                first.shape()
            )));
        }
        if img.band_names() != first.band_names() {
            return Err(RsrError::Processing(format!(
                "Series band schema mismatch: {:?} vs {:?}",
                img.band_names(),
                first.band_names()
            )));
        }
    }

    log::debug!(
        "Reducing {} images x {} bands with {:?}",
        series.len(),
        names.len(),
        statistic
    );

    let mut out = RasterImage::new(*first.transform(), first.shape())
        .resample(first.resample_method());
    for (b, name) in names.iter().enumerate() {
        let stack: Vec<&Array2<f64>> = series.iter().map(|img| &img.bands()[b].data).collect();
        let reduced = build_grid(first.shape(), |r, c| {
            let mut values: Vec<f64> = stack
                .iter()
                .map(|data| data[[r, c]])
                .filter(|v| !v.is_nan())
                .collect();
            statistic.apply(&mut values).unwrap_or(f64::NAN)
        });
        out = out.with_band(name, reduced)?;
    }
    Ok(out)
}

/// Composite of one index across a series; `None` when the series is empty
pub fn index_composite(
    backend: &dyn RasterBackend,
    series: &RasterTimeSeries,
    index: SpectralIndex,
    statistic: Statistic,
) -> RsrResult<Option<RasterImage>> {
    let mapped = series.try_map(|img| index.compute(img))?;
    Ok(backend.reduce_series(&mapped, statistic)?.into_present())
}
