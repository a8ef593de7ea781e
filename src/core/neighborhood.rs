use crate::core::composite::Statistic;
use crate::core::indices::SpectralIndex;
use crate::core::kernel::{create_kernel, Kernel};
use crate::io::backend::RasterBackend;
use crate::raster::{build_grid, RasterImage, RasterTimeSeries};
use crate::types::RsrResult;
use serde::{Deserialize, Serialize};

/// Pixel radii at which neighbourhood metrics are computed
pub const PIXEL_RADII: [usize; 4] = [1, 2, 3, 4];

/// Reduce every band over a kernel neighbourhood
///
/// Only neighbours that are valid and carry non-zero weight contribute, with
/// weights renormalised over them. The output is masked where the focal pixel
/// is masked or no neighbour is valid. Bands are renamed `<band>_<statistic>`.
pub fn neighborhood_reduce(
    image: &RasterImage,
    kernel: &Kernel,
    statistic: Statistic,
) -> RsrResult<RasterImage> {
    let (rows, cols) = image.shape();
    let offsets = kernel.offsets();
    log::trace!(
        "Neighbourhood {:?} with {}x{} kernel over {}x{} grid",
        statistic,
        kernel.size(),
        kernel.size(),
        rows,
        cols
    );

    let mut bands = Vec::with_capacity(image.num_bands());
    for band in image.bands() {
        let data = &band.data;
        let reduced = build_grid((rows, cols), |r, c| {
            if data[[r, c]].is_nan() {
                return f64::NAN;
            }
            let mut pairs: Vec<(f64, f64)> = offsets
                .iter()
                .filter_map(|&(dr, dc, w)| {
                    let nr = r as isize + dr;
                    let nc = c as isize + dc;
                    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                        return None;
                    }
                    let v = data[[nr as usize, nc as usize]];
                    (!v.is_nan()).then_some((v, w))
                })
                .collect();
            statistic.apply_weighted(&mut pairs).unwrap_or(f64::NAN)
        });
        bands.push((format!("{}_{}", band.name, statistic.suffix()), reduced));
    }

    let mut out = RasterImage::new(*image.transform(), image.shape()).resample(image.resample_method());
    if let Some(t) = image.acquired() {
        out = out.with_acquired(t);
    }
    for (name, data) in bands {
        out = out.with_band(&name, data)?;
    }
    Ok(out)
}

/// Neighbourhood metric of a pre-fire index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborhoodMetric {
    /// Neighbourhood standard deviation
    Heterogeneity,
    /// Neighbourhood mean
    FocalMean,
}

impl NeighborhoodMetric {
    pub fn statistic(&self) -> Statistic {
        match self {
            NeighborhoodMetric::Heterogeneity => Statistic::StdDev,
            NeighborhoodMetric::FocalMean => Statistic::Mean,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            NeighborhoodMetric::Heterogeneity => "het",
            NeighborhoodMetric::FocalMean => "focal_mean",
        }
    }

    /// Output band name, e.g. `het_ndvi_2`
    pub fn band_name(&self, index: SpectralIndex, radius: usize) -> String {
        format!("{}_{}_{}", self.prefix(), index.band_name(), radius)
    }
}

/// Median over the pre-fire series of a per-image neighbourhood metric
///
/// `None` when the pre-fire series is empty.
pub fn pre_fire_neighborhood(
    backend: &dyn RasterBackend,
    pre_fire: &RasterTimeSeries,
    index: SpectralIndex,
    metric: NeighborhoodMetric,
    pixel_radius: usize,
) -> RsrResult<Option<RasterImage>> {
    if pre_fire.is_empty() {
        return Ok(None);
    }
    let kernel = create_kernel(pixel_radius);
    let per_image = pre_fire.try_map(|img| {
        let index_img = index.compute(img)?;
        backend.neighborhood_reduce(&index_img, &kernel, metric.statistic())
    })?;
    let reduced = backend.reduce_series(&per_image, Statistic::Median)?;
    match reduced.into_present() {
        Some(img) => Ok(Some(img.rename(&[metric.band_name(index, pixel_radius)])?)),
        None => Ok(None),
    }
}

/// Roughness of an elevation surface: neighbourhood standard deviation
pub fn roughness(
    backend: &dyn RasterBackend,
    elevation: &RasterImage,
    pixel_radius: usize,
) -> RsrResult<RasterImage> {
    let kernel = create_kernel(pixel_radius);
    backend
        .neighborhood_reduce(elevation, &kernel, Statistic::StdDev)?
        .rename(&[format!("topo_roughness_{}", pixel_radius)])
}
