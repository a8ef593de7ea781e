use crate::raster::RasterImage;
use crate::types::RsrResult;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical reflectance bands exposed by every harmonised image
pub const CANONICAL_BANDS: [&str; 7] = ["B1", "B2", "B3", "B4", "B5", "B6", "B7"];

/// Spectral indices derived from canonical bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectralIndex {
    /// Normalized difference vegetation index
    Ndvi,
    /// Normalized difference moisture index
    Ndmi,
    /// Enhanced vegetation index
    Evi,
    /// Normalized burn ratio
    Nbr,
    /// Normalized burn ratio 2
    Nbr2,
}

impl SpectralIndex {
    pub const ALL: [SpectralIndex; 5] = [
        SpectralIndex::Ndvi,
        SpectralIndex::Ndmi,
        SpectralIndex::Evi,
        SpectralIndex::Nbr,
        SpectralIndex::Nbr2,
    ];

    /// Lower-case band name of the index image
    pub fn band_name(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "ndvi",
            SpectralIndex::Ndmi => "ndmi",
            SpectralIndex::Evi => "evi",
            SpectralIndex::Nbr => "nbr",
            SpectralIndex::Nbr2 => "nbr2",
        }
    }

    /// Upper-case label used in change metric names (dNBR, RdNDVI)
    pub fn label(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Ndmi => "NDMI",
            SpectralIndex::Evi => "EVI",
            SpectralIndex::Nbr => "NBR",
            SpectralIndex::Nbr2 => "NBR2",
        }
    }

    /// Compute the index for one harmonised image
    ///
    /// The result keeps the source grid, acquisition time and properties.
    pub fn compute(&self, image: &RasterImage) -> RsrResult<RasterImage> {
        let data = match self {
            SpectralIndex::Ndvi => normalized_difference(image, "B4", "B3")?,
            SpectralIndex::Ndmi => normalized_difference(image, "B4", "B5")?,
            SpectralIndex::Nbr => normalized_difference(image, "B4", "B7")?,
            SpectralIndex::Nbr2 => normalized_difference(image, "B5", "B7")?,
            SpectralIndex::Evi => enhanced_vegetation_index(image)?,
        };
        Ok(RasterImage::from_like(image, self.band_name(), data)?
            .copy_properties(image.properties()))
    }
}

impl fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// (X - Y) / (X + Y) per pixel
pub fn normalized_difference(image: &RasterImage, x: &str, y: &str) -> RsrResult<Array2<f64>> {
    let a = image.require_band(x)?;
    let b = image.require_band(y)?;
    Ok(Zip::from(a).and(b).map_collect(|&a, &b| (a - b) / (a + b)))
}

/// 2.5 (B4 - B3) / (B4 + 6 B3 - 7.5 B1 + 1)
fn enhanced_vegetation_index(image: &RasterImage) -> RsrResult<Array2<f64>> {
    let nir = image.require_band("B4")?;
    let red = image.require_band("B3")?;
    let blue = image.require_band("B1")?;
    Ok(Zip::from(nir)
        .and(red)
        .and(blue)
        .map_collect(|&nir, &red, &blue| 2.5 * (nir - red) / (nir + 6.0 * red - 7.5 * blue + 1.0)))
}

/// Canonical reflectance bands only, dropping quality and any extras
pub fn raw_bands(image: &RasterImage) -> RsrResult<RasterImage> {
    image.select(&CANONICAL_BANDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_abs_diff_eq;

    fn reflectance(values: [f64; 7]) -> RasterImage {
        let bands = CANONICAL_BANDS
            .iter()
            .zip(values)
            .map(|(name, v)| (name.to_string(), Array2::from_elem((2, 2), v)))
            .collect();
        RasterImage::from_bands(GeoTransform::default(), bands).unwrap()
    }

    #[test]
    fn test_index_formulas() {
        let img = reflectance([0.05, 0.08, 0.1, 0.4, 0.2, 0.3, 0.1]);

        let v = |idx: SpectralIndex| idx.compute(&img).unwrap().band(idx.band_name()).unwrap()[[0, 0]];
        assert_abs_diff_eq!(v(SpectralIndex::Ndvi), 0.3 / 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(v(SpectralIndex::Ndmi), 0.2 / 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(v(SpectralIndex::Nbr), 0.3 / 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(v(SpectralIndex::Nbr2), 0.1 / 0.3, epsilon = 1e-12);

        let expected_evi = 2.5 * 0.3 / (0.4 + 0.6 - 0.375 + 1.0);
        assert_abs_diff_eq!(v(SpectralIndex::Evi), expected_evi, epsilon = 1e-12);
    }

    #[test]
    fn test_index_is_pure() {
        let img = reflectance([0.05, 0.08, 0.1, 0.4, 0.2, 0.3, 0.1]);
        let first = SpectralIndex::Ndvi.compute(&img).unwrap();
        let second = SpectralIndex::Ndvi.compute(&img).unwrap();
        assert_eq!(first.band("ndvi"), second.band("ndvi"));
        assert_eq!(img.num_bands(), 7);
    }

    #[test]
    fn test_masked_pixels_stay_masked() {
        let mut img = reflectance([0.05, 0.08, 0.1, 0.4, 0.2, 0.3, 0.1]);
        let keep = ndarray::array![[true, false], [true, true]];
        img = img.update_mask(&keep).unwrap();
        let out = SpectralIndex::Nbr.compute(&img).unwrap();
        assert!(out.band("nbr").unwrap()[[0, 1]].is_nan());
    }

    #[test]
    fn test_missing_band_is_an_error() {
        let img = reflectance([0.0; 7]).select(&["B1", "B2"]).unwrap();
        assert!(SpectralIndex::Ndvi.compute(&img).is_err());
        assert!(raw_bands(&img).is_err());
    }
}
