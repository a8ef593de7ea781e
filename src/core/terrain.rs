use crate::core::neighborhood::{roughness, PIXEL_RADII};
use crate::io::backend::RasterBackend;
use crate::raster::{RasterImage, ResampleMethod};
use crate::types::{RsrError, RsrResult};
use ndarray::Array2;

/// Slope and aspect (degrees) of the first band of an elevation image
///
/// Aspect is measured clockwise from north and points downslope; flat
/// cells report 0. Edge rows and columns copy the nearest interior value.
pub fn slope_aspect(dem: &RasterImage) -> RsrResult<RasterImage> {
    let elevation = match dem.first_band() {
        Some(band) => &band.data,
        None => {
            return Err(RsrError::Processing(
                "Elevation image has no bands".to_string(),
            ))
        }
    };
    let (dx, dy) = dem.transform().pixel_size();
    log::debug!("Calculating slope and aspect, pixel spacing {}x{}", dx, dy);

    let (height, width) = elevation.dim();
    let mut slope = Array2::from_elem((height, width), f64::NAN);
    let mut aspect = Array2::from_elem((height, width), f64::NAN);

    for i in 1..height.saturating_sub(1) {
        for j in 1..width.saturating_sub(1) {
            // Central differences; rows run south so north is i - 1
            let dz_dx = (elevation[[i, j + 1]] - elevation[[i, j - 1]]) / (2.0 * dx);
            let dz_dy = (elevation[[i - 1, j]] - elevation[[i + 1, j]]) / (2.0 * dy);

            slope[[i, j]] = dz_dx.hypot(dz_dy).atan().to_degrees();

            aspect[[i, j]] = if dz_dx == 0.0 && dz_dy == 0.0 {
                0.0
            } else {
                (-dz_dx).atan2(-dz_dy).to_degrees().rem_euclid(360.0)
            };
        }
    }

    fill_edge_values(&mut slope)?;
    fill_edge_values(&mut aspect)?;

    RasterImage::from_like(dem, "slope", slope)?.with_band("aspect", aspect)
}

/// Copy edge rows and columns from the nearest interior pixels
fn fill_edge_values(array: &mut Array2<f64>) -> RsrResult<()> {
    let (height, width) = array.dim();

    if height < 3 || width < 3 {
        return Err(RsrError::Processing(format!(
            "Elevation grid {}x{} too small for terrain derivatives",
            height, width
        )));
    }

    for j in 0..width {
        array[[0, j]] = array[[1, j]];
        array[[height - 1, j]] = array[[height - 2, j]];
    }
    for i in 0..height {
        array[[i, 0]] = array[[i, 1]];
        array[[i, width - 1]] = array[[i, width - 2]];
    }

    Ok(())
}

/// Static terrain bands for one feature
#[derive(Debug, Clone)]
pub struct TerrainLayers {
    pub slope: RasterImage,
    pub aspect: RasterImage,
    pub elev: RasterImage,
    /// `topo_roughness_1` .. `topo_roughness_4`
    pub roughness: Vec<RasterImage>,
}

impl TerrainLayers {
    /// Derive terrain from an elevation raster, honouring the resample mode
    pub fn derive(
        backend: &dyn RasterBackend,
        dem: &RasterImage,
        resample: ResampleMethod,
    ) -> RsrResult<Self> {
        let source = dem
            .first_band()
            .map(|b| b.name.clone())
            .ok_or_else(|| RsrError::Processing("Elevation image has no bands".to_string()))?;
        let elev = dem
            .select(&[source.as_str()])?
            .rename(&["elev"])?
            .resample(resample);

        let terrain = backend.terrain(&elev)?.resample(resample);
        let slope = terrain.select(&["slope"])?;
        let aspect = terrain.select(&["aspect"])?;

        let roughness = PIXEL_RADII
            .iter()
            .map(|&r| roughness(backend, &elev, r))
            .collect::<RsrResult<Vec<_>>>()?;

        Ok(Self {
            slope,
            aspect,
            elev,
            roughness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::MemoryBackend;
    use crate::types::GeoTransform;
    use approx::assert_abs_diff_eq;

    fn dem(f: impl Fn(usize, usize) -> f64) -> RasterImage {
        let data = Array2::from_shape_fn((5, 5), |(r, c)| f(r, c));
        RasterImage::from_bands(GeoTransform::north_up(0.0, 150.0, 30.0), vec![("elevation".to_string(), data)])
            .unwrap()
    }

    #[test]
    fn test_east_facing_slope() {
        // falls 30 m per pixel towards the east
        let img = dem(|_, c| 1000.0 - 30.0 * c as f64);
        let out = slope_aspect(&img).unwrap();
        assert_abs_diff_eq!(out.band("slope").unwrap()[[2, 2]], 45.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out.band("aspect").unwrap()[[2, 2]], 90.0, epsilon = 1e-9);
        // edges copy the interior
        assert_abs_diff_eq!(out.band("slope").unwrap()[[0, 0]], 45.0, epsilon = 1e-9);
    }

    #[test]
    fn test_north_and_south_facing_slopes() {
        // rows run south: elevation rising with row faces north
        let north = slope_aspect(&dem(|r, _| 100.0 + 10.0 * r as f64)).unwrap();
        assert_abs_diff_eq!(north.band("aspect").unwrap()[[2, 2]], 0.0, epsilon = 1e-9);

        let south = slope_aspect(&dem(|r, _| 100.0 - 10.0 * r as f64)).unwrap();
        assert_abs_diff_eq!(south.band("aspect").unwrap()[[2, 2]], 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flat_terrain() {
        let out = slope_aspect(&dem(|_, _| 250.0)).unwrap();
        assert_eq!(out.band("slope").unwrap()[[2, 2]], 0.0);
        assert_eq!(out.band("aspect").unwrap()[[2, 2]], 0.0);
    }

    #[test]
    fn test_terrain_layers() {
        let backend = MemoryBackend::new();
        let layers =
            TerrainLayers::derive(&backend, &dem(|r, c| (r * c) as f64), ResampleMethod::Bilinear)
                .unwrap();
        assert_eq!(layers.elev.band_names(), vec!["elev"]);
        assert_eq!(layers.elev.resample_method(), ResampleMethod::Bilinear);
        let names: Vec<String> = layers
            .roughness
            .iter()
            .map(|img| img.band_names()[0].to_string())
            .collect();
        assert_eq!(
            names,
            vec!["topo_roughness_1", "topo_roughness_2", "topo_roughness_3", "topo_roughness_4"]
        );
    }

    #[test]
    fn test_small_grid_is_rejected() {
        let data = Array2::zeros((2, 2));
        let img = RasterImage::from_bands(GeoTransform::default(), vec![("e".to_string(), data)]).unwrap();
        assert!(slope_aspect(&img).is_err());
    }
}
