use crate::raster::{geometry_contains, RasterImage};
use crate::types::{PropertyMap, RsrError, RsrResult};
use geo::{BoundingRect, Geometry, Point};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Simple random sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleParams {
    /// Sampling grid spacing in CRS units
    pub scale: f64,
    pub num_pixels: usize,
    pub seed: u64,
    pub drop_nulls: bool,
}

impl Default for SampleParams {
    fn default() -> Self {
        Self {
            scale: 30.0,
            num_pixels: 100,
            seed: 727,
            drop_nulls: true,
        }
    }
}

/// Class-stratified sampling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StratifiedSampleParams {
    pub class_band: String,
    pub class_values: Vec<i64>,
    /// Target count per entry of `class_values`
    pub class_points: Vec<usize>,
    pub scale: f64,
    pub seed: u64,
    pub drop_nulls: bool,
}

impl Default for StratifiedSampleParams {
    fn default() -> Self {
        Self {
            class_band: "conifer_forest".to_string(),
            class_values: vec![0, 1],
            class_points: vec![0, 100],  // Conifer pixels only
            scale: 30.0,
            seed: 727,
            drop_nulls: true,
        }
    }
}

impl StratifiedSampleParams {
    pub fn validate(&self) -> RsrResult<()> {
        if self.class_values.len() != self.class_points.len() {
            return Err(RsrError::Configuration(format!(
                "{} class values but {} class point counts",
                self.class_values.len(),
                self.class_points.len()
            )));
        }
        validate_scale(self.scale)
    }
}

fn validate_scale(scale: f64) -> RsrResult<()> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(RsrError::Configuration(format!(
            "Sampling scale must be positive, got {}",
            scale
        )));
    }
    Ok(())
}

/// One sampled point with a column per band and copied properties
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub geometry: Point<f64>,
    pub properties: PropertyMap,
}

impl Sample {
    /// Numeric value of a column, reading back infinities written by [`to_value`]
    pub fn get(&self, key: &str) -> Option<f64> {
        match self.properties.get(key)? {
            Value::String(s) if s == POS_INFINITY => Some(f64::INFINITY),
            Value::String(s) if s == NEG_INFINITY => Some(f64::NEG_INFINITY),
            other => other.as_f64(),
        }
    }
}

const POS_INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

/// JSON value of a pixel: NaN is null, infinities are strings
pub(crate) fn to_value(v: f64) -> Value {
    if v.is_infinite() {
        let text = if v > 0.0 { POS_INFINITY } else { NEG_INFINITY };
        return Value::from(text);
    }
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Centres of the sampling grid covering the image footprint, row-major
fn grid_centers(image: &RasterImage, scale: f64) -> Vec<(f64, f64)> {
    let footprint = image.footprint();
    let (min, max) = (footprint.min(), footprint.max());
    let nx = ((max.x - min.x) / scale).ceil().max(0.0) as usize;
    let ny = ((max.y - min.y) / scale).ceil().max(0.0) as usize;
    let mut centers = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            centers.push((
                min.x + (i as f64 + 0.5) * scale,
                max.y - (j as f64 + 0.5) * scale,
            ));
        }
    }
    centers
}

/// Read every band at a point; `None` when nulls are dropped and any is null
fn sample_at(image: &RasterImage, x: f64, y: f64, drop_nulls: bool) -> RsrResult<Option<Sample>> {
    let mut properties = PropertyMap::new();
    for (i, band) in image.bands().iter().enumerate() {
        let v = image.value_at(i, x, y)?;
        if v.is_nan() && drop_nulls {
            return Ok(None);
        }
        properties.insert(band.name.clone(), to_value(v));
    }

    for (k, v) in image.properties() {
        properties.insert(k.clone(), v.clone());
    }

    let lon = properties.get("lon").and_then(Value::as_f64).unwrap_or(x);
    let lat = properties.get("lat").and_then(Value::as_f64).unwrap_or(y);
    Ok(Some(Sample {
        geometry: Point::new(lon, lat),
        properties,
    }))
}

fn draw(
    image: &RasterImage,
    mut candidates: Vec<(f64, f64)>,
    count: usize,
    seed: u64,
    drop_nulls: bool,
) -> RsrResult<Vec<Sample>> {
    let mut rng = StdRng::seed_from_u64(seed);
    candidates.shuffle(&mut rng);
    let mut samples = Vec::new();
    for (x, y) in candidates.into_iter().take(count) {
        if let Some(sample) = sample_at(image, x, y, drop_nulls)? {
            samples.push(sample);
        }
    }
    Ok(samples)
}

/// Whether every band holds a value at the point
fn is_complete(image: &RasterImage, x: f64, y: f64) -> RsrResult<bool> {
    for b in 0..image.bands().len() {
        if image.value_at(b, x, y)?.is_nan() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Draw up to `num_pixels` seeded samples over the image footprint
///
/// Draws that land on null pixels are dropped rather than replaced, so fewer
/// samples than requested may be returned.
pub fn sample_image(image: &RasterImage, params: &SampleParams) -> RsrResult<Vec<Sample>> {
    validate_scale(params.scale)?;
    if image.is_empty() {
        return Ok(Vec::new());
    }
    let candidates = grid_centers(image, params.scale);
    let samples = draw(image, candidates, params.num_pixels, params.seed, params.drop_nulls)?;
    log::debug!(
        "Sampled {} of {} requested points (seed {})",
        samples.len(),
        params.num_pixels,
        params.seed
    );
    Ok(samples)
}

/// Draw seeded samples independently from each class of `class_band`
///
/// With `drop_nulls`, null pixels are removed from a stratum before drawing,
/// so a class only comes back short when it has too few valid pixels.
pub fn stratified_sample(
    image: &RasterImage,
    params: &StratifiedSampleParams,
) -> RsrResult<Vec<Sample>> {
    params.validate()?;
    if image.is_empty() {
        return Ok(Vec::new());
    }
    let class_index = image.band_index(&params.class_band).ok_or_else(|| {
        RsrError::Processing(format!(
            "Class band '{}' not found (available: {:?})",
            params.class_band,
            image.band_names()
        ))
    })?;

    let centers = grid_centers(image, params.scale);
    let mut classes = Vec::with_capacity(centers.len());
    for &(x, y) in &centers {
        let v = image.value_at(class_index, x, y)?;
        classes.push(if v.is_nan() { None } else { Some(v.round() as i64) });
    }

    let mut samples = Vec::new();
    for (&value, &count) in params.class_values.iter().zip(&params.class_points) {
        if count == 0 {
            continue;
        }
        let mut stratum = Vec::new();
        for (&(x, y), class) in centers.iter().zip(&classes) {
            if *class != Some(value) {
                continue;
            }
            if params.drop_nulls && !is_complete(image, x, y)? {
                continue;
            }
            stratum.push((x, y));
        }
        let drawn = draw(image, stratum, count, params.seed, params.drop_nulls)?;
        log::debug!("Class {}: {} samples (target {})", value, drawn.len(), count);
        samples.extend(drawn);
    }
    Ok(samples)
}

/// Mean of every band over `geometry`
///
/// Points read the image at the point with its interpolation mode; areas
/// average the sampling-grid cells whose centre falls inside. Bands without
/// a valid value map to null. `None` for a bandless image.
pub fn reduce_region(
    image: &RasterImage,
    geometry: &Geometry<f64>,
    scale: f64,
) -> RsrResult<Option<PropertyMap>> {
    validate_scale(scale)?;
    if image.is_empty() {
        return Ok(None);
    }

    let positions: Vec<(f64, f64)> = match geometry {
        Geometry::Point(p) => vec![(p.x(), p.y())],
        other => {
            let bounds = other.bounding_rect().ok_or_else(|| {
                RsrError::Processing("Cannot reduce over an empty geometry".to_string())
            })?;
            let (min, max) = (bounds.min(), bounds.max());
            let nx = ((max.x - min.x) / scale).ceil().max(1.0) as usize;
            let ny = ((max.y - min.y) / scale).ceil().max(1.0) as usize;
            let mut inside = Vec::new();
            for j in 0..ny {
                for i in 0..nx {
                    let x = min.x + (i as f64 + 0.5) * scale;
                    let y = max.y - (j as f64 + 0.5) * scale;
                    if geometry_contains(other, &Point::new(x, y)) {
                        inside.push((x, y));
                    }
                }
            }
            inside
        }
    };

    let mut reduced = PropertyMap::new();
    for (b, band) in image.bands().iter().enumerate() {
        let mut sum = 0.0;
        let mut n = 0usize;
        for &(x, y) in &positions {
            let v = image.value_at(b, x, y)?;
            if !v.is_nan() {
                sum += v;
                n += 1;
            }
        }
        let mean = if n > 0 { sum / n as f64 } else { f64::NAN };
        reduced.insert(band.name.clone(), to_value(mean));
    }
    Ok(Some(reduced))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_abs_diff_eq;
    use geo::polygon;
    use ndarray::Array2;

    fn classified(rows: usize, cols: usize) -> RasterImage {
        let transform = GeoTransform::north_up(0.0, rows as f64 * 30.0, 30.0);
        let class = Array2::from_shape_fn((rows, cols), |(r, _)| if r < rows / 2 { 0.0 } else { 1.0 });
        let value = Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f64);
        RasterImage::from_bands(
            transform,
            vec![
                ("conifer_forest".to_string(), class),
                ("RBR".to_string(), value),
            ],
        )
        .unwrap()
        .with_property("fire_name", "TEST")
    }

    #[test]
    fn test_sample_is_reproducible() {
        let img = classified(20, 20);
        let params = SampleParams::default();
        let a = sample_image(&img, &params).unwrap();
        let b = sample_image(&img, &params).unwrap();
        assert_eq!(a.len(), 100);
        assert_eq!(a, b);
        assert_eq!(a[0].properties["fire_name"], Value::from("TEST"));
    }

    #[test]
    fn test_null_pixels_are_dropped() {
        let img = classified(10, 10);
        let keep = Array2::from_shape_fn((10, 10), |(r, _)| r >= 5);
        let masked = img.update_mask(&keep).unwrap();
        let params = SampleParams {
            num_pixels: 100,
            ..Default::default()
        };
        let samples = sample_image(&masked, &params).unwrap();
        assert_eq!(samples.len(), 50);
        assert!(samples.iter().all(|s| s.get("RBR").is_some()));
    }

    #[test]
    fn test_stratified_counts() {
        let img = classified(20, 20);
        let params = StratifiedSampleParams {
            class_points: vec![10, 90],
            ..Default::default()
        };
        let samples = stratified_sample(&img, &params).unwrap();
        let count = |class: f64| samples.iter().filter(|s| s.get("conifer_forest") == Some(class)).count();
        assert_eq!(count(0.0), 10);
        assert_eq!(count(1.0), 90);
        assert_eq!(samples, stratified_sample(&img, &params).unwrap());
    }

    #[test]
    fn test_stratified_skips_nulls_before_drawing() {
        // half of class 0 is null in RBR; 100 valid class-0 pixels remain
        let img = classified(20, 20);
        let keep = Array2::from_shape_fn((20, 20), |(r, c)| r >= 10 || c % 2 == 0);
        let rbr = img.select(&["RBR"]).unwrap().update_mask(&keep).unwrap();
        let img = img.select(&["conifer_forest"]).unwrap().add_bands(&rbr).unwrap();
        let params = StratifiedSampleParams {
            class_points: vec![10, 90],
            ..Default::default()
        };
        let samples = stratified_sample(&img, &params).unwrap();
        let count = |class: f64| samples.iter().filter(|s| s.get("conifer_forest") == Some(class)).count();
        assert_eq!(count(0.0), 10);
        assert_eq!(count(1.0), 90);
        assert!(samples.iter().all(|s| s.get("RBR").is_some()));
    }

    #[test]
    fn test_infinite_pixels_are_values() {
        // RdNBR-style division by a zero pre-fire value
        let mut value = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64);
        value[[1, 1]] = f64::INFINITY;
        let img = RasterImage::from_bands(
            GeoTransform::north_up(0.0, 120.0, 30.0),
            vec![("RBR".to_string(), value)],
        )
        .unwrap();
        let params = SampleParams {
            num_pixels: 100,
            ..Default::default()
        };
        let samples = sample_image(&img, &params).unwrap();
        assert_eq!(samples.len(), 16);
        let inf: Vec<&Sample> = samples.iter().filter(|s| s.get("RBR") == Some(f64::INFINITY)).collect();
        assert_eq!(inf.len(), 1);
        assert_eq!(inf[0].properties["RBR"], Value::from("Infinity"));

        let square = Geometry::Polygon(polygon![
            (x: 0.0, y: 120.0), (x: 60.0, y: 120.0), (x: 60.0, y: 60.0), (x: 0.0, y: 60.0)
        ]);
        let mean = reduce_region(&img, &square, 30.0).unwrap().unwrap();
        assert_eq!(mean["RBR"], Value::from("Infinity"));
        assert_eq!(to_value(f64::NEG_INFINITY), Value::from("-Infinity"));
        assert_eq!(to_value(f64::NAN), Value::Null);
    }

    #[test]
    fn test_stratified_rejects_mismatched_lengths() {
        let params = StratifiedSampleParams {
            class_points: vec![10],
            ..Default::default()
        };
        assert!(stratified_sample(&classified(4, 4), &params).is_err());
    }

    #[test]
    fn test_reduce_region() {
        let img = classified(4, 4);
        let (x, y) = img.transform().pixel_center(1, 2);
        let at_point = reduce_region(&img, &Geometry::Point(Point::new(x, y)), 30.0)
            .unwrap()
            .unwrap();
        assert_eq!(at_point["RBR"], to_value(6.0));

        // top-left 2x2 pixels: values 0, 1, 4, 5
        let square = Geometry::Polygon(polygon![
            (x: 0.0, y: 120.0), (x: 60.0, y: 120.0), (x: 60.0, y: 60.0), (x: 0.0, y: 60.0)
        ]);
        let mean = reduce_region(&img, &square, 30.0).unwrap().unwrap();
        assert_abs_diff_eq!(mean["RBR"].as_f64().unwrap(), 2.5, epsilon = 1e-12);

        assert!(reduce_region(&RasterImage::bandless(), &square, 30.0).unwrap().is_none());
    }
}
