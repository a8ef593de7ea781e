//! Multi-band raster images and acquisition time series
//!
//! Invalid pixels are carried as NaN in every band. An image with zero bands
//! stands in for a null result and collapses to `None` via
//! [`RasterImage::into_present`].

use crate::types::{DateRange, GeoTransform, PropertyMap, RsrError, RsrResult};
use chrono::{DateTime, Utc};
use geo::{coord, Contains, Geometry, Intersects, Point, Rect};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Interpolation used when an image is read at arbitrary coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    /// Nearest neighbour
    #[default]
    None,
    Bilinear,
    Bicubic,
}

impl FromStr for ResampleMethod {
    type Err = RsrError;

    fn from_str(s: &str) -> RsrResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ResampleMethod::None),
            "bilinear" => Ok(ResampleMethod::Bilinear),
            "bicubic" => Ok(ResampleMethod::Bicubic),
            other => Err(RsrError::Configuration(format!(
                "Unknown resample method '{}' (expected none, bilinear or bicubic)",
                other
            ))),
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResampleMethod::None => "none",
            ResampleMethod::Bilinear => "bilinear",
            ResampleMethod::Bicubic => "bicubic",
        };
        write!(f, "{}", name)
    }
}

/// A named band of pixel values
#[derive(Debug, Clone)]
pub struct Band {
    pub name: String,
    pub data: Array2<f64>,
}

/// Co-registered bands on a common grid
#[derive(Debug, Clone)]
pub struct RasterImage {
    bands: Vec<Band>,
    shape: (usize, usize),
    transform: GeoTransform,
    acquired: Option<DateTime<Utc>>,
    resample: ResampleMethod,
    properties: PropertyMap,
}

impl RasterImage {
    /// Empty image on the given grid
    pub fn new(transform: GeoTransform, shape: (usize, usize)) -> Self {
        Self {
            bands: Vec::new(),
            shape,
            transform,
            acquired: None,
            resample: ResampleMethod::None,
            properties: PropertyMap::new(),
        }
    }

    /// Image with no bands and no grid, the null result of a reduction
    pub fn bandless() -> Self {
        Self::new(GeoTransform::default(), (0, 0))
    }

    pub fn from_bands(
        transform: GeoTransform,
        bands: Vec<(String, Array2<f64>)>,
    ) -> RsrResult<Self> {
        let shape = match bands.first() {
            Some((_, data)) => data.dim(),
            None => (0, 0),
        };
        let mut image = Self::new(transform, shape);
        for (name, data) in bands {
            image = image.with_band(&name, data)?;
        }
        Ok(image)
    }

    /// Single-band image on the same grid as `like`
    pub fn from_like(like: &RasterImage, name: &str, data: Array2<f64>) -> RsrResult<Self> {
        let mut image = Self::new(like.transform, like.shape);
        image.acquired = like.acquired;
        image.resample = like.resample;
        image.with_band(name, data)
    }

    /// Constant single-band image on the same grid as `like`
    pub fn constant(like: &RasterImage, name: &str, value: f64) -> RsrResult<Self> {
        Self::from_like(like, name, Array2::from_elem(like.shape, value))
    }

    pub fn with_band(mut self, name: &str, data: Array2<f64>) -> RsrResult<Self> {
        if self.bands.is_empty() && self.shape == (0, 0) {
            self.shape = data.dim();
        }
        if data.dim() != self.shape {
            return Err(RsrError::Processing(format!(
                "Band '{}' has shape {:?}, image grid is {:?}",
                name,
                data.dim(),
                self.shape
            )));
        }
        if self.band_index(name).is_some() {
            return Err(RsrError::Processing(format!(
                "Duplicate band name '{}'",
                name
            )));
        }
        self.bands.push(Band {
            name: name.to_string(),
            data,
        });
        Ok(self)
    }

    pub fn with_acquired(mut self, acquired: DateTime<Utc>) -> Self {
        self.acquired = Some(acquired);
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn band_index(&self, name: &str) -> Option<usize> {
        self.bands.iter().position(|b| b.name == name)
    }

    pub fn band(&self, name: &str) -> Option<&Array2<f64>> {
        self.bands.iter().find(|b| b.name == name).map(|b| &b.data)
    }

    pub fn require_band(&self, name: &str) -> RsrResult<&Array2<f64>> {
        self.band(name).ok_or_else(|| {
            RsrError::Processing(format!(
                "Band '{}' not found (available: {:?})",
                name,
                self.band_names()
            ))
        })
    }

    pub fn first_band(&self) -> Option<&Band> {
        self.bands.first()
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// `None` for a bandless image
    pub fn into_present(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn acquired(&self) -> Option<DateTime<Utc>> {
        self.acquired
    }

    pub fn resample_method(&self) -> ResampleMethod {
        self.resample
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    /// Copy scalar properties onto this image, overwriting existing keys
    pub fn copy_properties(mut self, properties: &PropertyMap) -> Self {
        for (k, v) in properties {
            self.properties.insert(k.clone(), v.clone());
        }
        self
    }

    /// Same grid and metadata without bands
    fn empty_like(&self) -> Self {
        Self {
            bands: Vec::new(),
            shape: self.shape,
            transform: self.transform,
            acquired: self.acquired,
            resample: self.resample,
            properties: self.properties.clone(),
        }
    }

    /// Keep the named bands in the given order
    pub fn select(&self, names: &[&str]) -> RsrResult<Self> {
        let mut out = self.empty_like();
        for name in names {
            let data = self.require_band(name)?.clone();
            out.bands.push(Band {
                name: name.to_string(),
                data,
            });
        }
        Ok(out)
    }

    /// Select bands and rename them in one step: `(source, target)` pairs
    pub fn select_renamed(&self, pairs: &[(&str, &str)]) -> RsrResult<Self> {
        let mut out = self.empty_like();
        for (source, target) in pairs {
            let data = self.require_band(source)?.clone();
            out = out.with_band(target, data)?;
        }
        Ok(out)
    }

    /// Rename every band; `names` must match the band count
    pub fn rename<S: AsRef<str>>(mut self, names: &[S]) -> RsrResult<Self> {
        if names.len() != self.bands.len() {
            return Err(RsrError::Processing(format!(
                "Cannot rename {} bands with {} names",
                self.bands.len(),
                names.len()
            )));
        }
        for (band, name) in self.bands.iter_mut().zip(names) {
            band.name = name.as_ref().to_string();
        }
        Ok(self)
    }

    /// Append `suffix` to every band name
    pub fn suffix_bands(mut self, suffix: &str) -> Self {
        for band in self.bands.iter_mut() {
            band.name = format!("{}{}", band.name, suffix);
        }
        self
    }

    /// Stack the bands of `other` onto this image
    pub fn add_bands(mut self, other: &RasterImage) -> RsrResult<Self> {
        if self.is_empty() && self.shape == (0, 0) {
            self.shape = other.shape;
            self.transform = other.transform;
        }
        if other.shape != self.shape || !other.transform.approx_eq(&self.transform) {
            return Err(RsrError::Processing(format!(
                "Cannot stack images on different grids ({:?} vs {:?})",
                self.shape, other.shape
            )));
        }
        for band in &other.bands {
            self = self.with_band(&band.name, band.data.clone())?;
        }
        Ok(self)
    }

    /// Apply `f` to every band value
    pub fn map_values<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        let mut out = self.empty_like();
        for band in &self.bands {
            out.bands.push(Band {
                name: band.name.clone(),
                data: band.data.mapv(&f),
            });
        }
        out
    }

    /// Combine the first band of two images pixel by pixel
    pub fn combine<F>(&self, other: &RasterImage, name: &str, f: F) -> RsrResult<Self>
    where
        F: Fn(f64, f64) -> f64,
    {
        let (a, b) = match (self.first_band(), other.first_band()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(RsrError::Processing(
                    "Cannot combine bandless images".to_string(),
                ))
            }
        };
        if a.data.dim() != b.data.dim() {
            return Err(RsrError::Processing(format!(
                "Cannot combine '{}' {:?} with '{}' {:?}",
                a.name,
                a.data.dim(),
                b.name,
                b.data.dim()
            )));
        }
        let mut data = a.data.clone();
        data.zip_mut_with(&b.data, |x, &y| *x = f(*x, y));
        let mut out = self.empty_like();
        out.bands.push(Band {
            name: name.to_string(),
            data,
        });
        Ok(out)
    }

    /// Pixels that hold a value in every band
    pub fn valid_mask(&self) -> Array2<bool> {
        let mut mask = Array2::from_elem(self.shape, true);
        for band in &self.bands {
            mask.zip_mut_with(&band.data, |m, v| *m = *m && !v.is_nan());
        }
        mask
    }

    /// Mask out (set to NaN) every pixel where `keep` is false
    pub fn update_mask(mut self, keep: &Array2<bool>) -> RsrResult<Self> {
        if keep.dim() != self.shape {
            return Err(RsrError::Processing(format!(
                "Mask shape {:?} does not match image {:?}",
                keep.dim(),
                self.shape
            )));
        }
        for band in self.bands.iter_mut() {
            band.data.zip_mut_with(keep, |v, &k| {
                if !k {
                    *v = f64::NAN;
                }
            });
        }
        Ok(self)
    }

    /// Set the interpolation used by subsequent point reads
    pub fn resample(mut self, method: ResampleMethod) -> Self {
        self.resample = method;
        self
    }

    /// Mask pixels whose centre falls outside `geometry`
    pub fn clip(self, geometry: &Geometry<f64>) -> RsrResult<Self> {
        let (rows, cols) = self.shape;
        let transform = self.transform;
        let keep = Array2::from_shape_fn((rows, cols), |(r, c)| {
            let (x, y) = transform.pixel_center(r, c);
            geometry_contains(geometry, &Point::new(x, y))
        });
        self.update_mask(&keep)
    }

    /// Ground footprint of the grid
    pub fn footprint(&self) -> Rect<f64> {
        let (rows, cols) = self.shape;
        let corners = [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(cols as f64, 0.0),
            self.transform.apply(0.0, rows as f64),
            self.transform.apply(cols as f64, rows as f64),
        ];
        let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
        Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
    }

    /// Value of a band at a world coordinate using the image's interpolation
    ///
    /// Returns NaN outside the grid or where any contributing pixel is masked.
    pub fn value_at(&self, band: usize, x: f64, y: f64) -> RsrResult<f64> {
        let data = match self.bands.get(band) {
            Some(b) => &b.data,
            None => {
                return Err(RsrError::Processing(format!(
                    "Band index {} out of range ({} bands)",
                    band,
                    self.bands.len()
                )))
            }
        };
        let (col, row) = self.transform.invert(x, y)?;
        let (rows, cols) = self.shape;
        if !col.is_finite()
            || !row.is_finite()
            || col < 0.0
            || row < 0.0
            || col >= cols as f64
            || row >= rows as f64
        {
            return Ok(f64::NAN);
        }
        Ok(match self.resample {
            ResampleMethod::None => data[[row.floor() as usize, col.floor() as usize]],
            ResampleMethod::Bilinear => bilinear(data, col - 0.5, row - 0.5),
            ResampleMethod::Bicubic => bicubic(data, col - 0.5, row - 0.5),
        })
    }
}

pub(crate) fn geometry_contains(geometry: &Geometry<f64>, point: &Point<f64>) -> bool {
    match geometry {
        Geometry::Polygon(p) => p.contains(point),
        Geometry::MultiPolygon(mp) => mp.contains(point),
        Geometry::Rect(r) => r.contains(point),
        Geometry::Triangle(t) => t.contains(point),
        Geometry::GeometryCollection(gc) => gc.iter().any(|g| geometry_contains(g, point)),
        other => other.intersects(point),
    }
}

fn clamped(data: &Array2<f64>, row: isize, col: isize) -> f64 {
    let (rows, cols) = data.dim();
    let r = row.clamp(0, rows as isize - 1) as usize;
    let c = col.clamp(0, cols as isize - 1) as usize;
    data[[r, c]]
}

/// `u`, `v` are pixel-centre coordinates (column, row)
fn bilinear(data: &Array2<f64>, u: f64, v: f64) -> f64 {
    let c0 = u.floor();
    let r0 = v.floor();
    let fx = u - c0;
    let fy = v - r0;
    let (c0, r0) = (c0 as isize, r0 as isize);

    let v00 = clamped(data, r0, c0);
    let v01 = clamped(data, r0, c0 + 1);
    let v10 = clamped(data, r0 + 1, c0);
    let v11 = clamped(data, r0 + 1, c0 + 1);

    let top = v00 * (1.0 - fx) + v01 * fx;
    let bottom = v10 * (1.0 - fx) + v11 * fx;
    top * (1.0 - fy) + bottom * fy
}

fn catmull_rom(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    0.5 * (2.0 * p1
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t * t
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t * t * t)
}

fn bicubic(data: &Array2<f64>, u: f64, v: f64) -> f64 {
    let c0 = u.floor();
    let r0 = v.floor();
    let fx = u - c0;
    let fy = v - r0;
    let (c0, r0) = (c0 as isize, r0 as isize);

    let mut rows = [0.0; 4];
    for (k, dr) in (-1..=2).enumerate() {
        let r = r0 + dr;
        rows[k] = catmull_rom(
            clamped(data, r, c0 - 1),
            clamped(data, r, c0),
            clamped(data, r, c0 + 1),
            clamped(data, r, c0 + 2),
            fx,
        );
    }
    catmull_rom(rows[0], rows[1], rows[2], rows[3], fy)
}

/// Build a grid by evaluating `f` at every (row, col)
pub(crate) fn build_grid<F>(shape: (usize, usize), f: F) -> Array2<f64>
where
    F: Fn(usize, usize) -> f64 + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        let mut out = Array2::zeros(shape);
        ndarray::Zip::indexed(&mut out).par_for_each(|(r, c), v| *v = f(r, c));
        out
    }

    #[cfg(not(feature = "parallel"))]
    {
        Array2::from_shape_fn(shape, |(r, c)| f(r, c))
    }
}

/// Ordered collection of acquisitions
#[derive(Debug, Clone, Default)]
pub struct RasterTimeSeries {
    images: Vec<RasterImage>,
}

impl RasterTimeSeries {
    pub fn new(images: Vec<RasterImage>) -> Self {
        Self { images }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[RasterImage] {
        &self.images
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RasterImage> {
        self.images.iter()
    }

    /// Concatenate two series, ordering by acquisition time
    pub fn merge(mut self, other: RasterTimeSeries) -> Self {
        self.images.extend(other.images);
        self.images.sort_by_key(|img| img.acquired);
        self
    }

    pub fn filter_date(&self, range: &DateRange) -> Self {
        Self::new(
            self.images
                .iter()
                .filter(|img| img.acquired.map(|t| range.contains(t)).unwrap_or(false))
                .cloned()
                .collect(),
        )
    }

    pub fn filter_bounds(&self, bounds: &Rect<f64>) -> Self {
        Self::new(
            self.images
                .iter()
                .filter(|img| img.footprint().intersects(bounds))
                .cloned()
                .collect(),
        )
    }

    pub fn try_map<F>(&self, f: F) -> RsrResult<Self>
    where
        F: Fn(&RasterImage) -> RsrResult<RasterImage>,
    {
        Ok(Self::new(
            self.images.iter().map(f).collect::<RsrResult<Vec<_>>>()?,
        ))
    }
}

impl FromIterator<RasterImage> for RasterTimeSeries {
    fn from_iter<I: IntoIterator<Item = RasterImage>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
