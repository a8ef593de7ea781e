use crate::io::backend::RasterBackend;
use crate::raster::{RasterImage, RasterTimeSeries};
use crate::types::{DateRange, RsrError, RsrResult};
use geo::{BoundingRect, Geometry};
use std::collections::HashMap;

/// Backend over in-process `ndarray` grids
///
/// Collections and static images must share one grid with each other; no
/// reprojection is performed. All compute capabilities use the trait's local
/// implementations.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    collections: HashMap<String, Vec<RasterImage>>,
    images: HashMap<String, RasterImage>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a time series dataset
    pub fn insert_collection(&mut self, dataset: &str, images: Vec<RasterImage>) {
        self.collections.insert(dataset.to_string(), images);
    }

    /// Append one acquisition to a time series dataset
    pub fn push_image(&mut self, dataset: &str, image: RasterImage) {
        self.collections
            .entry(dataset.to_string())
            .or_default()
            .push(image);
    }

    /// Register (or replace) a static raster
    pub fn insert_image(&mut self, dataset: &str, image: RasterImage) {
        self.images.insert(dataset.to_string(), image);
    }
}

impl RasterBackend for MemoryBackend {
    fn fetch_series(
        &self,
        dataset: &str,
        range: &DateRange,
        bounds: &Geometry<f64>,
    ) -> RsrResult<RasterTimeSeries> {
        let images = self
            .collections
            .get(dataset)
            .ok_or_else(|| RsrError::Backend(format!("Unknown collection '{}'", dataset)))?;
        let rect = bounds
            .bounding_rect()
            .ok_or_else(|| RsrError::Backend("Filter bounds geometry is empty".to_string()))?;

        let series = RasterTimeSeries::new(images.clone())
            .filter_date(range)
            .filter_bounds(&rect);
        log::trace!("{}: {} of {} images in {}", dataset, series.len(), images.len(), range);
        Ok(series)
    }

    fn fetch_image(&self, dataset: &str) -> RsrResult<RasterImage> {
        self.images
            .get(dataset)
            .cloned()
            .ok_or_else(|| RsrError::Backend(format!("Unknown image '{}'", dataset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use chrono::{TimeZone, Utc};
    use geo::{Point, Rect, coord};
    use ndarray::Array2;

    fn acquisition(day: u32) -> RasterImage {
        RasterImage::from_bands(
            GeoTransform::north_up(0.0, 90.0, 30.0),
            vec![("B1".to_string(), Array2::ones((3, 3)))],
        )
        .unwrap()
        .with_acquired(Utc.with_ymd_and_hms(1987, 6, day, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_fetch_series_filters() {
        let mut backend = MemoryBackend::new();
        for day in [1, 10, 20, 30] {
            backend.push_image("L5", acquisition(day));
        }

        let range = DateRange::new(
            Utc.with_ymd_and_hms(1987, 6, 10, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(1987, 6, 30, 0, 0, 0).unwrap(),
        );
        let inside = Geometry::Point(Point::new(45.0, 45.0));
        assert_eq!(backend.fetch_series("L5", &range, &inside).unwrap().len(), 2);

        let outside = Geometry::Rect(Rect::new(coord! { x: 500.0, y: 500.0 }, coord! { x: 600.0, y: 600.0 }));
        assert!(backend.fetch_series("L5", &range, &outside).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_dataset_is_backend_error() {
        let backend = MemoryBackend::new();
        let err = backend.fetch_image("USGS/SRTMGL1_003").unwrap_err();
        assert!(matches!(err, RsrError::Backend(_)));
    }
}
