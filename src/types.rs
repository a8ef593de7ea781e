use chrono::{DateTime, Duration, Utc};
use geo::Geometry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Scalar properties carried by features, images and samples
pub type PropertyMap = BTreeMap<String, Value>;

/// Property key holding a feature's alarm date (epoch milliseconds)
pub const ALARM_DATE_KEY: &str = "alarm_date";

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// World coordinate of a fractional pixel position (col, row)
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// World coordinate of the centre of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Fractional pixel position (col, row) of a world coordinate
    pub fn invert(&self, x: f64, y: f64) -> RsrResult<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det.abs() < f64::EPSILON {
            return Err(RsrError::Processing(
                "Geotransform is not invertible".to_string(),
            ));
        }
        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (dx * self.pixel_height - dy * self.rotation_x) / det;
        let row = (dy * self.pixel_width - dx * self.rotation_y) / det;
        Ok((col, row))
    }

    /// Ground size of a pixel along x and y
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            self.pixel_width.hypot(self.rotation_y),
            self.pixel_height.hypot(self.rotation_x),
        )
    }

    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        let tol = 1e-9 * self.pixel_width.abs().max(1.0);
        (self.top_left_x - other.top_left_x).abs() < tol
            && (self.top_left_y - other.top_left_y).abs() < tol
            && (self.pixel_width - other.pixel_width).abs() < tol
            && (self.pixel_height - other.pixel_height).abs() < tol
            && (self.rotation_x - other.rotation_x).abs() < tol
            && (self.rotation_y - other.rotation_y).abs() < tol
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::north_up(0.0, 0.0, 1.0)
    }
}

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// A fire perimeter or field plot with its alarm date
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub alarm_date: DateTime<Utc>,
    pub properties: PropertyMap,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>, alarm_date: DateTime<Utc>) -> Self {
        Self {
            geometry: geometry.into(),
            alarm_date,
            properties: PropertyMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Scalar properties copied onto derived images and samples
    pub fn scalar_properties(&self) -> PropertyMap {
        let mut props = self.properties.clone();
        props.insert(
            ALARM_DATE_KEY.to_string(),
            Value::from(self.alarm_date.timestamp_millis()),
        );
        props
    }
}

/// Error types for fire variable derivation
#[derive(Debug, thiserror::Error)]
pub enum RsrError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RsrError {
    fn from(e: serde_json::Error) -> Self {
        RsrError::Serialization(e.to_string())
    }
}

/// Result type for fire variable operations
pub type RsrResult<T> = Result<T, RsrError>;
