//! rsr: Remote-sensing fire severity and landscape heterogeneity variables
//!
//! This library derives burn-severity indices, multi-scale heterogeneity,
//! terrain and fire-weather covariates for fire perimeters and field plots
//! from multi-sensor Landsat time series, and reduces them to tabular samples.
//! Raster data access is delegated to a [`io::RasterBackend`].

pub mod types;
pub mod raster;
pub mod config;
pub mod batch;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    DateRange, Feature, GeoTransform, PropertyMap, RsrError, RsrResult, ALARM_DATE_KEY,
};
pub use raster::{Band, RasterImage, RasterTimeSeries, ResampleMethod};
pub use config::PipelineConfig;
pub use batch::{partition_by_alarm_date, BatchProcessor};
pub use io::{DatasetCatalog, MemoryBackend, RasterBackend};
pub use crate::core::{
    AssemblyMode, AssemblyParams, FeatureAssembler, Sample, SampleParams, Sensor, SensorSet,
    SpectralIndex, StratifiedSampleParams, TimeWindow, VariableBundle,
};
