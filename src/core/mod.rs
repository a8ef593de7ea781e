//! Core variable-derivation stages

pub mod kernel;
pub mod window;
pub mod harmonize;
pub mod indices;
pub mod composite;
pub mod severity;
pub mod neighborhood;
pub mod terrain;
pub mod weather;
pub mod texture;
pub mod sampling;
pub mod assembler;

// Re-export main types
pub use kernel::{Kernel, create_kernel};
pub use window::{TimeWindow, FireWindows, resolve_windows, pre_fire_window, post_fire_window, early_fire_window};
pub use harmonize::{Sensor, SensorSet, QualityMaskParams, SourceHarmonizer, harmonize_image, quality_mask};
pub use indices::{SpectralIndex, CANONICAL_BANDS, normalized_difference};
pub use composite::{Statistic, reduce_series, index_composite};
pub use severity::{FireSeries, IndexComposites, SeverityMetrics};
pub use neighborhood::{NeighborhoodMetric, PIXEL_RADII, neighborhood_reduce, pre_fire_neighborhood, roughness};
pub use terrain::{TerrainLayers, slope_aspect};
pub use weather::{WeatherParams, WeatherVariable, weather_group, weather_variable};
pub use texture::{GLCM_MEASURES, TEXTURE_SIZES, glcm_texture, gearys_c, quantize};
pub use sampling::{Sample, SampleParams, StratifiedSampleParams, sample_image, stratified_sample, reduce_region};
pub use assembler::{AssemblyMode, AssemblyParams, FeatureAssembler, VariableBundle};
