//! Data access and export

pub mod backend;
pub mod memory;
pub mod export;

pub use backend::{DatasetCatalog, RasterBackend};
pub use memory::MemoryBackend;
pub use export::{column_schema, to_feature_collection, write_geojson};
