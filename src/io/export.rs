//! GeoJSON emission of sample collections

use crate::core::assembler::VariableBundle;
use crate::core::sampling::Sample;
use crate::types::RsrResult;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

/// Ordered table columns for samples of a bundle: bands, then copied properties
pub fn column_schema(bundle: &VariableBundle) -> Vec<String> {
    let mut columns: Vec<String> = bundle.band_names().iter().map(|s| s.to_string()).collect();
    for key in bundle.properties().keys() {
        if !columns.iter().any(|c| c == key) {
            columns.push(key.clone());
        }
    }
    columns
}

fn sample_feature(sample: &Sample) -> Value {
    let properties: Map<String, Value> = sample
        .properties
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    json!({
        "type": "Feature",
        "geometry": {
            "type": "Point",
            "coordinates": [sample.geometry.x(), sample.geometry.y()],
        },
        "properties": properties,
    })
}

/// Samples as a GeoJSON `FeatureCollection`
pub fn to_feature_collection(samples: &[Sample]) -> RsrResult<String> {
    let features: Vec<Value> = samples.iter().map(sample_feature).collect();
    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    Ok(serde_json::to_string(&collection)?)
}

pub fn write_geojson<P: AsRef<Path>>(path: P, samples: &[Sample]) -> RsrResult<()> {
    let path = path.as_ref();
    let body = to_feature_collection(samples)?;
    fs::write(path, body)?;
    log::info!("Wrote {} samples to {}", samples.len(), path.display());
    Ok(())
}
