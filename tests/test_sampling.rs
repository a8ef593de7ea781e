mod common;

use common::*;
use rsr::{BatchProcessor, PipelineConfig, VariableBundle};
use std::sync::Arc;

fn bundles(config: &str) -> (BatchProcessor, Vec<VariableBundle>) {
    init_logging();
    let config = PipelineConfig::from_json_str(config).unwrap();
    let processor = BatchProcessor::new(Arc::new(scene()), config).unwrap();
    let bundles = processor.assess_whole_fire_lite(&[fire_1987()]).unwrap();
    (processor, bundles)
}

#[test]
fn test_simple_sampling_is_reproducible() {
    let (processor, bundles) = bundles(r#"{"sensors": "5", "sampling": {"num_pixels": 40}}"#);
    let first = processor.sample_bundles(&bundles).unwrap();
    let second = processor.sample_bundles(&bundles).unwrap();
    assert!(first.len() <= 40 && first.len() >= 39);
    assert_eq!(first, second);

    for sample in &first {
        assert_eq!(sample.properties["fire_name"], "TEST");
        // geometry is rewritten to the sample's own location
        assert_eq!(Some(sample.geometry.x()), sample.get("lon"));
        assert_eq!(Some(sample.geometry.y()), sample.get("lat"));
    }
}

#[test]
fn test_different_seeds_draw_different_pixels() {
    let (a, bundles_a) = bundles(r#"{"sensors": "5", "sampling": {"num_pixels": 10, "seed": 1}}"#);
    let (b, bundles_b) = bundles(r#"{"sensors": "5", "sampling": {"num_pixels": 10, "seed": 2}}"#);
    let first = a.sample_bundles(&bundles_a).unwrap();
    let second = b.sample_bundles(&bundles_b).unwrap();
    assert_ne!(first, second);
}

#[test]
fn test_every_valid_pixel_when_oversampling() {
    let (processor, bundles) = bundles(r#"{"sensors": "5", "sampling": {"num_pixels": 1000}}"#);
    let samples = processor.sample_bundles(&bundles).unwrap();
    // every pixel but the cloudy one
    assert_eq!(samples.len(), ROWS * COLS - 1);
}

#[test]
fn test_stratified_counts_per_class() {
    let (processor, bundles) = bundles(
        r#"{"sensors": "5",
            "stratified": {"class_values": [0, 1], "class_points": [10, 90]}}"#,
    );
    let samples = processor.stratified_sample_bundles(&bundles).unwrap();
    let count = |class: f64| {
        samples
            .iter()
            .filter(|s| s.get("conifer_forest") == Some(class))
            .count()
    };

    // 72 pixels per class; the cloudy class-0 pixel never uses up a draw
    assert_eq!(count(0.0), 10);
    assert_eq!(count(1.0), 72);
    assert_eq!(samples, processor.stratified_sample_bundles(&bundles).unwrap());
}

#[test]
fn test_default_stratification_samples_conifer_only() {
    let (processor, bundles) = bundles(r#"{"sensors": "5"}"#);
    let samples = processor.stratified_sample_bundles(&bundles).unwrap();
    assert!(!samples.is_empty());
    assert!(samples.iter().all(|s| s.get("conifer_forest") == Some(1.0)));
}
