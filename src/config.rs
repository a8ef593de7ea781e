//! Pipeline configuration loaded from JSON

use crate::core::assembler::{AssemblyMode, AssemblyParams};
use crate::core::harmonize::{QualityMaskParams, SensorSet};
use crate::core::sampling::{SampleParams, StratifiedSampleParams};
use crate::core::weather::WeatherParams;
use crate::core::window::TimeWindow;
use crate::io::backend::DatasetCatalog;
use crate::raster::ResampleMethod;
use crate::types::{RsrError, RsrResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Every setting of one batch run
///
/// Missing keys take their defaults, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub time_window: TimeWindow,
    pub resample: ResampleMethod,
    pub sensors: SensorSet,
    pub mode: AssemblyMode,
    pub quality_mask: QualityMaskParams,
    pub weather: WeatherParams,
    pub sampling: SampleParams,
    pub stratified: StratifiedSampleParams,
    pub datasets: DatasetCatalog,
    /// Largest feature set accepted per invocation
    pub max_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            time_window: TimeWindow::default(),
            resample: ResampleMethod::None,
            sensors: SensorSet::all(),
            mode: AssemblyMode::Lite,
            quality_mask: QualityMaskParams::default(),
            weather: WeatherParams::default(),
            sampling: SampleParams::default(),
            stratified: StratifiedSampleParams::default(),
            datasets: DatasetCatalog::default(),
            max_batch_size: 500,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(text: &str) -> RsrResult<Self> {
        let config: PipelineConfig = serde_json::from_str(text)
            .map_err(|e| RsrError::Configuration(format!("Invalid pipeline configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> RsrResult<Self> {
        let path = path.as_ref();
        log::info!("Loading pipeline configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> RsrResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings that would fail every feature
    pub fn validate(&self) -> RsrResult<()> {
        self.assembly_params().validate()?;
        if !(self.sampling.scale.is_finite() && self.sampling.scale > 0.0) {
            return Err(RsrError::Configuration(format!(
                "Sampling scale must be positive, got {}",
                self.sampling.scale
            )));
        }
        self.stratified.validate()?;
        if self.max_batch_size == 0 {
            return Err(RsrError::Configuration(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-feature assembly settings
    pub fn assembly_params(&self) -> AssemblyParams {
        AssemblyParams {
            time_window: self.time_window,
            resample: self.resample,
            sensors: self.sensors.clone(),
            mode: self.mode,
            quality_mask: self.quality_mask,
            weather: self.weather,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::harmonize::Sensor;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.time_window, TimeWindow::Days(48));
        assert_eq!(config.sensors.len(), 4);
    }

    #[test]
    fn test_reference_settings() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "time_window": "2 months",
                "resample": "bicubic",
                "sensors": "5",
                "mode": {"type": "full", "gray_levels": 100},
                "sampling": {"num_pixels": 50}
            }"#,
        )
        .unwrap();
        assert_eq!(config.time_window, TimeWindow::Months(2));
        assert_eq!(config.resample, ResampleMethod::Bicubic);
        assert!(config.sensors.contains(Sensor::Landsat5));
        assert!(!config.sensors.contains(Sensor::Landsat8));
        assert_eq!(config.mode, AssemblyMode::Full { gray_levels: 100 });
        assert_eq!(config.sampling.num_pixels, 50);
        assert_eq!(config.sampling.seed, 727);
    }

    #[test]
    fn test_invalid_settings_fail_fast() {
        for bad in [
            r#"{"time_window": 0}"#,
            r#"{"resample": "cubic"}"#,
            r#"{"sensors": "59"}"#,
            r#"{"sensors": ""}"#,
            r#"{"mode": {"type": "full", "gray_levels": 0}}"#,
            r#"{"sampling": {"scale": 0.0}}"#,
            r#"{"max_batch_size": 0}"#,
            r#"{"stratified": {"class_points": [5]}}"#,
        ] {
            let err = PipelineConfig::from_json_str(bad).unwrap_err();
            assert!(matches!(err, RsrError::Configuration(_)), "{} -> {:?}", bad, err);
        }
    }

    #[test]
    fn test_serialized_config_reloads() {
        let config = PipelineConfig {
            time_window: TimeWindow::Days(30),
            mode: AssemblyMode::Full { gray_levels: 255 },
            ..Default::default()
        };
        let text = config.to_json_string().unwrap();
        assert_eq!(PipelineConfig::from_json_str(&text).unwrap(), config);
    }
}
