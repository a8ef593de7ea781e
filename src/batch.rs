//! Batch drivers mapping the feature assembler over bounded feature sets

use crate::config::PipelineConfig;
use crate::core::assembler::{AssemblyMode, AssemblyParams, FeatureAssembler, VariableBundle};
use crate::core::sampling::Sample;
use crate::io::backend::RasterBackend;
use crate::types::{Feature, RsrError, RsrResult};
use chrono::{DateTime, Utc};
use geo::{Centroid, Geometry};
use std::sync::Arc;

/// Reduction scale for field plot calibration
pub const CALIBRATION_SCALE: f64 = 30.0;

/// Runs assessments and calibrations for one configuration
pub struct BatchProcessor {
    assembler: FeatureAssembler,
    config: PipelineConfig,
}

impl BatchProcessor {
    /// Fails with a configuration error before any feature is touched
    pub fn new(backend: Arc<dyn RasterBackend>, config: PipelineConfig) -> RsrResult<Self> {
        config.validate()?;
        log::info!(
            "Batch processor: window {}, resample {}, sensors {}, mode {:?}",
            config.time_window,
            config.resample,
            config.sensors,
            config.mode
        );
        Ok(Self {
            assembler: FeatureAssembler::new(backend, config.datasets.clone()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn assembler(&self) -> &FeatureAssembler {
        &self.assembler
    }

    fn check_batch(&self, features: &[Feature]) -> RsrResult<()> {
        if features.len() > self.config.max_batch_size {
            return Err(RsrError::Configuration(format!(
                "Batch of {} features exceeds max_batch_size {}; partition by alarm date",
                features.len(),
                self.config.max_batch_size
            )));
        }
        Ok(())
    }

    /// Apply `f` to every feature, keeping present results in input order
    fn map_features<T, F>(&self, features: &[Feature], f: F) -> RsrResult<Vec<T>>
    where
        T: Send,
        F: Fn(&Feature) -> RsrResult<Option<T>> + Sync + Send,
    {
        self.check_batch(features)?;

        #[cfg(feature = "parallel")]
        let results: Vec<Option<T>> = {
            use rayon::prelude::*;
            features.par_iter().map(&f).collect::<RsrResult<Vec<_>>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<Option<T>> = features.iter().map(&f).collect::<RsrResult<Vec<_>>>()?;

        let present: Vec<T> = results.into_iter().flatten().collect();
        log::info!(
            "{} of {} features produced output",
            present.len(),
            features.len()
        );
        Ok(present)
    }

    fn assess(&self, features: &[Feature], params: &AssemblyParams) -> RsrResult<Vec<VariableBundle>> {
        self.map_features(features, |feature| {
            match self.assembler.assemble(feature, params)? {
                Some(bundle) => Ok(Some(bundle.clip(&feature.geometry)?)),
                None => Ok(None),
            }
        })
    }

    /// Full variable bundles clipped to each perimeter
    pub fn assess_whole_fire(
        &self,
        features: &[Feature],
        gray_levels: u8,
    ) -> RsrResult<Vec<VariableBundle>> {
        let params = AssemblyParams {
            mode: AssemblyMode::Full { gray_levels },
            ..self.config.assembly_params()
        };
        params.validate()?;
        self.assess(features, &params)
    }

    /// Lite variable bundles clipped to each perimeter
    pub fn assess_whole_fire_lite(&self, features: &[Feature]) -> RsrResult<Vec<VariableBundle>> {
        let params = AssemblyParams {
            mode: AssemblyMode::Lite,
            ..self.config.assembly_params()
        };
        self.assess(features, &params)
    }

    /// Mean of every full-mode variable over each field plot
    ///
    /// Calibration always assembles the full schema, whatever the configured
    /// mode. Each plot keeps its own properties and geometry; plots without a
    /// bundle are dropped.
    pub fn calibrate_cbi(&self, features: &[Feature], gray_levels: u8) -> RsrResult<Vec<Sample>> {
        let params = AssemblyParams {
            mode: AssemblyMode::Full { gray_levels },
            ..self.config.assembly_params()
        };
        params.validate()?;
        let backend = self.assembler.backend();
        self.map_features(features, |feature| {
            let bundle = match self.assembler.assemble(feature, &params)? {
                Some(bundle) => bundle,
                None => return Ok(None),
            };
            let reduced = match backend.reduce_region(bundle.image(), &feature.geometry, CALIBRATION_SCALE)? {
                Some(reduced) => reduced,
                None => return Ok(None),
            };
            let geometry = match &feature.geometry {
                Geometry::Point(p) => *p,
                other => other.centroid().ok_or_else(|| {
                    RsrError::Processing("Cannot locate a plot with empty geometry".to_string())
                })?,
            };

            let mut properties = feature.scalar_properties();
            properties.extend(reduced);
            Ok(Some(Sample {
                geometry,
                properties,
            }))
        })
    }

    /// Simple random samples from every bundle
    pub fn sample_bundles(&self, bundles: &[VariableBundle]) -> RsrResult<Vec<Sample>> {
        let backend = self.assembler.backend();
        let mut samples = Vec::new();
        for bundle in bundles {
            samples.extend(backend.sample_image(bundle.image(), &self.config.sampling)?);
        }
        Ok(samples)
    }

    /// Class-stratified samples from every bundle
    pub fn stratified_sample_bundles(&self, bundles: &[VariableBundle]) -> RsrResult<Vec<Sample>> {
        let backend = self.assembler.backend();
        let mut samples = Vec::new();
        for bundle in bundles {
            samples.extend(backend.stratified_sample(bundle.image(), &self.config.stratified)?);
        }
        Ok(samples)
    }
}

/// Split features at alarm-date boundaries
///
/// Returns `boundaries.len() + 1` groups: before the first boundary, between
/// consecutive boundaries (start inclusive), and from the last boundary on.
/// Boundaries are sorted first; input order is kept within each group.
pub fn partition_by_alarm_date(
    features: Vec<Feature>,
    boundaries: &[DateTime<Utc>],
) -> Vec<Vec<Feature>> {
    let mut sorted = boundaries.to_vec();
    sorted.sort();
    let mut groups: Vec<Vec<Feature>> = (0..=sorted.len()).map(|_| Vec::new()).collect();
    for feature in features {
        let group = sorted.partition_point(|b| *b <= feature.alarm_date);
        groups[group].push(feature);
    }
    groups
}
