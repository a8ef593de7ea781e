use crate::core::composite::Statistic;
use crate::core::window::{early_fire_window, pre_fire_window};
use crate::io::backend::RasterBackend;
use crate::raster::{RasterImage, ResampleMethod};
use crate::types::{DateRange, Feature, RsrResult};
use serde::{Deserialize, Serialize};

const KELVIN_OFFSET: f64 = 273.15;

/// Window lengths (days) for weather reductions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherParams {
    /// Fuel condition variables just before ignition
    pub fuel_window_days: u32,
    /// Cumulative temperature and precipitation
    pub accumulation_window_days: u32,
    /// Wind and hot-dry-windy index from the alarm date on
    pub early_window_days: u32,
}

impl Default for WeatherParams {
    fn default() -> Self {
        Self {
            fuel_window_days: 4,
            accumulation_window_days: 31,
            early_window_days: 3,
        }
    }
}

/// Fire weather covariates from daily gridded meteorology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherVariable {
    /// Energy release component
    Erc,
    /// 100-hour dead fuel moisture
    Fm100,
    /// Cumulative daily maximum temperature, degrees C
    Tmmx,
    /// Cumulative precipitation
    Pr,
    /// Vapour pressure deficit
    Vpd,
    /// Wind speed
    Vs,
    /// Hot-dry-windy index, vpd x wind speed
    Hdw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowKind {
    Fuel,
    Accumulation,
    Early,
}

impl WeatherVariable {
    pub const FULL: [WeatherVariable; 7] = [
        WeatherVariable::Erc,
        WeatherVariable::Fm100,
        WeatherVariable::Tmmx,
        WeatherVariable::Pr,
        WeatherVariable::Vpd,
        WeatherVariable::Vs,
        WeatherVariable::Hdw,
    ];

    pub const LITE: [WeatherVariable; 5] = [
        WeatherVariable::Erc,
        WeatherVariable::Fm100,
        WeatherVariable::Vpd,
        WeatherVariable::Vs,
        WeatherVariable::Hdw,
    ];

    pub fn band_name(&self) -> &'static str {
        match self {
            WeatherVariable::Erc => "erc",
            WeatherVariable::Fm100 => "fm100",
            WeatherVariable::Tmmx => "tmmx",
            WeatherVariable::Pr => "pr",
            WeatherVariable::Vpd => "vpd",
            WeatherVariable::Vs => "vs",
            WeatherVariable::Hdw => "hdw",
        }
    }

    pub fn statistic(&self) -> Statistic {
        match self {
            WeatherVariable::Tmmx | WeatherVariable::Pr => Statistic::Sum,
            _ => Statistic::Median,
        }
    }

    fn window_kind(&self) -> WindowKind {
        match self {
            WeatherVariable::Erc | WeatherVariable::Fm100 | WeatherVariable::Vpd => WindowKind::Fuel,
            WeatherVariable::Tmmx | WeatherVariable::Pr => WindowKind::Accumulation,
            WeatherVariable::Vs | WeatherVariable::Hdw => WindowKind::Early,
        }
    }

    /// Date range of daily grids reduced for this variable
    pub fn window(&self, feature: &Feature, params: &WeatherParams) -> DateRange {
        match self.window_kind() {
            WindowKind::Fuel => pre_fire_window(feature.alarm_date, params.fuel_window_days as i64),
            WindowKind::Accumulation => {
                pre_fire_window(feature.alarm_date, params.accumulation_window_days as i64)
            }
            WindowKind::Early => early_fire_window(feature.alarm_date, params.early_window_days as i64),
        }
    }

    /// Per-day value of this variable from a daily grid
    fn daily(&self, day: &RasterImage) -> RsrResult<RasterImage> {
        let name = self.band_name();
        match self {
            WeatherVariable::Tmmx => Ok(day
                .select(&["tmmx"])?
                .map_values(|k| k - KELVIN_OFFSET)),
            WeatherVariable::Hdw => {
                let vpd = day.select(&["vpd"])?;
                let vs = day.select(&["vs"])?;
                vpd.combine(&vs, name, |a, b| a * b)
            }
            _ => day.select(&[name]),
        }
    }
}

/// Reduce one weather variable over its window; `None` without any daily grid
pub fn weather_variable(
    backend: &dyn RasterBackend,
    dataset: &str,
    feature: &Feature,
    variable: WeatherVariable,
    params: &WeatherParams,
    resample: ResampleMethod,
) -> RsrResult<Option<RasterImage>> {
    let range = variable.window(feature, params);
    let days = backend.fetch_series(dataset, &range, &feature.geometry)?;
    log::debug!(
        "{}: {} daily grids in {}",
        variable.band_name(),
        days.len(),
        range
    );
    let daily = days.try_map(|day| variable.daily(day))?;
    let reduced = backend.reduce_series(&daily, variable.statistic())?;
    Ok(reduced.into_present().map(|img| img.resample(resample)))
}

/// Stack of weather bands; absent unless every member is present
pub fn weather_group(
    backend: &dyn RasterBackend,
    dataset: &str,
    feature: &Feature,
    variables: &[WeatherVariable],
    params: &WeatherParams,
    resample: ResampleMethod,
) -> RsrResult<Option<RasterImage>> {
    let mut stacked: Option<RasterImage> = None;
    for &variable in variables {
        let image = match weather_variable(backend, dataset, feature, variable, params, resample)? {
            Some(img) => img,
            None => {
                log::debug!("Weather variable {} absent", variable.band_name());
                return Ok(None);
            }
        };
        stacked = Some(match stacked {
            Some(acc) => acc.add_bands(&image)?,
            None => image,
        });
    }
    Ok(stacked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::memory::MemoryBackend;
    use crate::types::GeoTransform;
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, TimeZone, Utc};
    use geo::Point;
    use ndarray::Array2;

    const GRIDMET: &str = "IDAHO_EPSCOR/GRIDMET";

    fn daily_grid(day: i64, value: f64) -> RasterImage {
        let start = Utc.with_ymd_and_hms(2000, 8, 1, 0, 0, 0).unwrap();
        let bands = ["erc", "fm100", "tmmx", "pr", "vpd", "vs"]
            .iter()
            .map(|n| (n.to_string(), Array2::from_elem((3, 3), value)))
            .collect();
        RasterImage::from_bands(GeoTransform::north_up(-1.0, 2.0, 1.0), bands)
            .unwrap()
            .with_acquired(start + Duration::days(day))
    }

    fn backend() -> MemoryBackend {
        let mut backend = MemoryBackend::new();
        // one grid per day for August; value is the day index
        let days = (0..31).map(|d| daily_grid(d, 300.0 + d as f64)).collect();
        backend.insert_collection(GRIDMET, days);
        backend
    }

    fn fire() -> Feature {
        Feature::new(Point::new(0.5, 0.5), Utc.with_ymd_and_hms(2000, 8, 20, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_windows() {
        let params = WeatherParams::default();
        let erc = WeatherVariable::Erc.window(&fire(), &params);
        assert_eq!(erc.start, Utc.with_ymd_and_hms(2000, 8, 16, 0, 0, 0).unwrap());
        assert_eq!(erc.end, Utc.with_ymd_and_hms(2000, 8, 19, 0, 0, 0).unwrap());

        let vs = WeatherVariable::Vs.window(&fire(), &params);
        assert_eq!(vs.start, fire().alarm_date);
        assert_eq!(vs.length().num_days(), 3);
    }

    #[test]
    fn test_median_and_sum_reductions() {
        let backend = backend();
        let params = WeatherParams::default();
        let value = |v: WeatherVariable| {
            let img = weather_variable(&backend, GRIDMET, &fire(), v, &params, ResampleMethod::None)
                .unwrap()
                .unwrap();
            img.band(v.band_name()).unwrap()[[1, 1]]
        };

        // days 15, 16, 17 (Aug 16..18)
        assert_abs_diff_eq!(value(WeatherVariable::Erc), 316.0, epsilon = 1e-9);
        // Aug 20..22 are days 19, 20, 21
        assert_abs_diff_eq!(value(WeatherVariable::Vs), 320.0, epsilon = 1e-9);
        assert_abs_diff_eq!(value(WeatherVariable::Hdw), 320.0 * 320.0, epsilon = 1e-6);
        // 31-day window only overlaps Aug 1..18 (days 0..17)
        let expected_tmmx: f64 = (0..18).map(|d| 300.0 + d as f64 - 273.15).sum();
        assert_abs_diff_eq!(value(WeatherVariable::Tmmx), expected_tmmx, epsilon = 1e-6);
    }

    #[test]
    fn test_group_requires_every_member() {
        let backend = backend();
        let params = WeatherParams::default();
        let group = weather_group(
            &backend,
            GRIDMET,
            &fire(),
            &WeatherVariable::FULL,
            &params,
            ResampleMethod::None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(group.band_names(), vec!["erc", "fm100", "tmmx", "pr", "vpd", "vs", "hdw"]);

        // a fire in October has no early-window grids
        let late = Feature::new(Point::new(0.5, 0.5), Utc.with_ymd_and_hms(2000, 10, 1, 0, 0, 0).unwrap());
        let group = weather_group(
            &backend,
            GRIDMET,
            &late,
            &WeatherVariable::LITE,
            &params,
            ResampleMethod::None,
        )
        .unwrap();
        assert!(group.is_none());
    }
}
