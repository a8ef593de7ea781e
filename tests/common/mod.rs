//! Synthetic 12x12 scene shared by the scenario tests
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use geo::{polygon, Geometry};
use ndarray::Array2;
use rsr::{Feature, GeoTransform, MemoryBackend, RasterImage};

pub const L5: &str = "LANDSAT/LT05/C01/T1_SR";
pub const DEM: &str = "USGS/SRTMGL1_003";
pub const CONIFER: &str = "users/mkoontz/mixed_conifer";
pub const GRIDMET: &str = "IDAHO_EPSCOR/GRIDMET";

pub const ROWS: usize = 12;
pub const COLS: usize = 12;
pub const PIXEL: f64 = 30.0;

/// Pixel that is cloudy in every pre-fire acquisition
pub const CLOUDY: (usize, usize) = (5, 5);

/// Weather values of every daily grid
pub const ERC: f64 = 50.0;
pub const TMMX_K: f64 = 300.0;
pub const PR: f64 = 1.0;
pub const VPD: f64 = 2.0;
pub const VS: f64 = 3.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn grid() -> GeoTransform {
    GeoTransform::north_up(0.0, ROWS as f64 * PIXEL, PIXEL)
}

pub fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn constant(value: f64) -> Array2<f64> {
    Array2::from_elem((ROWS, COLS), value)
}

/// Red reflectance rises eastwards so NDVI varies across the scene
fn red() -> Array2<f64> {
    Array2::from_shape_fn((ROWS, COLS), |(_, c)| 0.05 + 0.002 * c as f64)
}

/// Landsat 5 surface reflectance with NIR / SWIR2 set per condition
pub fn landsat5(acquired: DateTime<Utc>, nir: f64, swir2: f64, cloudy: bool) -> RasterImage {
    let mut qa = constant(0.0);
    if cloudy {
        qa[[CLOUDY.0, CLOUDY.1]] = 32.0 + 64.0;
    }
    let bands = vec![
        ("B1".to_string(), constant(0.03)),
        ("B2".to_string(), constant(0.04)),
        ("B3".to_string(), red()),
        ("B4".to_string(), constant(nir)),
        ("B5".to_string(), constant(0.25)),
        ("B6".to_string(), constant(0.2)),
        ("B7".to_string(), constant(swir2)),
        ("pixel_qa".to_string(), qa),
    ];
    RasterImage::from_bands(grid(), bands)
        .unwrap()
        .with_acquired(acquired)
}

pub fn pre_fire_nbr() -> f64 {
    (0.4 - 0.1) / (0.4 + 0.1)
}

pub fn post_fire_nbr() -> f64 {
    (0.2 - 0.25) / (0.2 + 0.25)
}

fn daily_weather(acquired: DateTime<Utc>) -> RasterImage {
    let bands = vec![
        ("erc".to_string(), constant(ERC)),
        ("fm100".to_string(), constant(10.0)),
        ("tmmx".to_string(), constant(TMMX_K)),
        ("pr".to_string(), constant(PR)),
        ("vpd".to_string(), constant(VPD)),
        ("vs".to_string(), constant(VS)),
    ];
    RasterImage::from_bands(grid(), bands)
        .unwrap()
        .with_acquired(acquired)
}

/// Daily weather grids for `[start, end)`
pub fn weather_days(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<RasterImage> {
    let mut days = Vec::new();
    let mut t = start;
    while t < end {
        days.push(daily_weather(t));
        t += Duration::days(1);
    }
    days
}

/// Landsat 5 imagery around a 1987-07-01 fire plus all ancillary data
pub fn scene() -> MemoryBackend {
    let mut backend = MemoryBackend::new();

    // unburned and clouded at one pixel before, burned after
    backend.push_image(L5, landsat5(day(1987, 5, 20), 0.4, 0.1, true));
    backend.push_image(L5, landsat5(day(1987, 6, 10), 0.4, 0.1, true));
    // after the alarm date: outside every window
    backend.push_image(L5, landsat5(day(1987, 7, 15), 0.9, 0.05, false));
    backend.push_image(L5, landsat5(day(1988, 5, 20), 0.2, 0.25, false));
    backend.push_image(L5, landsat5(day(1988, 6, 10), 0.2, 0.25, false));

    let elevation = Array2::from_shape_fn((ROWS, COLS), |(r, c)| 1000.0 + 3.0 * c as f64 + r as f64);
    backend.insert_image(
        DEM,
        RasterImage::from_bands(grid(), vec![("elevation".to_string(), elevation)]).unwrap(),
    );

    // west half non-conifer, east half conifer
    let conifer = Array2::from_shape_fn((ROWS, COLS), |(_, c)| if c >= COLS / 2 { 1.0 } else { 0.0 });
    backend.insert_image(
        CONIFER,
        RasterImage::from_bands(grid(), vec![("b1".to_string(), conifer)]).unwrap(),
    );

    backend.insert_collection(GRIDMET, weather_days(day(1987, 5, 25), day(1987, 7, 10)));
    backend
}

/// Perimeter covering the whole scene
pub fn perimeter() -> Geometry<f64> {
    let (w, h) = (COLS as f64 * PIXEL, ROWS as f64 * PIXEL);
    Geometry::Polygon(polygon![
        (x: 0.0, y: 0.0), (x: w, y: 0.0), (x: w, y: h), (x: 0.0, y: h)
    ])
}

pub fn fire_1987() -> Feature {
    Feature::new(perimeter(), day(1987, 7, 1)).with_property("fire_name", "TEST")
}

/// World coordinate of a pixel centre
pub fn center(row: usize, col: usize) -> (f64, f64) {
    grid().pixel_center(row, col)
}
